//! Win32 desktop backend: GDI capture, `SendInput`, window enumeration and the
//! `tasklist`/`taskkill` tools.

use std::ffi::c_void;
use std::os::windows::process::CommandExt;
use std::process::Command;

use anyhow::Context;
use image::{Rgb, RgbImage};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CreateCompatibleBitmap, CreateCompatibleDC,
    DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, ReleaseDC, SRCCOPY, SelectObject,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBD_EVENT_FLAGS, KEYBDINPUT, KEYEVENTF_KEYUP,
    KEYEVENTF_SCANCODE, KEYEVENTF_UNICODE, MOUSE_EVENT_FLAGS, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE, MOUSEINPUT, SendInput, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetWindowRect, GetWindowTextLengthW, GetWindowTextW,
    GetWindowThreadProcessId, IsWindow, SW_RESTORE, SetCursorPos, SetForegroundWindow,
    ShowWindow,
};

use super::{taskkill_confirmed, tasklist_shows_running};
use crate::input::{InputDevice, Key};
use crate::perception::Screen;
use crate::perception::layout::Rect;
use crate::supervisor::{GameHost, LaunchSpec, WindowInfo, WindowRect};

const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Desktop;

fn hwnd(handle: usize) -> HWND {
    HWND(handle as *mut c_void)
}

fn send(inputs: &[INPUT]) -> anyhow::Result<()> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        anyhow::bail!("SendInput accepted {sent} of {} events", inputs.len());
    }
    Ok(())
}

fn keyboard(scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(0),
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn mouse(dx: i32, dy: i32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

impl InputDevice for Win32Desktop {
    fn key(&self, key: Key, pressed: bool) -> anyhow::Result<()> {
        let mut flags = KEYEVENTF_SCANCODE;
        if !pressed {
            flags |= KEYEVENTF_KEYUP;
        }
        send(&[keyboard(key.scan_code(), flags)])
    }

    fn type_char(&self, c: char) -> anyhow::Result<()> {
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units).iter() {
            send(&[
                keyboard(*unit, KEYEVENTF_UNICODE),
                keyboard(*unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP),
            ])?;
        }
        Ok(())
    }

    fn move_relative(&self, dx: i32, dy: i32) -> anyhow::Result<()> {
        send(&[mouse(dx, dy, MOUSEEVENTF_MOVE)])
    }

    fn set_cursor(&self, x: i32, y: i32) -> anyhow::Result<()> {
        unsafe { SetCursorPos(x, y) }.context("SetCursorPos failed")
    }

    fn left_button(&self, pressed: bool) -> anyhow::Result<()> {
        let flags = if pressed {
            MOUSEEVENTF_LEFTDOWN
        } else {
            MOUSEEVENTF_LEFTUP
        };
        send(&[mouse(0, 0, flags)])
    }
}

impl Screen for Win32Desktop {
    fn capture(&self, area: Rect) -> anyhow::Result<RgbImage> {
        let (width, height) = (area.width as i32, area.height as i32);
        if width == 0 || height == 0 {
            return Ok(RgbImage::new(area.width, area.height));
        }

        let mut bgra = vec![0u8; (width * height * 4) as usize];
        unsafe {
            let screen = GetDC(HWND::default());
            let memory = CreateCompatibleDC(screen);
            let bitmap = CreateCompatibleBitmap(screen, width, height);
            let previous = SelectObject(memory, bitmap);

            let blit = BitBlt(memory, 0, 0, width, height, screen, area.x, area.y, SRCCOPY);

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    // Negative height asks for a top-down bitmap.
                    biHeight: -height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let lines = GetDIBits(
                memory,
                bitmap,
                0,
                height as u32,
                Some(bgra.as_mut_ptr() as *mut c_void),
                &mut info,
                DIB_RGB_COLORS,
            );

            SelectObject(memory, previous);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(memory);
            ReleaseDC(HWND::default(), screen);

            blit.with_context(|| format!("BitBlt failed for {area:?}"))?;
            if lines != height {
                anyhow::bail!("GetDIBits copied {lines} of {height} lines for {area:?}");
            }
        }

        Ok(RgbImage::from_fn(area.width, area.height, |x, y| {
            let i = ((y * area.width + x) * 4) as usize;
            Rgb([bgra[i + 2], bgra[i + 1], bgra[i]])
        }))
    }
}

unsafe extern "system" fn collect_window(handle: HWND, lparam: LPARAM) -> BOOL {
    let windows = unsafe { &mut *(lparam.0 as *mut Vec<WindowInfo>) };

    let length = unsafe { GetWindowTextLengthW(handle) };
    let mut title = vec![0u16; (length + 1).max(1) as usize];
    let copied = unsafe { GetWindowTextW(handle, &mut title) };
    let title = String::from_utf16_lossy(&title[..copied.max(0) as usize]);

    let mut class = [0u16; 256];
    let copied = unsafe { GetClassNameW(handle, &mut class) };
    let class_name = String::from_utf16_lossy(&class[..copied.max(0) as usize]);

    let mut rect = RECT::default();
    let _ = unsafe { GetWindowRect(handle, &mut rect) };

    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(handle, Some(&mut pid)) };

    windows.push(WindowInfo {
        handle: handle.0 as usize,
        title,
        rect: WindowRect {
            left: rect.left,
            top: rect.top,
            right: rect.right,
            bottom: rect.bottom,
        },
        class_name,
        pid,
    });
    BOOL(1)
}

fn run_tool(program: &str, args: &[String]) -> anyhow::Result<String> {
    let output = Command::new(program)
        .args(args)
        .creation_flags(CREATE_NO_WINDOW)
        .output()
        .with_context(|| format!("failed to run {program}"))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl GameHost for Win32Desktop {
    fn launch(&self, spec: &LaunchSpec) -> anyhow::Result<()> {
        let exe = spec.working_dir.join(&spec.executable);
        Command::new(&exe)
            .current_dir(&spec.working_dir)
            .args(&spec.args)
            .spawn()
            .with_context(|| format!("failed to start {}", exe.display()))?;
        Ok(())
    }

    fn windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
        let mut windows: Vec<WindowInfo> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_window),
                LPARAM(&mut windows as *mut Vec<WindowInfo> as isize),
            )
        }
        .context("EnumWindows failed")?;
        Ok(windows)
    }

    fn bring_to_foreground(&self, window: &WindowInfo) -> anyhow::Result<()> {
        let handle = hwnd(window.handle);
        unsafe {
            if !IsWindow(handle).as_bool() {
                anyhow::bail!("window {:#x} no longer exists", window.handle);
            }
            let _ = ShowWindow(handle, SW_RESTORE);
            if !SetForegroundWindow(handle).as_bool() {
                anyhow::bail!("SetForegroundWindow refused window {:#x}", window.handle);
            }
        }
        Ok(())
    }

    fn is_responsive(&self, pid: u32) -> anyhow::Result<bool> {
        let output = run_tool(
            "tasklist",
            &[
                "/FI".into(),
                format!("PID eq {pid}"),
                "/FI".into(),
                "STATUS eq running".into(),
            ],
        )?;
        Ok(tasklist_shows_running(&output, pid))
    }

    fn force_kill(&self, pid: u32) -> anyhow::Result<bool> {
        let output = run_tool("taskkill", &["/F".into(), "/PID".into(), pid.to_string()])?;
        Ok(taskkill_confirmed(&output))
    }
}
