//! Game process lifecycle: launch with identity and auto-join arguments, locate the client
//! window, watch responsiveness and error dialogs, and kill it when it cannot recover.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::perception::layout::Point;
use crate::session::ServerTarget;

/// Error dialog titles raised by debug assertions and the C++ runtime.
pub const ERROR_DIALOG_TITLES: &[&str] = &["BF2 Error", "Microsoft Visual C++ Runtime Library"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl WindowRect {
    pub fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: usize,
    pub title: String,
    pub rect: WindowRect,
    pub class_name: String,
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub working_dir: PathBuf,
    pub executable: String,
    pub args: Vec<String>,
}

/// OS process and window primitives.
pub trait GameHost: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> anyhow::Result<()>;

    /// All top-level windows in enumeration order.
    fn windows(&self) -> anyhow::Result<Vec<WindowInfo>>;

    fn bring_to_foreground(&self, window: &WindowInfo) -> anyhow::Result<()>;

    fn is_responsive(&self, pid: u32) -> anyhow::Result<bool>;

    /// True once the OS confirmed termination.
    fn force_kill(&self, pid: u32) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub game_dir: PathBuf,
    pub executable: String,
    pub window_title: String,
    pub window_class: String,
    pub launch_settle: Duration,
}

pub struct Supervisor {
    host: Arc<dyn GameHost>,
    clock: Arc<dyn Clock>,
    settings: SupervisorSettings,
    identity: Identity,
}

impl Supervisor {
    pub fn new(
        host: Arc<dyn GameHost>,
        clock: Arc<dyn Clock>,
        settings: SupervisorSettings,
        identity: Identity,
    ) -> Self {
        Self {
            host,
            clock,
            settings,
            identity,
        }
    }

    pub fn launch_spec(&self, target: Option<&ServerTarget>) -> LaunchSpec {
        let mut args: Vec<String> = vec![
            "+restart".into(),
            "1".into(),
            "+playerName".into(),
            self.identity.name.clone(),
            "+playerPassword".into(),
            self.identity.password.clone(),
        ];
        for (flag, value) in [
            ("+szx", "1280"),
            ("+szy", "720"),
            ("+fullscreen", "0"),
            ("+wx", "5"),
            ("+wy", "5"),
            ("+multi", "1"),
            ("+developer", "1"),
            ("+disableShaderCache", "1"),
            ("+ignoreAsserts", "1"),
        ] {
            args.push(flag.into());
            args.push(value.into());
        }
        if let Some(target) = target {
            args.extend([
                "+joinServer".into(),
                target.ip.clone(),
                "+port".into(),
                target.port.clone(),
            ]);
        }
        LaunchSpec {
            working_dir: self.settings.game_dir.clone(),
            executable: self.settings.executable.clone(),
            args,
        }
    }

    /// Starts the client and waits for it to settle into a stable window.
    pub async fn launch(&self, target: Option<&ServerTarget>) -> anyhow::Result<()> {
        let spec = self.launch_spec(target);
        tracing::info!(
            "supervisor.launch exe={} auto_join={}",
            spec.executable,
            target.map(ToString::to_string).unwrap_or_else(|| "-".into())
        );
        self.host.launch(&spec)?;
        self.clock.sleep(self.settings.launch_settle).await;
        Ok(())
    }

    /// The last enumerated window whose title and class contain the given patterns.
    pub fn find_window_matching(
        &self,
        title: &str,
        class: Option<&str>,
    ) -> anyhow::Result<Option<WindowInfo>> {
        let windows = self.host.windows()?;
        Ok(windows.into_iter().rev().find(|w| {
            w.title.contains(title) && class.is_none_or(|class| w.class_name.contains(class))
        }))
    }

    pub fn find_game_window(&self) -> anyhow::Result<Option<WindowInfo>> {
        self.find_window_matching(&self.settings.window_title, Some(&self.settings.window_class))
    }

    pub fn error_dialog_present(&self) -> anyhow::Result<bool> {
        for title in ERROR_DIALOG_TITLES {
            if self.find_window_matching(title, None)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn bring_to_foreground(&self, window: &WindowInfo) -> anyhow::Result<()> {
        self.host.bring_to_foreground(window)
    }

    pub fn is_responsive(&self, pid: u32) -> anyhow::Result<bool> {
        self.host.is_responsive(pid)
    }

    pub fn force_kill(&self, pid: u32) -> anyhow::Result<bool> {
        let killed = self.host.force_kill(pid)?;
        tracing::info!("supervisor.kill pid={pid} killed={killed}");
        Ok(killed)
    }
}
