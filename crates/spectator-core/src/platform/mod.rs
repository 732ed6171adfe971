//! Concrete OS and OCR backends for the traits the control loop consumes.

pub mod tesseract;
#[cfg(windows)]
pub mod win32;

use std::sync::Arc;

use crate::input::InputDevice;
use crate::perception::Screen;
use crate::supervisor::GameHost;

pub use tesseract::TesseractOcr;

/// Screen, input and process access of the local desktop session.
pub struct Desktop {
    pub screen: Arc<dyn Screen>,
    pub input: Arc<dyn InputDevice>,
    pub host: Arc<dyn GameHost>,
}

#[cfg(windows)]
pub fn desktop() -> anyhow::Result<Desktop> {
    let desktop = Arc::new(win32::Win32Desktop);
    Ok(Desktop {
        screen: desktop.clone(),
        input: desktop.clone(),
        host: desktop,
    })
}

#[cfg(not(windows))]
pub fn desktop() -> anyhow::Result<Desktop> {
    anyhow::bail!("the game client can only be driven on Windows")
}

/// `tasklist /FI "PID eq N" /FI "STATUS eq running"` lists the pid only while it responds.
pub fn tasklist_shows_running(output: &str, pid: u32) -> bool {
    let pid = pid.to_string();
    output
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(pid.as_str()))
}

pub fn taskkill_confirmed(output: &str) -> bool {
    output.contains("has been terminated")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASKLIST: &str = "\r
Image Name                     PID Session Name        Session#    Mem Usage\r
========================= ======== ================ =========== ============\r
BF2.exe                       4242 Console                    1    812,340 K\r
";

    #[test]
    fn tasklist_output_matches_exact_pid() {
        assert!(tasklist_shows_running(TASKLIST, 4242));
        assert!(!tasklist_shows_running(TASKLIST, 424));
        assert!(!tasklist_shows_running(
            "INFO: No tasks are running which match the specified criteria.",
            4242
        ));
    }

    #[test]
    fn taskkill_success_line() {
        assert!(taskkill_confirmed(
            "SUCCESS: The process with PID 4242 has been terminated."
        ));
        assert!(!taskkill_confirmed("ERROR: The process \"4242\" not found."));
    }
}
