use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use image::RgbImage;

use crate::perception::TextRecognizer;

/// Runs the Tesseract CLI in single-line mode on each capture.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(image: &Path) -> Vec<std::ffi::OsString> {
        vec![
            image.as_os_str().to_owned(),
            "stdout".into(),
            "--oem".into(),
            "3".into(),
            "--psm".into(),
            "7".into(),
        ]
    }
}

impl TextRecognizer for TesseractOcr {
    fn recognize(&self, image: &RgbImage) -> anyhow::Result<String> {
        let file = tempfile::Builder::new()
            .prefix("auto-spectator-ocr-")
            .suffix(".png")
            .tempfile()
            .context("failed to create ocr temp file")?;
        image
            .save_with_format(file.path(), image::ImageFormat::Png)
            .context("failed to write ocr capture")?;

        let output = Command::new(&self.binary)
            .args(Self::args(file.path()))
            .output()
            .with_context(|| format!("failed to run {}", self.binary.display()))?;
        if !output.status.success() {
            anyhow::bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn script(dir: &Path, body: &str) -> anyhow::Result<PathBuf> {
        let path = dir.join("tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    #[test]
    fn reads_stdout_of_single_line_mode() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        // Echo the mode flags back so the invocation is visible in the result.
        let bin = script(dir.path(), r#"test -f "$1" && echo "GAME MESSAGE $4 $6""#)?;

        let text = TesseractOcr::new(bin).recognize(&RgbImage::new(8, 8))?;
        assert_eq!(text.trim(), "GAME MESSAGE 3 7");
        Ok(())
    }

    #[test]
    fn non_zero_exit_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let bin = script(dir.path(), "echo broken >&2; exit 1")?;

        let err = TesseractOcr::new(bin)
            .recognize(&RgbImage::new(8, 8))
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
        Ok(())
    }
}
