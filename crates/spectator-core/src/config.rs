use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::controller::ControllerSettings;
use crate::session::ServerTarget;
use crate::supervisor::{Identity, SupervisorSettings};

pub const DEFAULT_CONFIG_FILE: &str = "auto-spectator.toml";

pub const TESSERACT_BIN: &str = if cfg!(windows) {
    "tesseract.exe"
} else {
    "tesseract"
};

/// TOML config loader.
///
/// Search order:
/// 1) `AUTO_SPECTATOR_CONFIG_DIR/<relative_path>`
/// 2) `./<relative_path>`
/// 3) `<repo_root>/config/<relative_path>`
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn parse_path<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::parse_from_string(text)
            .with_context(|| format!("Invalid config at {}", path.display()))
    }

    pub fn parse_from_string<T: DeserializeOwned>(text: String) -> anyhow::Result<T> {
        toml::from_str(&text).with_context(|| "Failed to parse TOML")
    }

    pub fn resolve_path(relative_path: &str) -> Option<PathBuf> {
        let rel = Path::new(relative_path);

        if let Some(root) = env::var_os("AUTO_SPECTATOR_CONFIG_DIR") {
            let candidate = PathBuf::from(root).join(rel);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if let Ok(cwd) = env::current_dir() {
            let candidate = cwd.join(rel);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        // This crate lives at <repo_root>/crates/spectator-core.
        let candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .ancestors()
            .nth(2)?
            .join("config")
            .join(rel);
        candidate.is_file().then_some(candidate)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpectatorConfig {
    pub player: PlayerConfig,
    pub server: ServerConfig,
    pub game: GameConfig,
    pub ocr: OcrConfig,
    pub instance: InstanceConfig,
    pub rotation: RotationConfig,
    pub remote: RemoteConfig,
    pub debug: DebugConfig,
    pub assets: AssetsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ip: String,
    pub port: String,
    pub password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: "16567".into(),
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub path: PathBuf,
    pub executable: String,
    pub window_title: String,
    pub window_class: String,
    pub launch_settle_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(r"C:\Program Files (x86)\EA Games\Battlefield 2"),
            executable: "BF2.exe".into(),
            window_title: "BF2 (v1.5.3153-802.0, pid:".into(),
            window_class: "BF2".into(),
            launch_settle_secs: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub tesseract_path: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from(r"C:\Program Files\Tesseract-OCR"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub limit_rtl: bool,
    pub rounds_to_live: u32,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            limit_rtl: true,
            rounds_to_live: 6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub max_iterations_on_player: u32,
    pub pause_minutes: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_iterations_on_player: 5,
            pause_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub base_uri: Option<String>,
    pub app_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_uri: None,
            app_key: None,
            timeout_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub screenshots: bool,
    pub dir: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            screenshots: false,
            dir: PathBuf::from("auto-spectator-debug"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub histograms: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            histograms: PathBuf::from("histograms.json"),
        }
    }
}

impl SpectatorConfig {
    /// Reads `explicit` if given, else the default file from the search path, else defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return ConfigLoader::parse_path(path);
        }
        match ConfigLoader::resolve_path(DEFAULT_CONFIG_FILE) {
            Some(path) => {
                tracing::info!("config.load path={}", path.display());
                ConfigLoader::parse_path(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Required values and installed binaries; checked before the game is touched.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.player.name.is_empty() || self.player.password.is_empty() {
            anyhow::bail!("player name and password are required");
        }
        if self.server.ip.is_empty() {
            anyhow::bail!("server ip is required");
        }
        if self.remote.enabled && self.remote.base_uri.is_none() {
            anyhow::bail!("remote controller enabled without a base uri");
        }
        let exe = self.game.path.join(&self.game.executable);
        if !exe.is_file() {
            anyhow::bail!(
                "Could not find {} in game install folder {}",
                self.game.executable,
                self.game.path.display()
            );
        }
        if !self.tesseract_binary().is_file() {
            anyhow::bail!(
                "Could not find {TESSERACT_BIN} in install folder {}",
                self.ocr.tesseract_path.display()
            );
        }
        Ok(())
    }

    pub fn tesseract_binary(&self) -> PathBuf {
        self.ocr.tesseract_path.join(TESSERACT_BIN)
    }

    pub fn server_target(&self) -> ServerTarget {
        ServerTarget::new(
            self.server.ip.clone(),
            self.server.port.clone(),
            self.server.password.clone(),
        )
    }

    pub fn identity(&self) -> Identity {
        Identity {
            name: self.player.name.clone(),
            password: self.player.password.clone(),
        }
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            game_dir: self.game.path.clone(),
            executable: self.game.executable.clone(),
            window_title: self.game.window_title.clone(),
            window_class: self.game.window_class.clone(),
            launch_settle: Duration::from_secs(self.game.launch_settle_secs),
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            max_iterations_on_player: self.rotation.max_iterations_on_player,
            limit_rtl: self.instance.limit_rtl,
            rounds_to_live: self.instance.rounds_to_live,
            rotation_pause: Duration::from_secs(self.rotation.pause_minutes * 60),
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() -> anyhow::Result<()> {
        let cfg: SpectatorConfig = ConfigLoader::parse_from_string(
            r#"
            [player]
            name = "spectator"
            password = "secret"

            [server]
            ip = "10.0.0.1"
            password = "pw"

            [instance]
            rounds_to_live = 3
            "#
            .to_string(),
        )?;
        assert_eq!(cfg.server.port, "16567");
        assert_eq!(cfg.server_target().password.as_deref(), Some("pw"));
        assert_eq!(cfg.instance.rounds_to_live, 3);
        assert!(cfg.instance.limit_rtl);
        assert_eq!(cfg.rotation.max_iterations_on_player, 5);
        assert_eq!(
            cfg.controller_settings().rotation_pause,
            Duration::from_secs(600)
        );
        assert_eq!(cfg.game.window_class, "BF2");
        Ok(())
    }

    #[test]
    fn explicit_path_is_read_directly() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[remote]\nenabled = true\nbase_uri = \"http://ctl\"\n")?;

        let cfg = SpectatorConfig::load(Some(&path))?;
        assert!(cfg.remote.enabled);
        assert_eq!(cfg.remote_timeout(), Duration::from_secs(2));
        Ok(())
    }

    #[test]
    fn invalid_toml_names_the_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[player\nname = 1")?;

        let err = SpectatorConfig::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
        Ok(())
    }

    #[test]
    fn validation_checks_installed_binaries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut cfg = SpectatorConfig::default();
        cfg.player.name = "spectator".into();
        cfg.player.password = "secret".into();
        cfg.server.ip = "10.0.0.1".into();
        cfg.game.path = dir.path().to_path_buf();
        cfg.ocr.tesseract_path = dir.path().to_path_buf();

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("BF2.exe"));

        std::fs::write(dir.path().join("BF2.exe"), b"")?;
        assert!(cfg.validate().unwrap_err().to_string().contains(TESSERACT_BIN));

        std::fs::write(dir.path().join(TESSERACT_BIN), b"")?;
        cfg.validate()?;
        Ok(())
    }

    #[test]
    fn missing_identity_is_rejected() {
        let cfg = SpectatorConfig::default();
        assert!(cfg.validate().is_err());
    }
}
