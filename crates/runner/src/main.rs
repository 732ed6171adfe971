use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Level;

use auto_spectator_core::clock::{Clock, SystemClock};
use auto_spectator_core::config::SpectatorConfig;
use auto_spectator_core::controller::SpectatorController;
use auto_spectator_core::game::GameClient;
use auto_spectator_core::input::Actions;
use auto_spectator_core::perception::histogram::{Histogram, TeamReferences};
use auto_spectator_core::perception::{DebugShots, Perception};
use auto_spectator_core::platform::{self, TesseractOcr};
use auto_spectator_core::remote::HttpRemote;
use auto_spectator_core::session::SessionState;
use auto_spectator_core::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "auto-spectator", version)]
#[command(about = "Launch and control an unattended Battlefield 2 spectator instance")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file; defaults to auto-spectator.toml on the search path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Account name of the spectating player
    #[arg(long)]
    player_name: Option<String>,

    /// Account password of the spectating player
    #[arg(long)]
    player_pass: Option<String>,

    /// IP of the server to spectate on
    #[arg(long)]
    server_ip: Option<String>,

    #[arg(long)]
    server_port: Option<String>,

    #[arg(long)]
    server_pass: Option<String>,

    /// Game install folder
    #[arg(long)]
    game_path: Option<PathBuf>,

    /// Tesseract install folder
    #[arg(long)]
    tesseract_path: Option<PathBuf>,

    /// Rounds to use one game instance for
    #[arg(long)]
    instance_rtl: Option<u32>,

    #[arg(long)]
    no_rtl_limit: bool,

    /// Attach to a running game instead of launching one
    #[arg(long)]
    no_start: bool,

    /// Take commands and server targets from a web controller
    #[arg(long)]
    use_controller: bool,

    #[arg(long)]
    controller_base_uri: Option<String>,

    #[arg(long)]
    controller_app_key: Option<String>,

    #[arg(long)]
    debug_log: bool,

    /// Save every OCR capture as a PNG
    #[arg(long)]
    debug_screenshot: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the team reference histograms from four active-flag crops
    Calibrate {
        #[arg(long)]
        usmc: PathBuf,
        #[arg(long)]
        eu: PathBuf,
        #[arg(long)]
        china: PathBuf,
        #[arg(long)]
        mec: PathBuf,
        /// Output file; defaults to the configured histogram asset path
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl Cli {
    fn apply_to(&self, cfg: &mut SpectatorConfig) {
        if let Some(name) = &self.player_name {
            cfg.player.name = name.clone();
        }
        if let Some(pass) = &self.player_pass {
            cfg.player.password = pass.clone();
        }
        if let Some(ip) = &self.server_ip {
            cfg.server.ip = ip.clone();
        }
        if let Some(port) = &self.server_port {
            cfg.server.port = port.clone();
        }
        if let Some(pass) = &self.server_pass {
            cfg.server.password = Some(pass.clone());
        }
        if let Some(path) = &self.game_path {
            cfg.game.path = path.clone();
        }
        if let Some(path) = &self.tesseract_path {
            cfg.ocr.tesseract_path = path.clone();
        }
        if let Some(rtl) = self.instance_rtl {
            cfg.instance.rounds_to_live = rtl;
        }
        if self.no_rtl_limit {
            cfg.instance.limit_rtl = false;
        }
        if self.use_controller {
            cfg.remote.enabled = true;
        }
        if let Some(uri) = &self.controller_base_uri {
            cfg.remote.base_uri = Some(uri.clone());
        }
        if let Some(key) = &self.controller_app_key {
            cfg.remote.app_key = Some(key.clone());
        }
        if self.debug_screenshot {
            cfg.debug.screenshots = true;
        }
    }
}

fn load_crop(path: &Path) -> anyhow::Result<Histogram> {
    let image = image::open(path)
        .with_context(|| format!("failed to open reference crop {}", path.display()))?
        .to_rgb8();
    Ok(Histogram::of_blue_channel(&image))
}

fn calibrate(usmc: &Path, eu: &Path, china: &Path, mec: &Path, out: &Path) -> anyhow::Result<()> {
    let references = TeamReferences {
        usmc: load_crop(usmc)?,
        eu: load_crop(eu)?,
        china: load_crop(china)?,
        mec: load_crop(mec)?,
    };
    let json = serde_json::to_string_pretty(&references).context("encode histograms")?;
    std::fs::write(out, json).with_context(|| format!("failed to write {}", out.display()))?;
    tracing::info!("calibrate.written path={}", out.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug_log {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let mut cfg = SpectatorConfig::load(cli.config.as_deref())?;
    cli.apply_to(&mut cfg);

    if let Some(Commands::Calibrate {
        usmc,
        eu,
        china,
        mec,
        out,
    }) = &cli.command
    {
        let out = out.clone().unwrap_or_else(|| cfg.assets.histograms.clone());
        return calibrate(usmc, eu, china, mec, &out);
    }

    cfg.validate()?;
    let references = TeamReferences::load(&cfg.assets.histograms)?;
    let desktop = platform::desktop()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut perception = Perception::new(
        desktop.screen.clone(),
        Arc::new(TesseractOcr::new(cfg.tesseract_binary())),
    );
    if cfg.debug.screenshots {
        perception = perception.with_debug_shots(DebugShots::new(&cfg.debug.dir)?);
    }
    let game = GameClient::new(
        perception,
        Actions::new(desktop.input.clone(), clock.clone()),
        references,
    );
    let supervisor = Supervisor::new(
        desktop.host.clone(),
        clock.clone(),
        cfg.supervisor_settings(),
        cfg.identity(),
    );

    let mut controller =
        SpectatorController::new(supervisor, game, clock, cfg.controller_settings());
    if cfg.remote.enabled
        && let Some(base_uri) = cfg.remote.base_uri.as_deref()
    {
        let remote = HttpRemote::new(base_uri, cfg.remote.app_key.clone(), cfg.remote_timeout())?;
        controller = controller.with_remote(Arc::new(remote));
    }

    let mut state = SessionState::new(cfg.server_target());
    tracing::info!(
        "spectator.start player={} server={} launch={}",
        cfg.player.name,
        state.server,
        !cli.no_start
    );
    controller.bootstrap(&mut state, !cli.no_start).await?;

    let halt = controller.run(&mut state).await;
    tracing::error!("spectator.halt {halt}");
    Err(anyhow::Error::new(halt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn cli_flags_override_config_values() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "auto-spectator",
            "--player-name",
            "spectator",
            "--server-ip",
            "10.0.0.1",
            "--server-pass",
            "pw",
            "--instance-rtl",
            "3",
            "--no-rtl-limit",
            "--use-controller",
            "--controller-base-uri",
            "http://ctl.local",
        ])?;
        let mut cfg = SpectatorConfig::default();
        cfg.player.password = "from-file".into();
        cli.apply_to(&mut cfg);

        assert_eq!(cfg.player.name, "spectator");
        assert_eq!(cfg.player.password, "from-file");
        assert_eq!(cfg.server_target().password.as_deref(), Some("pw"));
        assert_eq!(cfg.server.port, "16567");
        assert_eq!(cfg.instance.rounds_to_live, 3);
        assert!(!cfg.instance.limit_rtl);
        assert!(cfg.remote.enabled);
        assert!(!cli.no_start);
        Ok(())
    }

    #[test]
    fn calibrate_writes_loadable_references() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut crops = Vec::new();
        for (name, blue) in [("usmc", 200), ("eu", 180), ("china", 120), ("mec", 100)] {
            let path = dir.path().join(format!("{name}.png"));
            RgbImage::from_pixel(41, 13, Rgb([0, 0, blue])).save(&path)?;
            crops.push(path);
        }
        let out = dir.path().join("histograms.json");

        calibrate(&crops[0], &crops[1], &crops[2], &crops[3], &out)?;

        let refs = TeamReferences::load(&out)?;
        assert_eq!(refs.mec.bins()[100], (41 * 13) as f32);
        assert!(refs.usmc.bhattacharyya(&refs.eu) > 0.99);
        Ok(())
    }

    #[test]
    fn calibrate_subcommand_parses() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "auto-spectator",
            "calibrate",
            "--usmc",
            "a.png",
            "--eu",
            "b.png",
            "--china",
            "c.png",
            "--mec",
            "d.png",
        ])?;
        assert!(matches!(cli.command, Some(Commands::Calibrate { out: None, .. })));
        Ok(())
    }
}
