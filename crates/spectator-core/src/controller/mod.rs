//! The spectator control loop.
//!
//! Every tick re-classifies the game from scratch: [`SpectatorController::observe`] walks the
//! conditions in fixed priority order and reports the first that holds, then
//! [`SpectatorController::act`] runs exactly one corrective branch for it. Nothing observed is
//! cached across ticks, so a higher-priority condition always pre-empts a lower one.

mod observation;

pub use observation::{Branch, Halt, Observation, Stamped, TickOutcome};

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::game::{GameClient, SpawnOutcome};
use crate::perception::layout::Point;
use crate::perception::vocabulary::{self, MessageKind};
use crate::remote::{Command, RemoteControl};
use crate::session::SessionState;
use crate::supervisor::{Supervisor, WindowInfo};

/// Consecutive unresponsive observations tolerated before relaunching. The client freezes
/// briefly after every map load and server join.
pub const UNRESPONSIVE_LIMIT: u32 = 3;

const UNRESPONSIVE_WAIT: Duration = Duration::from_secs(2);
/// Together with the connect routine's own polling this gives a full server ~30s.
const SERVER_FULL_WAIT: Duration = Duration::from_secs(20);
const KILL_SETTLE: Duration = Duration::from_secs(3);
const MAP_SCREEN_WAIT: Duration = Duration::from_secs(3);
const STAY_ON_PLAYER_WAIT: Duration = Duration::from_secs(2);
const TEAM_RETRY_WAIT: Duration = Duration::from_secs(2);
const TEAM_SWAP_WAIT: Duration = Duration::from_secs(3);
const HUD_SETTLE: Duration = Duration::from_secs(1);
const ROTATION_PAUSE_WAIT: Duration = Duration::from_secs(4);
/// Back-off after a tick errored, so a relaunch that keeps failing does not spin.
const FAILED_TICK_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Ticks to stay on one player before rotating.
    pub max_iterations_on_player: u32,
    pub limit_rtl: bool,
    pub rounds_to_live: u32,
    pub rotation_pause: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_iterations_on_player: 5,
            limit_rtl: true,
            rounds_to_live: 6,
            rotation_pause: Duration::from_secs(10 * 60),
        }
    }
}

pub struct SpectatorController {
    supervisor: Supervisor,
    game: GameClient,
    clock: Arc<dyn Clock>,
    remote: Option<Arc<dyn RemoteControl>>,
    settings: ControllerSettings,
    window: Option<WindowInfo>,
    hold_ticks: u32,
    force_next_player: bool,
}

impl SpectatorController {
    pub fn new(
        supervisor: Supervisor,
        game: GameClient,
        clock: Arc<dyn Clock>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            supervisor,
            game,
            clock,
            remote: None,
            // Start at the cap so a dead or idle spectated player is skipped right away.
            hold_ticks: settings.max_iterations_on_player,
            settings,
            window: None,
            force_next_player: false,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteControl>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn hold_ticks(&self) -> u32 {
        self.hold_ticks
    }

    /// Starts (or attaches to) the game client before the first tick.
    pub async fn bootstrap(&mut self, state: &mut SessionState, launch: bool) -> anyhow::Result<()> {
        if self.remote.is_some() {
            self.sync_join_target(state).await;
        }
        if launch {
            tracing::info!("spectator.bootstrap.launch");
            self.start_instance(state).await?;
        } else {
            tracing::info!("spectator.bootstrap.attach");
            self.window = self.supervisor.find_game_window()?;
            if self.window.is_none() {
                tracing::warn!("spectator.bootstrap.attach.no_window");
                state.require_restart();
            }
        }
        Ok(())
    }

    /// Ticks until a run-fatal condition comes up.
    pub async fn run(&mut self, state: &mut SessionState) -> Halt {
        loop {
            if let TickOutcome::Halt(halt) = self.tick(state).await {
                return halt;
            }
        }
    }

    pub async fn tick(&mut self, state: &mut SessionState) -> TickOutcome {
        match self.step(state).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("spectator.tick.error {err:#}");
                state.require_restart();
                self.clock.sleep(FAILED_TICK_WAIT).await;
                TickOutcome::Failed
            }
        }
    }

    async fn step(&mut self, state: &mut SessionState) -> anyhow::Result<TickOutcome> {
        self.window = self.supervisor.find_game_window()?;
        if !state.restart_pending() {
            match &self.window {
                None => {
                    tracing::error!("spectator.window.missing");
                    state.require_restart();
                }
                Some(window) => {
                    if let Err(err) = self.supervisor.bring_to_foreground(window) {
                        tracing::error!("spectator.window.gone {err:#}");
                        state.require_restart();
                    }
                }
            }
        }

        self.force_next_player = false;
        if self.remote.is_some() {
            self.apply_remote_commands(state).await;
        }

        let observed = self.observe(state).await?;
        self.act(state, observed).await
    }

    /// Classifies the current game condition. The only state touched here is bookkeeping
    /// that belongs to the observation itself: the unresponsive streak, an expired rotation
    /// pause and the remote server target.
    pub async fn observe(&mut self, state: &mut SessionState) -> anyhow::Result<Stamped> {
        let epoch = state.restart_epoch();
        let observation = self.classify(state).await?;
        tracing::debug!("spectator.observe epoch={epoch} observation={observation:?}");
        Ok(Stamped { epoch, observation })
    }

    async fn classify(&mut self, state: &mut SessionState) -> anyhow::Result<Observation> {
        if state.restart_pending() {
            return Ok(Observation::RestartPending);
        }
        let Some(window) = self.window.clone() else {
            return Ok(Observation::RestartPending);
        };
        let origin = window.rect.origin();

        if !self.supervisor.is_responsive(window.pid)? {
            return Ok(Observation::Unresponsive {
                over_limit: state.unresponsive_count() >= UNRESPONSIVE_LIMIT,
            });
        }
        if state.unresponsive_count() > 0 {
            tracing::info!(
                "spectator.unresponsive.recovered count={}",
                state.unresponsive_count()
            );
            state.reset_unresponsive();
        }

        if self.supervisor.error_dialog_present()? {
            return Ok(Observation::ErrorDialog);
        }

        if self.game.game_message_present(origin)? {
            let text = self.game.read_game_message(origin)?;
            return Ok(Observation::GameMessage { text });
        }

        if self.remote.is_some()
            && (!state.spectator_on_server
                || (state.rotation.on_map && self.hold_ticks >= self.settings.max_iterations_on_player))
        {
            self.sync_join_target(state).await;
        }
        if state.server_switch_pending() {
            return Ok(Observation::ServerSwitch);
        }
        if !state.spectator_on_server {
            return Ok(Observation::OffServer);
        }

        let sweep = self.game.sweep(origin)?;
        if self.settings.limit_rtl
            && sweep.round_end
            && state.round.number >= self.settings.rounds_to_live
        {
            return Ok(Observation::RtlLimit);
        }
        if sweep.map_loading() {
            return Ok(Observation::MapLoading);
        }
        if sweep.map_briefing {
            let map = self.game.read_map_info(origin)?;
            return Ok(Observation::MapBriefing { map });
        }
        if sweep.round_end {
            return Ok(Observation::RoundEnd);
        }
        if !state.round.spawned() {
            return Ok(Observation::NeedSpawn);
        }
        if !state.round.hud_hidden {
            return Ok(Observation::NeedHideHud);
        }
        if self.hold_ticks < self.settings.max_iterations_on_player && !self.force_next_player {
            return Ok(Observation::StayOnPlayer);
        }
        if !self.force_next_player && state.rotation_paused(self.clock.now()) {
            return Ok(Observation::RotationPaused);
        }
        Ok(Observation::RotateToNextPlayer)
    }

    /// Runs the branch for one observation. Observations taken before the latest restart
    /// transition are dropped.
    pub async fn act(
        &mut self,
        state: &mut SessionState,
        stamped: Stamped,
    ) -> anyhow::Result<TickOutcome> {
        if stamped.epoch != state.restart_epoch() {
            tracing::warn!(
                "spectator.observation.stale epoch={} current={}",
                stamped.epoch,
                state.restart_epoch()
            );
            return Ok(TickOutcome::Discarded);
        }

        let branch = stamped.observation.branch();
        tracing::info!("spectator.branch {branch:?}");
        let origin = self
            .window
            .as_ref()
            .map(|w| w.rect.origin())
            .unwrap_or(Point::new(0, 0));

        match stamped.observation {
            Observation::RestartPending => self.restart(state).await?,
            Observation::Unresponsive { over_limit: true } => {
                tracing::error!("spectator.unresponsive.limit_exceeded");
                state.require_restart();
            }
            Observation::Unresponsive { over_limit: false } => {
                let count = state.note_unresponsive();
                tracing::info!("spectator.unresponsive count={count}");
                self.clock.sleep(UNRESPONSIVE_WAIT).await;
            }
            Observation::ErrorDialog => {
                tracing::error!("spectator.error_dialog");
                state.require_restart();
            }
            Observation::GameMessage { text } => {
                if let Some(halt) = self.handle_game_message(state, origin, &text).await? {
                    return Ok(TickOutcome::Halt(halt));
                }
            }
            Observation::ServerSwitch => {
                tracing::info!("spectator.server_switch target={}", state.server);
                state.spectator_on_server = false;
                self.game.disconnect(origin).await?;
                if state.round.number + 1 >= self.settings.rounds_to_live {
                    tracing::info!("spectator.rtl.extend");
                    state.round.number = state.round.number.saturating_sub(1);
                }
            }
            Observation::OffServer => self.connect(state, origin).await?,
            Observation::RtlLimit => {
                tracing::info!("spectator.rtl.reached rounds={}", state.round.number);
                state.require_rtl_restart();
            }
            Observation::MapLoading => {
                if state.rotation.on_map {
                    tracing::info!("spectator.rotation.reset");
                    state.rotation_reset();
                }
                self.hold_ticks = self.settings.max_iterations_on_player;
                self.clock.sleep(MAP_SCREEN_WAIT).await;
            }
            Observation::MapBriefing { map } => {
                if let Some(map) = map
                    && state.rotation.map != Some(map)
                {
                    tracing::info!("spectator.map name={} size={}", map.name, map.size);
                    state.set_map(map);
                    state.rotation.active_join_possible = true;
                }
                if state.rotation.active_join_possible && self.game.join_game_button_present(origin)? {
                    self.on_join_game_available(state);
                }
                self.clock.sleep(MAP_SCREEN_WAIT).await;
            }
            Observation::RoundEnd => {
                state.round_end_reset();
                self.hold_ticks = self.settings.max_iterations_on_player;
                self.clock.sleep(MAP_SCREEN_WAIT).await;
            }
            Observation::NeedSpawn => self.spawn(state, origin).await?,
            Observation::NeedHideHud => {
                self.game.toggle_hud(false).await?;
                state.round.hud_hidden = true;
                state.round.number += 1;
                state.rotation.on_map = true;
                tracing::info!("spectator.round.entered number={}", state.round.number);
            }
            Observation::StayOnPlayer => {
                let window = self
                    .window
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("game window vanished"))?;
                if self.game.sufficient_action_on_screen(&window).await? {
                    self.hold_ticks += 1;
                    self.clock.sleep(STAY_ON_PLAYER_WAIT).await;
                } else {
                    tracing::info!("spectator.player.idle");
                    self.hold_ticks = self.settings.max_iterations_on_player;
                }
            }
            Observation::RotationPaused => {
                if let Some(until) = state.rotation_pause.until {
                    tracing::info!("spectator.rotation.paused until={until:?}");
                }
                self.clock.sleep(ROTATION_PAUSE_WAIT).await;
            }
            Observation::RotateToNextPlayer => {
                self.game.rotate_to_next_player().await?;
                self.hold_ticks = 0;
            }
        }

        Ok(TickOutcome::Continue(branch))
    }

    async fn handle_game_message(
        &mut self,
        state: &mut SessionState,
        origin: Point,
        text: &str,
    ) -> anyhow::Result<Option<Halt>> {
        tracing::info!("spectator.game_message text={text:?}");
        self.game.close_game_message(origin).await?;

        match vocabulary::classify_message(text) {
            MessageKind::ServerFull => {
                state.spectator_on_server = false;
                self.clock.sleep(SERVER_FULL_WAIT).await;
            }
            MessageKind::Kicked | MessageKind::ConnectionLost | MessageKind::ModifiedContent => {
                state.spectator_on_server = false;
            }
            MessageKind::InvalidIpAddress => state.require_restart(),
            MessageKind::Banned => return Ok(Some(Halt::Banned)),
            MessageKind::Unrecognized(text) => return Ok(Some(Halt::UnrecognizedMessage(text))),
        }
        Ok(None)
    }

    async fn restart(&mut self, state: &mut SessionState) -> anyhow::Result<()> {
        if let Some(window) = self.window.take() {
            tracing::info!(
                "spectator.restart.kill pid={} planned={}",
                window.pid,
                !state.restart_required()
            );
            self.supervisor.force_kill(window.pid)?;
            self.clock.sleep(KILL_SETTLE).await;
        }
        self.start_instance(state).await
    }

    /// Launches the client and gets it onto the target server. Leaves the restart pending if
    /// no window came up.
    async fn start_instance(&mut self, state: &mut SessionState) -> anyhow::Result<()> {
        let target = state.server.clone();
        let auto_join = target.joins_automatically();
        self.supervisor
            .launch(auto_join.then_some(&target))
            .await?;

        let Some(window) = self.supervisor.find_game_window()? else {
            tracing::error!("spectator.restart.no_window");
            state.require_restart();
            return Ok(());
        };
        if let Err(err) = self.supervisor.bring_to_foreground(&window) {
            tracing::error!("spectator.restart.foreground {err:#}");
            state.require_restart();
            return Ok(());
        }
        self.window = Some(window.clone());

        state.restart_reset(auto_join);
        if auto_join {
            state.spectator_on_server = true;
            state.joined_server = Some(target.clone());
            self.report_current_server(&target).await;
        } else {
            self.connect(state, window.rect.origin()).await?;
        }
        Ok(())
    }

    /// Joins the target server through the menu. Any join attempt is a rotation boundary.
    async fn connect(&mut self, state: &mut SessionState, origin: Point) -> anyhow::Result<()> {
        let target = state.server.clone();
        tracing::info!("spectator.connect target={target}");
        let connected = self.game.connect_to_server(origin, &target).await?;
        state.rotation_reset();
        state.spectator_on_server = connected;
        if connected {
            state.joined_server = Some(target.clone());
            self.report_current_server(&target).await;
        }
        Ok(())
    }

    async fn spawn(&mut self, state: &mut SessionState, origin: Point) -> anyhow::Result<()> {
        if state.round.hud_hidden {
            // Give the game time to swap teams before the spawn menu is read.
            self.clock.sleep(TEAM_SWAP_WAIT).await;
            self.game.toggle_hud(true).await?;
            state.round.hud_hidden = false;
            self.clock.sleep(HUD_SETTLE).await;
        }

        if !self.game.spawn_menu_visible(origin)? {
            tracing::info!("spectator.spawn.menu_closed");
            self.game.open_spawn_menu().await?;
            // Forces the HUD cycle again on the next attempt.
            state.round.hud_hidden = true;
            return Ok(());
        }

        let team = self.game.detect_team(origin)?;
        match (team, state.rotation.map) {
            (Some(team), Some(map)) => {
                state.round.team = Some(team);
                match self.game.spawn_suicide(origin, map, team).await? {
                    SpawnOutcome::Unsupported => {
                        tracing::warn!(
                            "spectator.spawn.unsupported map={} size={}",
                            map.name,
                            map.size
                        );
                        state.set_round_spawned(true);
                    }
                    SpawnOutcome::Attempted(spawned) => {
                        tracing::info!("spectator.spawn team={team:?} spawned={spawned}");
                        state.set_round_spawned(spawned);
                    }
                }
            }
            (None, Some(_)) => {
                tracing::warn!("spectator.spawn.team_unknown");
                state.round.hud_hidden = true;
                self.clock.sleep(TEAM_RETRY_WAIT).await;
            }
            (_, None) => {
                tracing::error!("spectator.spawn.map_unknown");
                self.game.disconnect(origin).await?;
                state.spectator_on_server = false;
            }
        }
        Ok(())
    }

    /// Extension point for actively joining from the briefing screen. Joining is left to
    /// the game for now.
    fn on_join_game_available(&self, state: &SessionState) {
        tracing::debug!(
            "spectator.join_game.available map={:?}",
            state.map_name().map(|m| m.slug())
        );
    }

    async fn apply_remote_commands(&mut self, state: &mut SessionState) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let commands = match remote.commands().await {
            Ok(commands) => commands,
            Err(err) => {
                tracing::warn!("spectator.remote.commands {err:#}");
                return;
            }
        };
        for command in commands.issued() {
            if let Err(err) = remote.acknowledge(command).await {
                tracing::warn!("spectator.remote.ack command={} {err:#}", command.name());
                continue;
            }
            tracing::info!("spectator.remote.command {}", command.name());
            match command {
                Command::GameRestart => state.require_restart(),
                Command::PauseRotation => {
                    state.pause_rotation(self.clock.now(), self.settings.rotation_pause)
                }
                Command::ResumeRotation => state.resume_rotation(),
                Command::NextPlayer => self.force_next_player = true,
            }
        }
    }

    /// Adopts the remote's join target, or reports where we are if it has nothing new.
    async fn sync_join_target(&mut self, state: &mut SessionState) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        match remote.join_server().await {
            Ok(Some(target)) if target != state.server => {
                tracing::info!("spectator.remote.join_target target={target}");
                state.server = target;
            }
            Ok(_) => {
                if state.spectator_on_server
                    && let Some(joined) = state.joined_server.clone()
                {
                    self.report_current_server(&joined).await;
                }
            }
            Err(err) => tracing::warn!("spectator.remote.join_server {err:#}"),
        }
    }

    async fn report_current_server(&self, server: &crate::session::ServerTarget) {
        if let Some(remote) = &self.remote
            && let Err(err) = remote.post_current_server(server).await
        {
            tracing::warn!("spectator.remote.current_server {err:#}");
        }
    }
}
