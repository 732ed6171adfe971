//! Compound in-game routines: menu navigation, HUD toggling, spawn-then-suicide and camera
//! rotation, each built from perception queries and timed input.

use std::time::Duration;

use crate::input::{Actions, Key};
use crate::perception::Perception;
use crate::perception::histogram::{self, Histogram, SlotDeltas, TeamReferences};
use crate::perception::layout::{self, Point};
use crate::perception::vocabulary;
use crate::session::{MapInfo, ServerTarget, Team};
use crate::spawn_table;
use crate::supervisor::WindowInfo;

const MENU_SETTLE: Duration = Duration::from_secs(3);
const CONNECT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_POLL_LIMIT: usize = 10;
const FIELD_SETTLE: Duration = Duration::from_millis(300);
const DISCONNECT_MENU_SETTLE: Duration = Duration::from_secs(5);
const SPAWN_MENU_OPEN_SETTLE: Duration = Duration::from_millis(1500);
const SPAWN_CONFIRM_SETTLE: Duration = Duration::from_secs(1);
const SPAWN_CLICK_SETTLE: Duration = Duration::from_millis(300);
const SUICIDE_SETTLE: Duration = Duration::from_millis(500);
const CONSOLE_SETTLE: Duration = Duration::from_millis(100);
const MOTION_FRAMES: usize = 3;
const MOTION_FRAME_INTERVAL: Duration = Duration::from_millis(550);

/// One pass over the end-of-round / loading screen regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenSweep {
    pub round_end: bool,
    pub join_game_button: bool,
    pub map_briefing: bool,
}

impl ScreenSweep {
    /// The end-of-round header without a join button means the next map is loading.
    pub fn map_loading(&self) -> bool {
        self.round_end && !self.join_game_button
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// No coordinates for this map and size; nothing was clicked.
    Unsupported,
    /// The routine ran; `true` if the suicide button was found and pressed.
    Attempted(bool),
}

pub struct GameClient {
    perception: Perception,
    actions: Actions,
    references: TeamReferences,
}

impl GameClient {
    pub fn new(perception: Perception, actions: Actions, references: TeamReferences) -> Self {
        Self {
            perception,
            actions,
            references,
        }
    }

    pub fn game_message_present(&self, origin: Point) -> anyhow::Result<bool> {
        self.perception
            .region_contains(layout::GAME_MESSAGE_TITLE, origin, &[vocabulary::GAME_MESSAGE])
    }

    pub fn read_game_message(&self, origin: Point) -> anyhow::Result<String> {
        self.perception
            .region_text(layout::GAME_MESSAGE_BODY, origin)
    }

    pub async fn close_game_message(&self, origin: Point) -> anyhow::Result<()> {
        self.actions
            .click_at(layout::GAME_MESSAGE_OK.at(origin))
            .await
    }

    pub fn sweep(&self, origin: Point) -> anyhow::Result<ScreenSweep> {
        let round_end = self.perception.region_contains(
            layout::ROUND_END_HEADER,
            origin,
            vocabulary::ROUND_END_LABELS,
        )?;
        let join_game_button = round_end && self.join_game_button_present(origin)?;
        let map_briefing = self.perception.region_contains(
            layout::MAP_BRIEFING_LABEL,
            origin,
            &[vocabulary::MAP_BRIEFING],
        )?;
        Ok(ScreenSweep {
            round_end,
            join_game_button,
            map_briefing,
        })
    }

    pub fn join_game_button_present(&self, origin: Point) -> anyhow::Result<bool> {
        self.perception
            .region_contains(layout::JOIN_GAME_BUTTON, origin, &[vocabulary::JOIN_GAME])
    }

    pub fn spawn_menu_visible(&self, origin: Point) -> anyhow::Result<bool> {
        self.perception.region_contains(
            layout::SPAWN_MENU_CLASS_LABEL,
            origin,
            &[vocabulary::SPAWN_MENU_CLASS],
        )
    }

    pub fn read_map_info(&self, origin: Point) -> anyhow::Result<Option<MapInfo>> {
        let name = self.perception.region_text(layout::MAP_NAME, origin)?;
        let size = self.perception.region_text(layout::MAP_SIZE, origin)?;
        let info = vocabulary::parse_map_info(&name, &size);
        tracing::debug!("game.map_info name={name:?} size={size:?} parsed={info:?}");
        Ok(info)
    }

    pub fn detect_team(&self, origin: Point) -> anyhow::Result<Option<Team>> {
        let refs = &self.references;
        let slot0 = self
            .perception
            .deltas(layout::TEAM_SLOTS[0].at(origin), &[&refs.usmc, &refs.eu])?;
        let slot1 = self
            .perception
            .deltas(layout::TEAM_SLOTS[1].at(origin), &[&refs.china, &refs.mec])?;
        let team = histogram::classify_team(
            SlotDeltas::new(slot0[0], slot0[1]),
            SlotDeltas::new(slot1[0], slot1[1]),
        );
        tracing::debug!("game.team slot0={slot0:?} slot1={slot1:?} team={team:?}");
        Ok(team)
    }

    /// Drives the multiplayer menu's "connect to ip" dialog. `false` if the dialog never
    /// showed up within the poll budget.
    pub async fn connect_to_server(
        &self,
        origin: Point,
        target: &ServerTarget,
    ) -> anyhow::Result<bool> {
        let clock = self.actions.clock();
        // The BFHQ detour resets the multiplayer menu to its default tab.
        self.actions.click_at(layout::MENU_BFHQ.at(origin)).await?;
        clock.sleep(MENU_SETTLE).await;
        self.actions
            .click_at(layout::MENU_MULTIPLAYER.at(origin))
            .await?;

        let mut found = false;
        for _ in 0..CONNECT_POLL_LIMIT {
            found = self.perception.region_contains(
                layout::CONNECT_TO_IP_BUTTON,
                origin,
                &[vocabulary::CONNECT_TO_IP],
            )?;
            clock.sleep(CONNECT_POLL_INTERVAL).await;
            if found {
                break;
            }
        }
        if !found {
            tracing::warn!("game.connect.menu_missing target={target}");
            return Ok(false);
        }

        self.actions
            .click_at(layout::CONNECT_TO_IP_CLICK.at(origin))
            .await?;
        clock.sleep(FIELD_SETTLE).await;

        self.actions.tap_key_times(Key::Backspace, 20).await?;
        self.actions.type_text(&target.ip).await?;
        self.actions.tap_key(Key::Tab).await?;
        self.actions.tap_key_times(Key::Backspace, 10).await?;
        self.actions.type_text(&target.port).await?;
        clock.sleep(FIELD_SETTLE).await;

        // The password field clears itself.
        if let Some(password) = &target.password {
            self.actions.tap_key(Key::Tab).await?;
            self.actions.type_text(password).await?;
            clock.sleep(FIELD_SETTLE).await;
        }

        self.actions
            .click_at(layout::CONNECT_DIALOG_OK.at(origin))
            .await?;
        tracing::info!("game.connect.submitted target={target}");
        Ok(true)
    }

    pub async fn disconnect(&self, origin: Point) -> anyhow::Result<()> {
        self.actions.tap_key(Key::Escape).await?;
        self.actions.clock().sleep(DISCONNECT_MENU_SETTLE).await;
        self.actions
            .click_at(layout::BOTTOM_RIGHT_BUTTON.at(origin))
            .await
    }

    pub async fn open_spawn_menu(&self) -> anyhow::Result<()> {
        self.actions.tap_key(Key::Enter).await?;
        self.actions.clock().sleep(SPAWN_MENU_OPEN_SETTLE).await;
        Ok(())
    }

    pub async fn toggle_hud(&self, visible: bool) -> anyhow::Result<()> {
        let clock = self.actions.clock();
        self.actions.tap_key(Key::Console).await?;
        clock.sleep(CONSOLE_SETTLE).await;
        self.actions.tap_key_times(Key::Backspace, 2).await?;
        self.actions
            .type_text(&format!("renderer.drawHud {}", u8::from(visible)))
            .await?;
        clock.sleep(FIELD_SETTLE).await;
        self.actions.tap_key(Key::Enter).await?;
        clock.sleep(CONSOLE_SETTLE).await;
        self.actions.tap_key(Key::Console).await?;
        clock.sleep(CONSOLE_SETTLE).await;
        Ok(())
    }

    /// Spawns at the team's default point and immediately suicides, which leaves the camera
    /// in spectator mode for the rest of the round.
    pub async fn spawn_suicide(
        &self,
        origin: Point,
        map: MapInfo,
        team: Team,
    ) -> anyhow::Result<SpawnOutcome> {
        let Some(points) = spawn_table::lookup(map.name, map.size, team) else {
            return Ok(SpawnOutcome::Unsupported);
        };
        let clock = self.actions.clock();

        self.actions.move_from_corner(points.spawn).await?;
        clock.sleep(SPAWN_CLICK_SETTLE).await;
        self.actions.click().await?;

        self.actions.tap_key(Key::Enter).await?;
        clock.sleep(SPAWN_CONFIRM_SETTLE).await;
        // Second enter reopens the spawn menu.
        self.actions.tap_key(Key::Enter).await?;
        clock.sleep(SPAWN_CLICK_SETTLE).await;

        self.actions.move_from_corner(points.deselect).await?;
        clock.sleep(SPAWN_CLICK_SETTLE).await;
        self.actions.click().await?;
        self.actions.reset_cursor().await?;

        let suicide_present = self.perception.region_contains(
            layout::SUICIDE_BUTTON,
            origin,
            &[vocabulary::SUICIDE],
        )?;
        if suicide_present {
            let target = layout::SUICIDE_CLICK_MICKEYS;
            self.actions.move_by(target.x, target.y).await?;
            clock.sleep(SPAWN_CLICK_SETTLE).await;
            self.actions.click().await?;
            clock.sleep(SUICIDE_SETTLE).await;
        }
        Ok(SpawnOutcome::Attempted(suicide_present))
    }

    /// Samples the camera area a few times; a static picture means an idle or dead player.
    pub async fn sufficient_action_on_screen(&self, window: &WindowInfo) -> anyhow::Result<bool> {
        let area = layout::camera_region(window.rect.width(), window.rect.height())
            .at(window.rect.origin());
        let mut frames: Vec<Histogram> = Vec::with_capacity(MOTION_FRAMES);
        for i in 0..MOTION_FRAMES {
            frames.push(self.perception.histogram(area)?);
            if i + 1 < MOTION_FRAMES {
                self.actions.clock().sleep(MOTION_FRAME_INTERVAL).await;
            }
        }
        Ok(histogram::sufficient_motion(&frames))
    }

    pub async fn rotate_to_next_player(&self) -> anyhow::Result<()> {
        self.actions.tap_key(Key::NextPlayer).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::spawn_table::MapId;
    use crate::testing::{FakeClock, FakeHost, InputEvent, RecordingInput, ScriptedScreen};

    struct Rig {
        screen: Arc<ScriptedScreen>,
        input: Arc<RecordingInput>,
        clock: Arc<FakeClock>,
        game: GameClient,
    }

    fn solid(blue: u8) -> Histogram {
        Histogram::of_blue_channel(&RgbImage::from_pixel(4, 4, Rgb([0, 0, blue])))
    }

    fn rig() -> Rig {
        let screen = Arc::new(ScriptedScreen::default());
        let input = Arc::new(RecordingInput::default());
        let clock = Arc::new(FakeClock::default());
        let game = GameClient::new(
            Perception::new(screen.clone(), screen.clone()),
            Actions::new(input.clone(), clock.clone()),
            TeamReferences {
                usmc: solid(200),
                eu: solid(180),
                china: solid(120),
                mec: solid(100),
            },
        );
        Rig {
            screen,
            input,
            clock,
            game,
        }
    }

    const ORIGIN: Point = Point::new(5, 5);

    #[tokio::test]
    async fn unsupported_map_spawns_without_input() -> anyhow::Result<()> {
        let rig = rig();
        let map = MapInfo {
            name: MapId::GreatWall,
            size: 64,
        };
        let outcome = rig.game.spawn_suicide(ORIGIN, map, Team::UsmcEu).await?;
        assert_eq!(outcome, SpawnOutcome::Unsupported);
        assert!(rig.input.events().is_empty());
        assert!(rig.clock.sleeps().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn spawn_suicide_clicks_suicide_when_visible() -> anyhow::Result<()> {
        let rig = rig();
        rig.screen
            .set_text(layout::SUICIDE_BUTTON.rect.at(ORIGIN), "SUICIDE");
        let map = MapInfo {
            name: MapId::StrikeAtKarkand,
            size: 64,
        };
        let outcome = rig.game.spawn_suicide(ORIGIN, map, Team::ChinaMec).await?;
        assert_eq!(outcome, SpawnOutcome::Attempted(true));

        let events = rig.input.events();
        assert!(events.contains(&InputEvent::MoveRelative(469, 459)));
        assert_eq!(rig.input.key_taps(Key::Enter), 2);
        Ok(())
    }

    #[tokio::test]
    async fn spawn_reports_failure_without_suicide_button() -> anyhow::Result<()> {
        let rig = rig();
        let map = MapInfo {
            name: MapId::StrikeAtKarkand,
            size: 64,
        };
        let outcome = rig.game.spawn_suicide(ORIGIN, map, Team::UsmcEu).await?;
        assert_eq!(outcome, SpawnOutcome::Attempted(false));
        assert!(!rig.input.events().contains(&InputEvent::MoveRelative(469, 459)));
        Ok(())
    }

    #[tokio::test]
    async fn connect_gives_up_after_ten_polls() -> anyhow::Result<()> {
        let rig = rig();
        let target = ServerTarget::new("1.2.3.4", "16567", None);
        assert!(!rig.game.connect_to_server(ORIGIN, &target).await?);
        let polls = rig
            .clock
            .sleeps()
            .into_iter()
            .filter(|d| *d == CONNECT_POLL_INTERVAL)
            .count();
        assert_eq!(polls, 10);
        assert_eq!(rig.input.typed_text(), "");
        Ok(())
    }

    #[tokio::test]
    async fn connect_types_address_and_password() -> anyhow::Result<()> {
        let rig = rig();
        rig.screen
            .set_text(layout::CONNECT_TO_IP_BUTTON.rect.at(ORIGIN), "Connect to IP");
        let target = ServerTarget::new("1.2.3.4", "16567", Some("pw".into()));
        assert!(rig.game.connect_to_server(ORIGIN, &target).await?);
        assert_eq!(rig.input.typed_text(), "1.2.3.416567pw");
        assert_eq!(rig.input.key_taps(Key::Tab), 2);
        assert_eq!(rig.input.key_taps(Key::Backspace), 30);
        let ok = layout::CONNECT_DIALOG_OK.at(ORIGIN);
        assert!(rig.input.events().contains(&InputEvent::SetCursor(ok.x, ok.y)));
        Ok(())
    }

    #[tokio::test]
    async fn hud_toggle_types_console_command() -> anyhow::Result<()> {
        let rig = rig();
        rig.game.toggle_hud(false).await?;
        assert_eq!(rig.input.typed_text(), "renderer.drawHud 0");
        assert_eq!(rig.input.key_taps(Key::Console), 2);
        Ok(())
    }

    #[test]
    fn team_detected_from_slot_histograms() -> anyhow::Result<()> {
        let rig = rig();
        assert_eq!(rig.game.detect_team(ORIGIN)?, None);

        rig.screen.set_image(
            layout::TEAM_SLOTS[1].at(ORIGIN),
            RgbImage::from_pixel(41, 13, Rgb([0, 0, 100])),
        );
        assert_eq!(rig.game.detect_team(ORIGIN)?, Some(Team::ChinaMec));
        Ok(())
    }

    #[test]
    fn map_loading_needs_round_end_without_join_button() -> anyhow::Result<()> {
        let rig = rig();
        rig.screen
            .set_text(layout::ROUND_END_HEADER.rect.at(ORIGIN), "top players  top scores");
        let sweep = rig.game.sweep(ORIGIN)?;
        assert!(sweep.round_end && sweep.map_loading());

        rig.screen
            .set_text(layout::JOIN_GAME_BUTTON.rect.at(ORIGIN), "join game");
        assert!(!rig.game.sweep(ORIGIN)?.map_loading());
        Ok(())
    }

    #[tokio::test]
    async fn static_camera_is_insufficient_action() -> anyhow::Result<()> {
        let rig = rig();
        let window = FakeHost::game_window(1, 10);
        assert!(!rig.game.sufficient_action_on_screen(&window).await?);
        assert_eq!(rig.clock.sleeps(), vec![MOTION_FRAME_INTERVAL; 2]);

        let area = layout::camera_region(window.rect.width(), window.rect.height())
            .at(window.rect.origin());
        let frame = |blue| RgbImage::from_pixel(8, 8, Rgb([0, 0, blue]));
        rig.screen
            .queue_frames(area, vec![frame(10), frame(90), frame(170)]);
        assert!(rig.game.sufficient_action_on_screen(&window).await?);
        Ok(())
    }
}
