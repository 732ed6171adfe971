//! Scripted stand-ins for the OS-facing traits, shared by unit and integration tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};

use crate::controller::{ControllerSettings, SpectatorController, TickOutcome};
use crate::game::GameClient;
use crate::input::{Actions, InputDevice, Key};
use crate::perception::histogram::{Histogram, TeamReferences};
use crate::perception::layout::{self, Point, Rect, TextRegion};
use crate::perception::{Perception, Screen, TextRecognizer};
use crate::remote::{Command, RemoteCommands, RemoteControl};
use crate::session::{ServerTarget, SessionState, Team};
use crate::supervisor::{
    GameHost, Identity, LaunchSpec, Supervisor, SupervisorSettings, WindowInfo, WindowRect,
};

pub use crate::clock::FakeClock;

/// Screen whose OCR answers are scripted per absolute region.
///
/// `recognize` answers for the region captured last, which matches how perception always
/// pairs one capture with one OCR call.
#[derive(Default)]
pub struct ScriptedScreen {
    inner: Mutex<ScreenState>,
}

#[derive(Default)]
struct ScreenState {
    texts: HashMap<Rect, String>,
    images: HashMap<Rect, RgbImage>,
    frames: HashMap<Rect, VecDeque<RgbImage>>,
    failing_ocr: HashSet<Rect>,
    failing_capture: HashSet<Rect>,
    last_area: Option<Rect>,
}

impl ScriptedScreen {
    pub fn set_text(&self, area: Rect, text: &str) {
        self.inner.lock().unwrap().texts.insert(area, text.to_string());
    }

    pub fn clear_text(&self, area: Rect) {
        self.inner.lock().unwrap().texts.remove(&area);
    }

    pub fn set_image(&self, area: Rect, image: RgbImage) {
        self.inner.lock().unwrap().images.insert(area, image);
    }

    /// Images returned by successive captures of `area`, before falling back to `set_image`.
    pub fn queue_frames(&self, area: Rect, frames: Vec<RgbImage>) {
        self.inner
            .lock()
            .unwrap()
            .frames
            .entry(area)
            .or_default()
            .extend(frames);
    }

    pub fn fail_ocr(&self, area: Rect) {
        self.inner.lock().unwrap().failing_ocr.insert(area);
    }

    pub fn fail_capture(&self, area: Rect) {
        self.inner.lock().unwrap().failing_capture.insert(area);
    }
}

impl Screen for ScriptedScreen {
    fn capture(&self, area: Rect) -> anyhow::Result<RgbImage> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_capture.contains(&area) {
            anyhow::bail!("capture device unavailable");
        }
        inner.last_area = Some(area);
        if let Some(frame) = inner.frames.get_mut(&area).and_then(VecDeque::pop_front) {
            return Ok(frame);
        }
        Ok(inner
            .images
            .get(&area)
            .cloned()
            .unwrap_or_else(|| RgbImage::new(area.width, area.height)))
    }
}

impl TextRecognizer for ScriptedScreen {
    fn recognize(&self, _image: &RgbImage) -> anyhow::Result<String> {
        let inner = self.inner.lock().unwrap();
        let Some(area) = inner.last_area else {
            return Ok(String::new());
        };
        if inner.failing_ocr.contains(&area) {
            anyhow::bail!("tesseract exited with status 1");
        }
        Ok(inner.texts.get(&area).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(Key, bool),
    Char(char),
    MoveRelative(i32, i32),
    SetCursor(i32, i32),
    LeftButton(bool),
}

#[derive(Default)]
pub struct RecordingInput {
    events: Mutex<Vec<InputEvent>>,
}

impl RecordingInput {
    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn typed_text(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Char(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn key_taps(&self, key: Key) -> usize {
        self.events()
            .into_iter()
            .filter(|e| *e == InputEvent::Key(key, true))
            .count()
    }

    fn push(&self, event: InputEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

impl InputDevice for RecordingInput {
    fn key(&self, key: Key, pressed: bool) -> anyhow::Result<()> {
        self.push(InputEvent::Key(key, pressed))
    }

    fn type_char(&self, c: char) -> anyhow::Result<()> {
        self.push(InputEvent::Char(c))
    }

    fn move_relative(&self, dx: i32, dy: i32) -> anyhow::Result<()> {
        self.push(InputEvent::MoveRelative(dx, dy))
    }

    fn set_cursor(&self, x: i32, y: i32) -> anyhow::Result<()> {
        self.push(InputEvent::SetCursor(x, y))
    }

    fn left_button(&self, pressed: bool) -> anyhow::Result<()> {
        self.push(InputEvent::LeftButton(pressed))
    }
}

/// Window list and process table under test control.
#[derive(Default)]
pub struct FakeHost {
    inner: Mutex<HostState>,
}

#[derive(Default)]
struct HostState {
    windows: Vec<WindowInfo>,
    unresponsive: HashSet<u32>,
    responsive_script: VecDeque<bool>,
    launches: Vec<LaunchSpec>,
    kills: Vec<u32>,
    window_after_launch: Option<WindowInfo>,
    foreground_fails: bool,
    launch_fails: bool,
}

impl FakeHost {
    /// A game client window at the launch position used by the supervisor.
    pub fn game_window(handle: usize, pid: u32) -> WindowInfo {
        WindowInfo {
            handle,
            title: format!("BF2 (v1.5.3153-802.0, pid: {pid})"),
            rect: WindowRect {
                left: 5,
                top: 5,
                right: 1301,
                bottom: 764,
            },
            class_name: "BF2".into(),
            pid,
        }
    }

    pub fn add_window(&self, window: WindowInfo) {
        self.inner.lock().unwrap().windows.push(window);
    }

    pub fn remove_windows(&self) {
        self.inner.lock().unwrap().windows.clear();
    }

    /// Window that appears when the next launch happens.
    pub fn spawn_window_on_launch(&self, window: WindowInfo) {
        self.inner.lock().unwrap().window_after_launch = Some(window);
    }

    pub fn set_unresponsive(&self, pid: u32, unresponsive: bool) {
        let mut inner = self.inner.lock().unwrap();
        if unresponsive {
            inner.unresponsive.insert(pid);
        } else {
            inner.unresponsive.remove(&pid);
        }
    }

    /// Responsiveness answers consumed one per query, ahead of `set_unresponsive`.
    pub fn script_responsive(&self, answers: impl IntoIterator<Item = bool>) {
        self.inner.lock().unwrap().responsive_script.extend(answers);
    }

    pub fn fail_foreground(&self, fail: bool) {
        self.inner.lock().unwrap().foreground_fails = fail;
    }

    /// Every launch is recorded and then rejected, as if the executable were missing.
    pub fn fail_launch(&self, fail: bool) {
        self.inner.lock().unwrap().launch_fails = fail;
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.inner.lock().unwrap().launches.clone()
    }

    pub fn kills(&self) -> Vec<u32> {
        self.inner.lock().unwrap().kills.clone()
    }
}

impl GameHost for FakeHost {
    fn launch(&self, spec: &LaunchSpec) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.launches.push(spec.clone());
        if inner.launch_fails {
            anyhow::bail!("failed to start {}", spec.executable);
        }
        if let Some(window) = inner.window_after_launch.take() {
            inner.windows.push(window);
        }
        Ok(())
    }

    fn windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
        Ok(self.inner.lock().unwrap().windows.clone())
    }

    fn bring_to_foreground(&self, window: &WindowInfo) -> anyhow::Result<()> {
        let inner = self.inner.lock().unwrap();
        if inner.foreground_fails || !inner.windows.iter().any(|w| w.handle == window.handle) {
            anyhow::bail!("invalid window handle {}", window.handle);
        }
        Ok(())
    }

    fn is_responsive(&self, pid: u32) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(answer) = inner.responsive_script.pop_front() {
            return Ok(answer);
        }
        Ok(!inner.unresponsive.contains(&pid))
    }

    fn force_kill(&self, pid: u32) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.kills.push(pid);
        let before = inner.windows.len();
        inner.windows.retain(|w| w.pid != pid);
        Ok(inner.windows.len() != before)
    }
}

type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Web controller with queued command sets and a fixed join target.
#[derive(Default)]
pub struct ScriptedRemote {
    inner: Mutex<RemoteState>,
}

#[derive(Default)]
struct RemoteState {
    commands: VecDeque<RemoteCommands>,
    join_target: Option<ServerTarget>,
    acknowledged: Vec<Command>,
    posted: Vec<ServerTarget>,
    offline: bool,
}

impl ScriptedRemote {
    pub fn queue_commands(&self, commands: RemoteCommands) {
        self.inner.lock().unwrap().commands.push_back(commands);
    }

    pub fn set_join_target(&self, target: Option<ServerTarget>) {
        self.inner.lock().unwrap().join_target = target;
    }

    /// Every request fails, as if the controller were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    pub fn acknowledged(&self) -> Vec<Command> {
        self.inner.lock().unwrap().acknowledged.clone()
    }

    pub fn posted(&self) -> Vec<ServerTarget> {
        self.inner.lock().unwrap().posted.clone()
    }

    fn online(&self) -> anyhow::Result<std::sync::MutexGuard<'_, RemoteState>> {
        let inner = self.inner.lock().unwrap();
        if inner.offline {
            anyhow::bail!("connection refused");
        }
        Ok(inner)
    }
}

impl RemoteControl for ScriptedRemote {
    fn commands<'a>(&'a self) -> RemoteFuture<'a, RemoteCommands> {
        Box::pin(async move { Ok(self.online()?.commands.pop_front().unwrap_or_default()) })
    }

    fn acknowledge<'a>(&'a self, command: Command) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.online()?.acknowledged.push(command);
            Ok(())
        })
    }

    fn join_server<'a>(&'a self) -> RemoteFuture<'a, Option<ServerTarget>> {
        Box::pin(async move { Ok(self.online()?.join_target.clone()) })
    }

    fn post_current_server<'a>(&'a self, server: &'a ServerTarget) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.online()?.posted.push(server.clone());
            Ok(())
        })
    }
}

fn solid_histogram(blue: u8) -> Histogram {
    Histogram::of_blue_channel(&RgbImage::from_pixel(4, 4, Rgb([0, 0, blue])))
}

/// Team references whose flags are single blue shades, matched by [`ControllerRig::show_team`].
pub fn solid_team_references() -> TeamReferences {
    TeamReferences {
        usmc: solid_histogram(200),
        eu: solid_histogram(180),
        china: solid_histogram(120),
        mec: solid_histogram(100),
    }
}

pub const RIG_PID: u32 = 4242;

/// A controller wired to fakes, with a game window already up.
pub struct ControllerRig {
    pub screen: Arc<ScriptedScreen>,
    pub input: Arc<RecordingInput>,
    pub host: Arc<FakeHost>,
    pub clock: Arc<FakeClock>,
    pub remote: Option<Arc<ScriptedRemote>>,
    pub controller: SpectatorController,
    pub state: SessionState,
}

impl ControllerRig {
    pub fn new() -> Self {
        Self::build(ControllerSettings::default(), None)
    }

    pub fn with_remote() -> Self {
        Self::build(ControllerSettings::default(), Some(Arc::new(ScriptedRemote::default())))
    }

    pub fn build(settings: ControllerSettings, remote: Option<Arc<ScriptedRemote>>) -> Self {
        let screen = Arc::new(ScriptedScreen::default());
        let input = Arc::new(RecordingInput::default());
        let host = Arc::new(FakeHost::default());
        let clock = Arc::new(FakeClock::default());
        host.add_window(FakeHost::game_window(1, RIG_PID));

        let supervisor = Supervisor::new(
            host.clone(),
            clock.clone(),
            SupervisorSettings {
                game_dir: PathBuf::from("C:/Games/Battlefield 2"),
                executable: "BF2.exe".into(),
                window_title: "BF2 (v1.5.3153-802.0, pid:".into(),
                window_class: "BF2".into(),
                launch_settle: Duration::from_secs(25),
            },
            Identity {
                name: "spectator".into(),
                password: "secret".into(),
            },
        );
        let game = GameClient::new(
            Perception::new(screen.clone(), screen.clone()),
            Actions::new(input.clone(), clock.clone()),
            solid_team_references(),
        );
        let mut controller = SpectatorController::new(supervisor, game, clock.clone(), settings);
        if let Some(remote) = &remote {
            controller = controller.with_remote(remote.clone());
        }

        let mut state = SessionState::new(ServerTarget::new("10.0.0.1", "16567", None));
        state.spectator_on_server = true;
        state.joined_server = Some(state.server.clone());

        Self {
            screen,
            input,
            host,
            clock,
            remote,
            controller,
            state,
        }
    }

    pub fn origin(&self) -> Point {
        FakeHost::game_window(1, RIG_PID).rect.origin()
    }

    pub fn show(&self, region: TextRegion, text: &str) {
        self.screen.set_text(region.rect.at(self.origin()), text);
    }

    pub fn hide(&self, region: TextRegion) {
        self.screen.clear_text(region.rect.at(self.origin()));
    }

    /// Paints the active flag of `team` into its spawn-menu slot.
    pub fn show_team(&self, team: Team) {
        let (slot, blue) = match team {
            Team::UsmcEu => (0, 200),
            Team::ChinaMec => (1, 120),
        };
        self.screen.set_image(
            layout::TEAM_SLOTS[slot].at(self.origin()),
            RgbImage::from_pixel(41, 13, Rgb([0, 0, blue])),
        );
    }

    pub async fn tick(&mut self) -> TickOutcome {
        self.controller.tick(&mut self.state).await
    }
}

impl Default for ControllerRig {
    fn default() -> Self {
        Self::new()
    }
}
