//! Synthesized keyboard and mouse input with the settle delays the game needs between events.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::perception::layout::Point;

pub const KEY_HOLD: Duration = Duration::from_millis(80);
pub const MOVE_SETTLE: Duration = Duration::from_millis(80);
pub const CLICK_HOLD: Duration = Duration::from_millis(80);
pub const CURSOR_RESET_SETTLE: Duration = Duration::from_millis(500);
pub const TYPE_INTERVAL: Duration = Duration::from_millis(50);
pub const POINTER_SETTLE: Duration = Duration::from_millis(200);

/// Far enough to pin the cursor to the top-left corner from anywhere.
const CURSOR_RESET: (i32, i32) = (-10_000, -10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,
    Enter,
    /// Left control; opens the console under the game's key bindings.
    Console,
    Tab,
    Backspace,
    /// "C", bound to "next player" while spectating.
    NextPlayer,
}

impl Key {
    pub fn scan_code(self) -> u16 {
        match self {
            Key::Escape => 0x01,
            Key::Enter => 0x1c,
            Key::Console => 0x1d,
            Key::Tab => 0x0f,
            Key::Backspace => 0x0e,
            Key::NextPlayer => 0x2e,
        }
    }
}

/// Raw OS input. Implementations send exactly one event per call.
pub trait InputDevice: Send + Sync {
    fn key(&self, key: Key, pressed: bool) -> anyhow::Result<()>;
    fn type_char(&self, c: char) -> anyhow::Result<()>;
    fn move_relative(&self, dx: i32, dy: i32) -> anyhow::Result<()>;
    fn set_cursor(&self, x: i32, y: i32) -> anyhow::Result<()>;
    fn left_button(&self, pressed: bool) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct Actions {
    device: Arc<dyn InputDevice>,
    clock: Arc<dyn Clock>,
}

impl Actions {
    pub fn new(device: Arc<dyn InputDevice>, clock: Arc<dyn Clock>) -> Self {
        Self { device, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn press_key(&self, key: Key) -> anyhow::Result<()> {
        self.device.key(key, true)
    }

    pub async fn release_key(&self, key: Key) -> anyhow::Result<()> {
        self.device.key(key, false)
    }

    pub async fn tap_key(&self, key: Key) -> anyhow::Result<()> {
        self.press_key(key).await?;
        self.clock.sleep(KEY_HOLD).await;
        self.release_key(key).await
    }

    pub async fn tap_key_times(&self, key: Key, times: usize) -> anyhow::Result<()> {
        for _ in 0..times {
            self.tap_key(key).await?;
        }
        Ok(())
    }

    pub async fn type_text(&self, text: &str) -> anyhow::Result<()> {
        for c in text.chars() {
            self.device.type_char(c)?;
            self.clock.sleep(TYPE_INTERVAL).await;
        }
        Ok(())
    }

    /// Legacy relative movement. Only meaningful right after [`Actions::reset_cursor`].
    pub async fn move_by(&self, dx: i32, dy: i32) -> anyhow::Result<()> {
        self.device.move_relative(dx, dy)?;
        self.clock.sleep(MOVE_SETTLE).await;
        Ok(())
    }

    pub async fn reset_cursor(&self) -> anyhow::Result<()> {
        self.device.move_relative(CURSOR_RESET.0, CURSOR_RESET.1)?;
        self.clock.sleep(CURSOR_RESET_SETTLE).await;
        Ok(())
    }

    /// Reset to the corner, then move by `offset` in legacy mouse units.
    pub async fn move_from_corner(&self, offset: Point) -> anyhow::Result<()> {
        self.reset_cursor().await?;
        self.move_by(offset.x, offset.y).await
    }

    /// Absolute cursor placement in screen pixels.
    pub async fn move_to(&self, target: Point) -> anyhow::Result<()> {
        self.device.set_cursor(target.x, target.y)?;
        self.clock.sleep(POINTER_SETTLE).await;
        Ok(())
    }

    pub async fn click(&self) -> anyhow::Result<()> {
        self.device.left_button(true)?;
        self.clock.sleep(CLICK_HOLD).await;
        self.device.left_button(false)
    }

    pub async fn click_at(&self, target: Point) -> anyhow::Result<()> {
        self.move_to(target).await?;
        self.click().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::testing::{InputEvent, RecordingInput};

    fn actions() -> (Arc<RecordingInput>, Arc<FakeClock>, Actions) {
        let input = Arc::new(RecordingInput::default());
        let clock = Arc::new(FakeClock::default());
        let actions = Actions::new(input.clone(), clock.clone());
        (input, clock, actions)
    }

    #[tokio::test]
    async fn tap_holds_the_key() -> anyhow::Result<()> {
        let (input, clock, actions) = actions();
        actions.tap_key_times(Key::Backspace, 2).await?;
        assert_eq!(
            input.events(),
            vec![
                InputEvent::Key(Key::Backspace, true),
                InputEvent::Key(Key::Backspace, false),
                InputEvent::Key(Key::Backspace, true),
                InputEvent::Key(Key::Backspace, false),
            ]
        );
        assert_eq!(clock.total_slept(), KEY_HOLD * 2);
        Ok(())
    }

    #[tokio::test]
    async fn move_from_corner_resets_first() -> anyhow::Result<()> {
        let (input, _clock, actions) = actions();
        actions.move_from_corner(Point::new(469, 459)).await?;
        assert_eq!(
            input.events(),
            vec![
                InputEvent::MoveRelative(-10_000, -10_000),
                InputEvent::MoveRelative(469, 459),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn text_is_typed_char_by_char() -> anyhow::Result<()> {
        let (input, clock, actions) = actions();
        actions.type_text("ab").await?;
        assert_eq!(
            input.events(),
            vec![InputEvent::Char('a'), InputEvent::Char('b')]
        );
        assert_eq!(clock.sleeps(), vec![TYPE_INTERVAL, TYPE_INTERVAL]);
        Ok(())
    }

    #[test]
    fn scan_codes() {
        assert_eq!(Key::Escape.scan_code(), 0x01);
        assert_eq!(Key::NextPlayer.scan_code(), 0x2e);
    }
}
