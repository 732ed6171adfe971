//! Screen geometry of the game client in its 1280x720 windowed layout.
//!
//! Regions and points are offsets from the window's top-left corner (including the window
//! border); use [`Rect::at`] / [`Point::at`] to turn them into absolute screen coordinates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn at(self, origin: Point) -> Point {
        Point::new(origin.x + self.x, origin.y + self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn at(self, origin: Point) -> Rect {
        Rect::new(origin.x + self.x, origin.y + self.y, self.width, self.height)
    }
}

/// OCR region with the colour treatment it needs (menu text is light-on-dark).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRegion {
    pub rect: Rect,
    pub invert: bool,
}

const fn inverted(x: i32, y: i32, width: u32, height: u32) -> TextRegion {
    TextRegion {
        rect: Rect::new(x, y, width, height),
        invert: true,
    }
}

pub const GAME_MESSAGE_TITLE: TextRegion = inverted(400, 223, 130, 25);
pub const GAME_MESSAGE_BODY: TextRegion = inverted(400, 245, 470, 18);
pub const ROUND_END_HEADER: TextRegion = inverted(72, 82, 740, 20);
pub const JOIN_GAME_BUTTON: TextRegion = inverted(1163, 725, 80, 16);
pub const MAP_BRIEFING_LABEL: TextRegion = inverted(24, 112, 115, 20);
pub const SPAWN_MENU_CLASS_LABEL: TextRegion = inverted(60, 125, 140, 18);
pub const MAP_NAME: TextRegion = inverted(769, 114, 210, 17);
pub const MAP_SIZE: TextRegion = inverted(1256, 570, 20, 17);
pub const SUICIDE_BUTTON: TextRegion = inverted(940, 678, 75, 19);
pub const CONNECT_TO_IP_BUTTON: TextRegion = inverted(50, 448, 110, 18);

/// Team selection flags in the spawn menu: slot 0 shows USMC/EU, slot 1 China/MEC.
pub const TEAM_SLOTS: [Rect; 2] = [Rect::new(68, 69, 41, 13), Rect::new(209, 69, 41, 13)];

pub const MENU_BFHQ: Point = Point::new(111, 50);
pub const MENU_MULTIPLAYER: Point = Point::new(331, 50);
pub const CONNECT_TO_IP_CLICK: Point = Point::new(111, 452);
pub const CONNECT_DIALOG_OK: Point = Point::new(777, 362);
pub const GAME_MESSAGE_OK: Point = Point::new(806, 412);
/// Shared by the "disconnect" (escape menu) and "join game" (round end) buttons.
pub const BOTTOM_RIGHT_BUTTON: Point = Point::new(1210, 725);

/// Legacy relative offsets (mickeys) from the top-left cursor reset position.
pub const SUICIDE_CLICK_MICKEYS: Point = Point::new(469, 459);

/// Camera area sampled for motion: the window minus side bars, title bar and border.
pub fn camera_region(window_width: u32, window_height: u32) -> Rect {
    Rect::new(
        168,
        31,
        window_width.saturating_sub(336),
        window_height.saturating_sub(40),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_translate_by_window_origin() {
        let origin = Point::new(5, 5);
        assert_eq!(
            GAME_MESSAGE_TITLE.rect.at(origin),
            Rect::new(405, 228, 130, 25)
        );
        assert_eq!(GAME_MESSAGE_OK.at(origin), Point::new(811, 417));
    }

    #[test]
    fn camera_region_never_underflows_on_tiny_windows() {
        let r = camera_region(100, 20);
        assert_eq!((r.width, r.height), (0, 0));
        let r = camera_region(1296, 759);
        assert_eq!((r.x, r.y, r.width, r.height), (168, 31, 960, 719));
    }
}
