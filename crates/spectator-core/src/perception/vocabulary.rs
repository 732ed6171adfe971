//! Known on-screen vocabulary and the substring rules that turn noisy OCR output into
//! typed signals. Matching is always by containment, never by equality.

use crate::session::MapInfo;
use crate::spawn_table::MapId;

pub const GAME_MESSAGE: &str = "game message";
pub const JOIN_GAME: &str = "join game";
pub const MAP_BRIEFING: &str = "map briefing";
pub const SPAWN_MENU_CLASS: &str = "special forces";
pub const SUICIDE: &str = "suicide";
pub const CONNECT_TO_IP: &str = "connect to ip";

/// Headers of every end-of-round style screen, including the briefing of the next map.
pub const ROUND_END_LABELS: &[&str] = &["score list", "top players", "top scores", MAP_BRIEFING];

/// What a modal game message means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    ServerFull,
    Kicked,
    Banned,
    ConnectionLost,
    ModifiedContent,
    /// The join-by-ip dialog gets stuck; only a client relaunch recovers it.
    InvalidIpAddress,
    Unrecognized(String),
}

pub fn classify_message(text: &str) -> MessageKind {
    let text = text.trim();
    if text.contains("full") {
        MessageKind::ServerFull
    } else if text.contains("kicked") {
        MessageKind::Kicked
    } else if text.contains("banned") {
        MessageKind::Banned
    } else if (text.contains("connection") && text.contains("lost"))
        || text.contains("failed to connect")
    {
        MessageKind::ConnectionLost
    } else if text.contains("modified content") {
        MessageKind::ModifiedContent
    } else if text.contains("invalid ip address") {
        MessageKind::InvalidIpAddress
    } else {
        MessageKind::Unrecognized(text.to_string())
    }
}

/// Resolves a briefing map title such as `"strike at karkand"` to a known map.
///
/// Tesseract regularly reads the first `q` of a title as `g`, so a second attempt swaps the
/// first `g` for a `q`.
pub fn parse_map_name(ocr: &str) -> Option<MapId> {
    let slug = ocr
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    MapId::from_slug(&slug).or_else(|| MapId::from_slug(&slug.replacen('g', "q", 1)))
}

/// Player-count size shown in the briefing; anything that is not purely digits is unknown.
pub fn parse_map_size(ocr: &str) -> Option<u8> {
    let digits = ocr.trim();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Both halves must parse, otherwise the briefing read is treated as unknown as a whole.
pub fn parse_map_info(name_ocr: &str, size_ocr: &str) -> Option<MapInfo> {
    Some(MapInfo {
        name: parse_map_name(name_ocr)?,
        size: parse_map_size(size_ocr)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_classification_follows_vocabulary_priority() {
        assert_eq!(
            classify_message("the server is full."),
            MessageKind::ServerFull
        );
        assert_eq!(
            classify_message("you have been kicked from the server"),
            MessageKind::Kicked
        );
        assert_eq!(
            classify_message("you were kicked for modified content"),
            MessageKind::Kicked
        );
        assert_eq!(classify_message("modified content"), MessageKind::ModifiedContent);
        assert_eq!(
            classify_message("you are banned from this server"),
            MessageKind::Banned
        );
        assert_eq!(
            classify_message("connection to the server was lost"),
            MessageKind::ConnectionLost
        );
        assert_eq!(
            classify_message("failed to connect to server"),
            MessageKind::ConnectionLost
        );
        assert_eq!(
            classify_message("invalid ip address"),
            MessageKind::InvalidIpAddress
        );
    }

    #[test]
    fn unknown_messages_are_surfaced_verbatim() {
        assert_eq!(
            classify_message(" server is very busy\n"),
            MessageKind::Unrecognized("server is very busy".to_string())
        );
    }

    #[test]
    fn map_names_tolerate_spacing_and_q_misreads() {
        assert_eq!(
            parse_map_name("strike at karkand\n"),
            Some(MapId::StrikeAtKarkand)
        );
        assert_eq!(
            parse_map_name("taraba guarry"),
            Some(MapId::TarabaQuarry)
        );
        assert_eq!(parse_map_name("karkand"), None);
    }

    #[test]
    fn map_size_requires_digits_only() {
        assert_eq!(parse_map_size("64\n"), Some(64));
        assert_eq!(parse_map_size("6a"), None);
        assert_eq!(parse_map_size(""), None);
        assert_eq!(parse_map_size("999"), None);
    }

    #[test]
    fn map_info_is_all_or_nothing() {
        assert_eq!(
            parse_map_info("gulf of oman", "16"),
            Some(MapInfo {
                name: MapId::GulfOfOman,
                size: 16
            })
        );
        assert_eq!(parse_map_info("gulf of oman", "1b"), None);
        assert_eq!(parse_map_info("nowhere", "16"), None);
    }
}
