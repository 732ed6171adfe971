//! The controller's belief about the game: which server it should be on, whether the client
//! must be relaunched, what map is running and how far the current round has progressed.
//!
//! Owned by the control loop and passed into every tick by `&mut`; nothing else mutates it.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::spawn_table::MapId;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerTarget {
    pub ip: String,
    pub port: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl ServerTarget {
    pub fn new(ip: impl Into<String>, port: impl Into<String>, password: Option<String>) -> Self {
        Self {
            ip: ip.into(),
            port: port.into(),
            password,
        }
    }

    /// Password-less servers can be joined straight from the launch arguments.
    pub fn joins_automatically(&self) -> bool {
        self.password.is_none()
    }
}

impl std::fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Team {
    /// USMC or EU, listed first in the spawn menu.
    UsmcEu,
    /// China or MEC.
    ChinaMec,
}

impl Team {
    pub fn index(self) -> usize {
        match self {
            Team::UsmcEu => 0,
            Team::ChinaMec => 1,
        }
    }
}

/// Map name and size are only ever known together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapInfo {
    pub name: MapId,
    pub size: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationState {
    pub map: Option<MapInfo>,
    /// The spectator has entered a round on this map (HUD hidden at least once).
    pub on_map: bool,
    pub active_join_possible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundState {
    spawned: bool,
    pub team: Option<Team>,
    pub hud_hidden: bool,
    /// Rounds entered with the current game instance.
    pub number: u32,
}

impl RoundState {
    pub fn spawned(&self) -> bool {
        self.spawned
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationPause {
    pub paused: bool,
    pub until: Option<SystemTime>,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    /// Server the spectator is supposed to be on.
    pub server: ServerTarget,
    /// Server the spectator actually joined last.
    pub joined_server: Option<ServerTarget>,
    pub spectator_on_server: bool,
    restart_required: bool,
    /// Planned relaunch once the instance has served its rounds.
    rtl_restart_required: bool,
    unresponsive_count: u32,
    /// Bumped on every transition into `restart_required`.
    restart_epoch: u64,
    pub rotation: RotationState,
    pub round: RoundState,
    pub rotation_pause: RotationPause,
}

impl SessionState {
    pub fn new(server: ServerTarget) -> Self {
        Self {
            server,
            joined_server: None,
            spectator_on_server: false,
            restart_required: false,
            rtl_restart_required: false,
            unresponsive_count: 0,
            restart_epoch: 0,
            rotation: RotationState::default(),
            round: RoundState::default(),
            rotation_pause: RotationPause::default(),
        }
    }

    pub fn restart_required(&self) -> bool {
        self.restart_required
    }

    pub fn rtl_restart_required(&self) -> bool {
        self.rtl_restart_required
    }

    /// Either kind of relaunch is pending.
    pub fn restart_pending(&self) -> bool {
        self.restart_required || self.rtl_restart_required
    }

    pub fn restart_epoch(&self) -> u64 {
        self.restart_epoch
    }

    pub fn require_restart(&mut self) {
        if !self.restart_required {
            self.restart_required = true;
            self.restart_epoch += 1;
        }
    }

    pub fn require_rtl_restart(&mut self) {
        self.rtl_restart_required = true;
    }

    pub fn unresponsive_count(&self) -> u32 {
        self.unresponsive_count
    }

    pub fn note_unresponsive(&mut self) -> u32 {
        self.unresponsive_count += 1;
        self.unresponsive_count
    }

    pub fn reset_unresponsive(&mut self) {
        self.unresponsive_count = 0;
    }

    pub fn map_name(&self) -> Option<MapId> {
        self.rotation.map.map(|m| m.name)
    }

    /// `-1` while the map is unknown.
    pub fn map_size(&self) -> i32 {
        self.rotation.map.map(|m| m.size as i32).unwrap_or(-1)
    }

    pub fn set_map(&mut self, map: MapInfo) {
        self.rotation.map = Some(map);
    }

    /// Spawning is only meaningful on a known map; a spawn claim without one is dropped.
    pub fn set_round_spawned(&mut self, spawned: bool) {
        if spawned && self.rotation.map.is_none() {
            tracing::warn!("session.spawned.ignored reason=map_unknown");
            return;
        }
        self.round.spawned = spawned;
    }

    /// A rotation boundary (reconnect, next map loading): forget everything about the map.
    pub fn rotation_reset(&mut self) {
        self.rotation = RotationState::default();
        self.round.spawned = false;
    }

    /// Round ended on the same map: the next round needs a fresh spawn and HUD cycle.
    pub fn round_end_reset(&mut self) {
        self.round.spawned = false;
        self.round.team = None;
        self.round.hud_hidden = false;
    }

    /// Called after a relaunch. Map knowledge survives only if the client rejoins the same
    /// server on its own.
    pub fn restart_reset(&mut self, auto_rejoin: bool) {
        self.restart_required = false;
        self.rtl_restart_required = false;
        self.unresponsive_count = 0;
        self.round = RoundState::default();
        self.spectator_on_server = false;
        self.joined_server = None;
        if !auto_rejoin {
            self.rotation = RotationState::default();
        }
    }

    pub fn pause_rotation(&mut self, now: SystemTime, duration: Duration) {
        self.rotation_pause = RotationPause {
            paused: true,
            until: Some(now + duration),
        };
    }

    pub fn resume_rotation(&mut self) {
        self.rotation_pause = RotationPause::default();
    }

    /// True while a pause is active; an expired pause is cleared on the way.
    pub fn rotation_paused(&mut self, now: SystemTime) -> bool {
        if !self.rotation_pause.paused {
            return false;
        }
        match self.rotation_pause.until {
            Some(until) if now < until => true,
            _ => {
                tracing::info!("session.rotation_pause.expired");
                self.resume_rotation();
                false
            }
        }
    }

    /// The spectator sits on a server other than the current target.
    pub fn server_switch_pending(&self) -> bool {
        self.spectator_on_server
            && self
                .joined_server
                .as_ref()
                .is_some_and(|joined| *joined != self.server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_on_map() -> SessionState {
        let mut s = SessionState::new(ServerTarget::new("10.0.0.1", "16567", None));
        s.set_map(MapInfo {
            name: MapId::KubraDam,
            size: 64,
        });
        s.rotation.on_map = true;
        s.rotation.active_join_possible = true;
        s.round.team = Some(Team::ChinaMec);
        s.round.hud_hidden = true;
        s.round.number = 2;
        s.set_round_spawned(true);
        s
    }

    #[test]
    fn map_name_and_size_are_known_together() {
        let mut s = state_on_map();
        assert_eq!(s.map_name(), Some(MapId::KubraDam));
        assert_eq!(s.map_size(), 64);
        s.rotation_reset();
        assert_eq!(s.map_name(), None);
        assert_eq!(s.map_size(), -1);
    }

    #[test]
    fn round_end_reset_keeps_rotation() {
        let mut s = state_on_map();
        s.round_end_reset();
        assert!(!s.round.spawned());
        assert_eq!(s.round.team, None);
        assert!(!s.round.hud_hidden);
        assert_eq!(s.map_name(), Some(MapId::KubraDam));
        assert_eq!(s.map_size(), 64);
        assert_eq!(s.round.number, 2);
    }

    #[test]
    fn rotation_reset_clears_map_flags() {
        let mut s = state_on_map();
        s.rotation_reset();
        assert_eq!(s.rotation, RotationState::default());
        assert!(!s.rotation.on_map);
        assert!(!s.rotation.active_join_possible);
        assert!(!s.round.spawned());
    }

    #[test]
    fn spawned_requires_known_map() {
        let mut s = SessionState::new(ServerTarget::new("10.0.0.1", "16567", None));
        s.set_round_spawned(true);
        assert!(!s.round.spawned());
    }

    #[test]
    fn restart_flag_is_sticky_and_bumps_epoch_once() {
        let mut s = state_on_map();
        s.note_unresponsive();
        s.require_restart();
        s.require_restart();
        assert!(s.restart_required());
        assert_eq!(s.restart_epoch(), 1);

        s.restart_reset(true);
        assert!(!s.restart_required());
        assert_eq!(s.unresponsive_count(), 0);
        assert_eq!(s.round, RoundState::default());
        assert_eq!(s.map_name(), Some(MapId::KubraDam));
        assert_eq!(s.server.ip, "10.0.0.1");
    }

    #[test]
    fn restart_reset_forgets_map_when_rejoin_is_manual() {
        let mut s = state_on_map();
        s.require_rtl_restart();
        assert!(s.restart_pending());
        s.restart_reset(false);
        assert!(!s.restart_pending());
        assert_eq!(s.map_name(), None);
    }

    #[test]
    fn rotation_pause_expires() {
        let mut s = state_on_map();
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        s.pause_rotation(now, Duration::from_secs(60));
        assert!(s.rotation_paused(now + Duration::from_secs(59)));
        assert!(!s.rotation_paused(now + Duration::from_secs(60)));
        assert!(!s.rotation_pause.paused);
    }

    #[test]
    fn server_switch_only_when_on_a_different_server() {
        let mut s = state_on_map();
        s.spectator_on_server = true;
        s.joined_server = Some(s.server.clone());
        assert!(!s.server_switch_pending());
        s.server = ServerTarget::new("10.0.0.2", "16567", Some("pw".into()));
        assert!(s.server_switch_pending());
    }
}
