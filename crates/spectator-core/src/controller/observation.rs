use std::{error::Error, fmt};

use crate::session::MapInfo;

/// What one perception sweep concluded, in priority order. Only the first matching
/// condition is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    RestartPending,
    Unresponsive { over_limit: bool },
    ErrorDialog,
    GameMessage { text: String },
    ServerSwitch,
    OffServer,
    RtlLimit,
    MapLoading,
    MapBriefing { map: Option<MapInfo> },
    RoundEnd,
    NeedSpawn,
    NeedHideHud,
    StayOnPlayer,
    RotationPaused,
    RotateToNextPlayer,
}

impl Observation {
    pub fn branch(&self) -> Branch {
        match self {
            Observation::RestartPending => Branch::RestartPending,
            Observation::Unresponsive { .. } => Branch::Unresponsive,
            Observation::ErrorDialog => Branch::ErrorDialog,
            Observation::GameMessage { .. } => Branch::GameMessage,
            Observation::ServerSwitch => Branch::ServerSwitch,
            Observation::OffServer => Branch::OffServer,
            Observation::RtlLimit => Branch::RtlLimit,
            Observation::MapLoading => Branch::MapLoading,
            Observation::MapBriefing { .. } => Branch::MapBriefing,
            Observation::RoundEnd => Branch::RoundEnd,
            Observation::NeedSpawn => Branch::NeedSpawn,
            Observation::NeedHideHud => Branch::NeedHideHud,
            Observation::StayOnPlayer => Branch::StayOnPlayer,
            Observation::RotationPaused => Branch::RotationPaused,
            Observation::RotateToNextPlayer => Branch::RotateToNextPlayer,
        }
    }
}

/// An observation tagged with the restart epoch it was taken in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped {
    pub epoch: u64,
    pub observation: Observation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    RestartPending,
    Unresponsive,
    ErrorDialog,
    GameMessage,
    ServerSwitch,
    OffServer,
    RtlLimit,
    MapLoading,
    MapBriefing,
    RoundEnd,
    NeedSpawn,
    NeedHideHud,
    StayOnPlayer,
    RotationPaused,
    RotateToNextPlayer,
}

/// Conditions that stop automation for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    Banned,
    UnrecognizedMessage(String),
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Halt::Banned => write!(f, "banned from server, contact the server admin"),
            Halt::UnrecognizedMessage(text) => write!(f, "unrecognized game message: {text}"),
        }
    }
}

impl Error for Halt {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The branch for this observation ran.
    Continue(Branch),
    /// The observation predates a restart transition and was dropped.
    Discarded,
    /// An OS-level failure interrupted the tick; a restart was scheduled.
    Failed,
    Halt(Halt),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_surfaces_message_verbatim() {
        let halt = Halt::UnrecognizedMessage("server is very busy".into());
        assert_eq!(halt.to_string(), "unrecognized game message: server is very busy");

        let err = anyhow::Error::new(halt.clone());
        assert_eq!(err.downcast_ref::<Halt>(), Some(&halt));
    }
}
