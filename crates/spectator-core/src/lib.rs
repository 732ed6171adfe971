//! Core of the auto spectator: perception over screen pixels, synthetic input, process
//! supervision and the tick-driven control loop that keeps a spectator slot occupied.
//!
//! Everything that touches the operating system sits behind a trait (`Screen`,
//! `TextRecognizer`, `InputDevice`, `GameHost`, `Clock`) so the loop can be driven by
//! scripted fakes in tests and by the `platform` backends in the runner.

pub mod clock;
pub mod config;
pub mod controller;
pub mod game;
pub mod input;
pub mod perception;
pub mod platform;
pub mod remote;
pub mod session;
pub mod spawn_table;
pub mod supervisor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use controller::{Halt, SpectatorController, TickOutcome};
pub use session::SessionState;
