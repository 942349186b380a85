//! Autonomous behavior engine: the idle-phase state machine and everything
//! that feeds it.

pub mod context;
pub mod dialogue;
pub mod emotion;
pub mod hysteresis;
pub mod interface;
pub mod monologue;
pub mod phase;
pub mod session;
pub mod state;
pub mod tick;


pub use context::CompanionEngine;
