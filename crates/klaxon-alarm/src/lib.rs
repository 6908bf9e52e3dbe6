//! # klaxon-alarm
//!
//! The audible half of KLAXON:
//!
//! - [`player`] - the one-channel audio contract ([`AlarmPlayer`]) with a
//!   silent fallback and a recording test double
//! - [`controller`] - the selection/playback state machine
//!   ([`AlarmController`], [`AlarmPhase`])
//!
//! Only the active session renders into a player; inactive sessions keep
//! their controller state current from snapshots so they can take over
//! mid-playback.

pub mod controller;
pub mod player;

// Re-export main types for convenience
pub use controller::{AlarmController, AlarmPhase};
pub use player::{AlarmPlayer, PlayerCommand, RecordingPlayer, SilentPlayer};
