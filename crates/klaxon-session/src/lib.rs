//! # klaxon-session
//!
//! The two coupling surfaces between KLAXON sessions:
//!
//! - [`store`] - the shared key/value store with typed change notification
//!   ([`SharedStore`], [`MemoryStore`], [`SyncMessage`])
//! - [`session`] - session identity and lifecycle signals
//!   ([`SessionHandle`], [`SessionRegistry`], [`SessionEvent`])
//!
//! Sessions never talk to each other directly; everything cross-session
//! flows through these two channels.

pub mod session;
pub mod store;

// Re-export main types for convenience
pub use session::{RegisteredSession, SessionEvent, SessionHandle, SessionRegistry};
pub use store::{MemoryStore, SharedStore, StoreTopic, SyncMessage, decode_or_default};
