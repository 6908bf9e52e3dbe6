//! # klaxon-core
//!
//! Core types, errors, and utilities for the KLAXON notification coordinator.
//!
//! This crate provides:
//! - [`KlaxonError`] - Error types for all KLAXON operations
//! - [`logging`] - Tracing setup and log management utilities
//! - [`types`] - The shared documents and the notification entity
//!
//! ## Example
//!
//! ```no_run
//! use klaxon_core::{KlaxonError, Result, logging};
//!
//! fn main() -> Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!     tracing::info!("coordinator starting");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export main types for convenience
pub use error::{KlaxonError, Result};
pub use logging::{LogGuard, init_logging};
pub use types::{
    AlarmSeverity, AlarmStateSnapshot, EventId, Notification, RawNotification, SessionId,
    UserSettings, all_snoozed,
};
