//! # klaxon-center
//!
//! The orchestrating layer of KLAXON:
//!
//! - [`collection`] - the notification working set with display deadlines
//! - [`poll`] - the server poll client ([`PollClient`], [`HttpPollClient`],
//!   [`ScriptedPollClient`])
//! - [`render`] - the display hook ([`RenderSink`])
//! - [`center`] - [`NotificationCenter`], one session's coordinator:
//!   election, consume/push synchronization, poll loop, timers
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use klaxon_alarm::SilentPlayer;
//! use klaxon_center::{NotificationCenter, NullSink, ScriptedPollClient};
//! use klaxon_session::{MemoryStore, SessionHandle, SessionRegistry, SharedStore};
//!
//! # async fn example() {
//! let store = Arc::new(MemoryStore::new());
//! let registry = SessionRegistry::new();
//! let (handle, session_rx) = registry.register();
//! let sync_rx = store.subscribe(handle.uid());
//!
//! let center = NotificationCenter::new(
//!     store,
//!     Arc::new(handle),
//!     Arc::new(ScriptedPollClient::new()),
//!     Box::new(SilentPlayer),
//!     Box::new(NullSink),
//! );
//! center.run(sync_rx, session_rx).await;
//! # }
//! ```

pub mod center;
pub mod collection;
pub mod poll;
pub mod render;

// Re-export main types for convenience
pub use center::{NotificationCenter, POLL_INTERVAL_DEFAULT_SECS, RENDER_DEBOUNCE_MS, calc_poll_interval};
pub use collection::NotificationCollection;
pub use poll::{HttpPollClient, PollClient, PollEnvelope, ScriptedPollClient};
pub use render::{NullSink, RecordingSink, RenderSink};
