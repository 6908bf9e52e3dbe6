//! Session identity and lifecycle signals.
//!
//! A session is the browser-tab analogue: an independently scheduled
//! participant with a stable uid, coupled to its peers only through the
//! shared store and this registry. The registry tracks which sessions are
//! live, which one has focus, and delivers lifecycle events (focus gain,
//! peer crash, impending close) over each session's event channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::sync::mpsc;
use tracing::debug;

use klaxon_core::SessionId;

/// Lifecycle events delivered to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// This session gained focus.
    FocusGained,

    /// A peer session disappeared without running its close path.
    ///
    /// Survivors react by (idempotently) electing themselves active.
    PeerCrashed {
        /// Uid of the crashed peer
        uid: SessionId,
    },

    /// This session is about to close.
    ///
    /// Carries the uids of the sessions that remain, in registration order;
    /// the first one is the handoff target.
    Closing {
        /// Live peers at close time
        peer_uids: Vec<SessionId>,
    },
}

/// Identifies the current session and its live peers.
pub trait SessionHandle: Send + Sync {
    /// This session's stable unique id.
    fn uid(&self) -> &str;

    /// Uids of every live session, in registration order, self included.
    fn all_uids(&self) -> Vec<SessionId>;

    /// Whether this session currently has focus.
    fn has_focus(&self) -> bool;

    /// Uids of every live session except this one.
    fn peer_uids(&self) -> Vec<SessionId> {
        self.all_uids().into_iter().filter(|u| u != self.uid()).collect()
    }
}

#[derive(Default)]
struct RegistryInner {
    order: Vec<SessionId>,
    channels: HashMap<SessionId, mpsc::UnboundedSender<SessionEvent>>,
    focused: Option<SessionId>,
}

/// Shared registry of live sessions.
///
/// The simulation driver (or test) owns one registry and uses it to script
/// focus, close, and crash events; each registered session observes them
/// through its event receiver.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session with a minted uid.
    ///
    /// The newly registered session takes focus, matching a freshly opened
    /// tab.
    pub fn register(&self) -> (RegisteredSession, mpsc::UnboundedReceiver<SessionEvent>) {
        let uid = format!("{:08x}", rand::rng().random::<u32>());
        self.register_with_uid(uid)
    }

    /// Register a new session under a caller-chosen uid (tests, scenarios).
    pub fn register_with_uid(
        &self,
        uid: impl Into<SessionId>,
    ) -> (RegisteredSession, mpsc::UnboundedReceiver<SessionEvent>) {
        let uid = uid.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock().unwrap();
        inner.order.push(uid.clone());
        inner.channels.insert(uid.clone(), tx);
        inner.focused = Some(uid.clone());
        debug!(uid, "session registered");

        (
            RegisteredSession {
                uid,
                registry: self.clone(),
            },
            rx,
        )
    }

    /// Uids of every live session, in registration order.
    pub fn live_uids(&self) -> Vec<SessionId> {
        self.inner.lock().unwrap().order.clone()
    }

    /// Give focus to a live session and notify it.
    pub fn focus(&self, uid: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.channels.get(uid) {
            let _ = tx.send(SessionEvent::FocusGained);
            inner.focused = Some(uid.to_string());
        }
    }

    /// Close a session: deregister it and deliver its before-close event
    /// with the uids that remain.
    pub fn close(&self, uid: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.order.retain(|u| u != uid);
        let peer_uids = inner.order.clone();
        if inner.focused.as_deref() == Some(uid) {
            inner.focused = None;
        }
        if let Some(tx) = inner.channels.remove(uid) {
            debug!(uid, peers = peer_uids.len(), "session closing");
            let _ = tx.send(SessionEvent::Closing { peer_uids });
        }
    }

    /// Crash a session: deregister it *without* the close path and signal
    /// every survivor.
    pub fn crash(&self, uid: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.order.retain(|u| u != uid);
        inner.channels.remove(uid);
        if inner.focused.as_deref() == Some(uid) {
            inner.focused = None;
        }
        debug!(uid, "session crashed");
        for tx in inner.channels.values() {
            let _ = tx.send(SessionEvent::PeerCrashed {
                uid: uid.to_string(),
            });
        }
    }
}

/// A live registration in a [`SessionRegistry`].
pub struct RegisteredSession {
    uid: SessionId,
    registry: SessionRegistry,
}

impl SessionHandle for RegisteredSession {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn all_uids(&self) -> Vec<SessionId> {
        self.registry.live_uids()
    }

    fn has_focus(&self) -> bool {
        self.registry.inner.lock().unwrap().focused.as_deref() == Some(self.uid.as_str())
    }
}
