//! Shared key/value store with cross-session change notification.
//!
//! Every same-origin session sees the same four namespaced keys. Writing a
//! key from one session asynchronously notifies every *other* session that
//! the key changed, delivering the new value; the writer never hears its own
//! write. That asymmetry is what the consume/push discipline in the center
//! leans on: a change notification always describes someone else's action.
//!
//! Change notification is a typed channel (topic plus payload) rather than
//! stringly-named events, so the inbound and outbound directions stay
//! distinct in the type system.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use klaxon_core::SessionId;

/// Namespace prefix shared by every coordinator key.
pub const KEY_PREFIX: &str = "notifications";

/// The four shared documents, each independently keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTopic {
    /// Ordered sequence of raw notification payloads
    List,
    /// User notification settings
    UserSettings,
    /// Uid of the session currently responsible for polling and alarming
    ActiveSession,
    /// Alarm playback snapshot
    AlarmState,
}

impl StoreTopic {
    /// All topics, in teardown order.
    pub const ALL: [StoreTopic; 4] = [
        StoreTopic::List,
        StoreTopic::UserSettings,
        StoreTopic::ActiveSession,
        StoreTopic::AlarmState,
    ];

    /// The namespaced store key for this topic.
    pub fn key(&self) -> &'static str {
        match self {
            Self::List => "notifications.list",
            Self::UserSettings => "notifications.user_settings",
            Self::ActiveSession => "notifications.active_tabid",
            Self::AlarmState => "notifications.alarm_state",
        }
    }
}

impl std::fmt::Display for StoreTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One inbound change notification: which key changed and its new value.
///
/// `Value::Null` signals erasure, so receivers can drop their caches.
#[derive(Debug, Clone)]
pub struct SyncMessage {
    /// Which shared document changed
    pub topic: StoreTopic,
    /// The new value, or `Null` after an erase
    pub value: Value,
}

/// Persistent key/value store visible to every session.
///
/// Writes are fire-and-forget from the writer's perspective; the last write
/// observed by a session overwrites that session's cache for that key only.
pub trait SharedStore: Send + Sync {
    /// Read the current value of a key, if present.
    fn read_key(&self, topic: StoreTopic) -> Option<Value>;

    /// Write a key. Every subscriber except `writer` is notified.
    fn write_key(&self, writer: &str, topic: StoreTopic, value: Value);

    /// Remove a key. Every subscriber except `writer` sees a `Null` sync.
    fn erase_key(&self, writer: &str, topic: StoreTopic);

    /// Remove every coordinator key (single-session teardown).
    fn erase_all(&self, writer: &str);

    /// Register a session for change notifications.
    ///
    /// The returned receiver yields writes performed by *other* sessions
    /// only, in the order this store observed them.
    fn subscribe(&self, uid: &str) -> mpsc::UnboundedReceiver<SyncMessage>;

    /// Drop a session's subscription (close or crash).
    fn unsubscribe(&self, uid: &str);
}

/// Decode a stored document, backfilling a default on absence or mismatch.
///
/// Malformed or legacy-shaped documents are not treated as errors; versioned
/// serde defaults fill the gaps, matching the store contract.
pub fn decode_or_default<T: DeserializeOwned + Default>(topic: StoreTopic, value: Option<Value>) -> T {
    match value {
        None | Some(Value::Null) => T::default(),
        Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
            warn!(topic = %topic, error = %e, "malformed shared document, using defaults");
            T::default()
        }),
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    keys: HashMap<StoreTopic, Value>,
    subscribers: HashMap<SessionId, mpsc::UnboundedSender<SyncMessage>>,
}

/// In-memory [`SharedStore`] shared by every session of one simulation or
/// test. Last write wins; notification delivery order per receiver matches
/// write order.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn notify_others(inner: &mut MemoryStoreInner, writer: &str, topic: StoreTopic, value: &Value) {
        inner.subscribers.retain(|uid, tx| {
            if uid == writer {
                return true;
            }
            // A closed receiver means the session is gone; drop it here
            tx.send(SyncMessage {
                topic,
                value: value.clone(),
            })
            .is_ok()
        });
    }
}

impl SharedStore for MemoryStore {
    fn read_key(&self, topic: StoreTopic) -> Option<Value> {
        self.inner.lock().unwrap().keys.get(&topic).cloned()
    }

    fn write_key(&self, writer: &str, topic: StoreTopic, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        debug!(writer, topic = %topic, "store write");
        inner.keys.insert(topic, value.clone());
        Self::notify_others(&mut inner, writer, topic, &value);
    }

    fn erase_key(&self, writer: &str, topic: StoreTopic) {
        let mut inner = self.inner.lock().unwrap();
        if inner.keys.remove(&topic).is_some() {
            debug!(writer, topic = %topic, "store erase");
            Self::notify_others(&mut inner, writer, topic, &Value::Null);
        }
    }

    fn erase_all(&self, writer: &str) {
        for topic in StoreTopic::ALL {
            self.erase_key(writer, topic);
        }
    }

    fn subscribe(&self, uid: &str) -> mpsc::UnboundedReceiver<SyncMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .insert(uid.to_string(), tx);
        rx
    }

    fn unsubscribe(&self, uid: &str) {
        self.inner.lock().unwrap().subscribers.remove(uid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_writer_is_not_notified() {
        let store = MemoryStore::new();
        let mut rx_a = store.subscribe("a");
        let mut rx_b = store.subscribe("b");

        store.write_key("a", StoreTopic::List, json!([{"eventid": "1"}]));

        let msg = rx_b.try_recv().expect("peer sees the write");
        assert_eq!(msg.topic, StoreTopic::List);
        assert!(rx_a.try_recv().is_err(), "writer must not hear its own write");
    }

    #[test]
    fn test_last_write_wins() {
        let store = MemoryStore::new();
        store.write_key("a", StoreTopic::ActiveSession, json!("a"));
        store.write_key("b", StoreTopic::ActiveSession, json!("b"));

        assert_eq!(store.read_key(StoreTopic::ActiveSession), Some(json!("b")));
    }

    #[test]
    fn test_erase_notifies_with_null() {
        let store = MemoryStore::new();
        let mut rx_b = store.subscribe("b");
        store.write_key("a", StoreTopic::AlarmState, json!({"muted": true}));
        store.erase_key("a", StoreTopic::AlarmState);

        let _write = rx_b.try_recv().unwrap();
        let erase = rx_b.try_recv().unwrap();
        assert!(erase.value.is_null());
        assert_eq!(store.read_key(StoreTopic::AlarmState), None);
    }

    #[test]
    fn test_erase_all_clears_every_topic() {
        let store = MemoryStore::new();
        for topic in StoreTopic::ALL {
            store.write_key("a", topic, json!({}));
        }
        store.erase_all("a");
        for topic in StoreTopic::ALL {
            assert_eq!(store.read_key(topic), None, "{topic} should be erased");
        }
    }

    #[test]
    fn test_decode_or_default_backfills() {
        use klaxon_core::UserSettings;

        let settings: UserSettings = decode_or_default(StoreTopic::UserSettings, None);
        assert_eq!(settings, UserSettings::default());

        let settings: UserSettings =
            decode_or_default(StoreTopic::UserSettings, Some(json!({"msg_timeout": 5})));
        assert_eq!(settings.msg_timeout, 5);

        // Wrong shape falls back instead of erroring
        let settings: UserSettings =
            decode_or_default(StoreTopic::UserSettings, Some(json!("not an object")));
        assert_eq!(settings, UserSettings::default());
    }

    #[test]
    fn test_unsubscribed_session_stops_receiving() {
        let store = MemoryStore::new();
        let mut rx_b = store.subscribe("b");
        store.unsubscribe("b");
        store.write_key("a", StoreTopic::List, json!([]));
        assert!(rx_b.try_recv().is_err());
    }
}
