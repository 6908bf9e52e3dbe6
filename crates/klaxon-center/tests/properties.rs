//! End-to-end properties of the coordination protocol, driven through the
//! public API only: simulated sessions run their real event loops against
//! one in-memory store under a paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinHandle;

use klaxon_alarm::RecordingPlayer;
use klaxon_center::{
    NotificationCenter, NullSink, PollEnvelope, RecordingSink, ScriptedPollClient,
};
use klaxon_core::{Notification, RawNotification};
use klaxon_session::{MemoryStore, SessionRegistry, SharedStore, StoreTopic};

struct SimSession {
    client: Arc<ScriptedPollClient>,
    task: JoinHandle<()>,
}

fn open_session(
    store: &Arc<MemoryStore>,
    registry: &SessionRegistry,
    uid: &str,
    sink: Box<dyn klaxon_center::RenderSink>,
) -> SimSession {
    let (handle, session_rx) = registry.register_with_uid(uid);
    let sync_rx = store.subscribe(uid);
    let client = Arc::new(ScriptedPollClient::new());
    let center = NotificationCenter::new(
        store.clone(),
        Arc::new(handle),
        client.clone(),
        Box::new(RecordingPlayer::new()),
        sink,
    );
    let task = tokio::spawn(center.run(sync_rx, session_rx));
    SimSession { client, task }
}

async fn settle() {
    // Paused clock: queued messages drain before time advances
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn active_uid(store: &MemoryStore) -> Option<String> {
    store
        .read_key(StoreTopic::ActiveSession)
        .and_then(|v| v.as_str().map(String::from))
}

#[tokio::test(start_paused = true)]
async fn single_active_session_converges() {
    let store = Arc::new(MemoryStore::new());
    let registry = SessionRegistry::new();

    let a = open_session(&store, &registry, "a", Box::new(NullSink));
    let b = open_session(&store, &registry, "b", Box::new(NullSink));
    let c = open_session(&store, &registry, "c", Box::new(NullSink));
    settle().await;

    // Each newcomer claimed the role at construction; the last write wins
    // and every other session has demoted itself by now
    assert_eq!(active_uid(&store).as_deref(), Some("c"));

    // Focus re-elects
    registry.focus("a");
    settle().await;
    assert_eq!(active_uid(&store).as_deref(), Some("a"));

    // Only the active session polls
    let before: Vec<usize> = [&a, &b, &c].iter().map(|s| s.client.poll_count()).collect();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(
        a.client.poll_count() > before[0],
        "active session must keep polling"
    );
    assert_eq!(b.client.poll_count(), before[1]);
    assert_eq!(c.client.poll_count(), before[2]);

    // Clean close hands off to the first surviving peer
    registry.close("a");
    settle().await;
    assert_eq!(active_uid(&store).as_deref(), Some("b"));
    a.task.await.unwrap();

    // Crash of the active holder re-elects among survivors
    registry.crash("b");
    settle().await;
    assert_eq!(active_uid(&store).as_deref(), Some("c"));
    b.task.await.unwrap();

    let c_polls = c.client.poll_count();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(c.client.poll_count() > c_polls);

    c.task.abort();
}

#[tokio::test(start_paused = true)]
async fn display_timeout_boundary() {
    let store = Arc::new(MemoryStore::new());
    let registry = SessionRegistry::new();

    // The observed session registers first; a pseudo-session takes focus
    // and the active role, so no poll loop interferes with the timers
    let (handle, session_rx) = registry.register_with_uid("tab");
    let sync_rx = store.subscribe("tab");
    let (_server_handle, _server_rx) = registry.register_with_uid("server");
    store.write_key("server", StoreTopic::ActiveSession, json!("server"));

    let (sink, frames) = RecordingSink::new();
    let center = NotificationCenter::new(
        store.clone(),
        Arc::new(handle),
        Arc::new(ScriptedPollClient::new()),
        Box::new(RecordingPlayer::new()),
        Box::new(sink),
    );
    assert!(!center.is_active());
    let task = tokio::spawn(center.run(sync_rx, session_rx));

    // The active pseudo-session pushes settings and a one-item list
    store.write_key("server", StoreTopic::UserSettings, json!({"msg_timeout": 10}));
    store.write_key(
        "server",
        StoreTopic::List,
        json!([{"eventid": "1", "severity": 3}]),
    );
    settle().await;

    let shown = |frames: &Arc<Mutex<Vec<Vec<Notification>>>>| {
        frames
            .lock()
            .unwrap()
            .last()
            .map(|f| f.iter().map(|n| n.id.clone()).collect::<Vec<_>>())
            .unwrap_or_default()
    };
    assert_eq!(shown(&frames), vec!["1"]);
    let frames_at_consume = frames.lock().unwrap().len();

    // Present at T - 1ms
    tokio::time::sleep(Duration::from_millis(9994)).await;
    assert_eq!(shown(&frames), vec!["1"]);
    assert_eq!(
        frames.lock().unwrap().len(),
        frames_at_consume,
        "no repaint before the deadline"
    );

    // Absent by T + debounce window
    tokio::time::sleep(Duration::from_millis(6 + 50 + 5)).await;
    assert_eq!(shown(&frames), Vec::<String>::new());

    // The removal was pushed so siblings drop it too
    let list = store.read_key(StoreTopic::List).unwrap();
    assert_eq!(list, Value::Array(vec![]));

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn alarm_marks_played_after_timeout() {
    let store = Arc::new(MemoryStore::new());
    let registry = SessionRegistry::new();

    let session = open_session(&store, &registry, "a", Box::new(NullSink));
    session.client.push_envelope(PollEnvelope {
        notifications: vec![RawNotification::new("7", 5)],
        ..PollEnvelope::default()
    });
    settle().await;

    let snapshot = store.read_key(StoreTopic::AlarmState).unwrap();
    assert_eq!(snapshot["start"], json!("7/5"));
    assert_eq!(snapshot["end"], Value::Null);

    // Default alarm timeout is 10s; once it elapses the composite id moves
    // to `end` and the new state is flushed for peers
    tokio::time::sleep(Duration::from_secs(11)).await;
    let snapshot = store.read_key(StoreTopic::AlarmState).unwrap();
    assert_eq!(snapshot["end"], json!("7/5"));

    session.task.abort();
}

#[tokio::test(start_paused = true)]
async fn poll_failure_erases_shared_state_for_everyone() {
    let store = Arc::new(MemoryStore::new());
    let registry = SessionRegistry::new();

    let a = open_session(&store, &registry, "a", Box::new(NullSink));
    let (b_sink, b_frames) = RecordingSink::new();
    let b = open_session(&store, &registry, "b", Box::new(b_sink));
    settle().await;

    // b is active (registered last); deliver one good poll, then a failure
    b.client.push_envelope(PollEnvelope {
        notifications: vec![RawNotification::new("1", 4)],
        ..PollEnvelope::default()
    });
    b.client.push_failure("gateway timeout");
    settle().await;
    assert!(!b_frames.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;

    for topic in StoreTopic::ALL {
        assert_eq!(store.read_key(topic), None, "{topic} must be erased");
    }
    let last_frame = b_frames.lock().unwrap().last().cloned().unwrap();
    assert!(last_frame.is_empty(), "the panel goes silent, not stale");

    a.task.abort();
    b.task.abort();
}
