//! The per-session orchestrator.
//!
//! [`NotificationCenter`] runs one session's half of the coordination
//! protocol: the active/inactive election, the consume/push state
//! synchronization discipline, the poll loop with dynamic interval tuning,
//! and the display/alarm timer plumbing.
//!
//! The discipline in one sentence: `consume_*` applies inbound shared state
//! to local caches and is safe to repeat; `push_*` writes locally-originated
//! changes out; a change notification handler may consume, never push.
//! Because the store never notifies the writer of its own write, this one
//! rule is what keeps two sessions from echoing updates at each other
//! indefinitely.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use klaxon_alarm::{AlarmController, AlarmPlayer};
use klaxon_core::log_session_event;
use klaxon_core::{AlarmStateSnapshot, EventId, RawNotification, SessionId, UserSettings};
use klaxon_session::{
    SessionEvent, SessionHandle, SharedStore, StoreTopic, SyncMessage, decode_or_default,
};

use crate::collection::NotificationCollection;
use crate::poll::PollClient;
use crate::render::RenderSink;

/// Default (and maximum) poll interval in seconds.
pub const POLL_INTERVAL_DEFAULT_SECS: u64 = 30;

/// Debounce window for coalescing removal bursts into one repaint.
pub const RENDER_DEBOUNCE_MS: u64 = 50;

/// Poll interval under the given settings.
///
/// Polling shortens when the configured auto-dismiss timeout is short, so a
/// notification that resolved server-side is not left displayed past its
/// intended lifetime: `clamp(msg_timeout / 2, 1, POLL_INTERVAL_DEFAULT)`.
pub fn calc_poll_interval(settings: &UserSettings) -> Duration {
    Duration::from_secs((settings.msg_timeout / 2).clamp(1, POLL_INTERVAL_DEFAULT_SECS))
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// One session's notification coordinator.
///
/// Dependencies are passed in explicitly; the center owns no globals. Drive
/// it either through [`run`](Self::run) (production and simulation) or by
/// calling the handler methods directly (tests).
pub struct NotificationCenter {
    store: Arc<dyn SharedStore>,
    session: Arc<dyn SessionHandle>,
    poll_client: Arc<dyn PollClient>,
    player: Box<dyn AlarmPlayer>,
    sink: Box<dyn RenderSink>,

    active: bool,
    /// Set for good during unload handoff; a stray focus event racing the
    /// unload must not reactivate this session.
    activation_disabled: bool,
    /// Latched on poll failure; polling resumes only on reconstruction.
    polling_stopped: bool,

    settings: UserSettings,
    collection: NotificationCollection,
    alarm: AlarmController,
    cached_active_uid: Option<SessionId>,

    poll_interval: Duration,
    poll_deadline: Option<Instant>,
    render_deadline: Option<Instant>,
    alarm_deadline: Option<Instant>,
}

impl NotificationCenter {
    /// Construct a center, prime its caches from the store, and run the
    /// construction-time election: claim the active role when nobody holds
    /// it, when the recorded holder is gone, or when this session has
    /// focus.
    pub fn new(
        store: Arc<dyn SharedStore>,
        session: Arc<dyn SessionHandle>,
        poll_client: Arc<dyn PollClient>,
        player: Box<dyn AlarmPlayer>,
        sink: Box<dyn RenderSink>,
    ) -> Self {
        let settings = UserSettings::default();
        let poll_interval = calc_poll_interval(&settings);
        let mut center = Self {
            store,
            session,
            poll_client,
            player,
            sink,
            active: false,
            activation_disabled: false,
            polling_stopped: false,
            settings,
            collection: NotificationCollection::new(),
            alarm: AlarmController::new(),
            cached_active_uid: None,
            poll_interval,
            poll_deadline: None,
            render_deadline: None,
            alarm_deadline: None,
        };

        center.consume_user_settings(center.store.read_key(StoreTopic::UserSettings));
        center.consume_alarm_state(center.store.read_key(StoreTopic::AlarmState));
        center.consume_list(center.store.read_key(StoreTopic::List));
        let recorded = center
            .store
            .read_key(StoreTopic::ActiveSession)
            .and_then(|v| v.as_str().map(String::from));
        center.consume_active_session(recorded);

        if center.should_claim_at_construction() {
            center.become_active();
        }
        center.render();
        center
    }

    fn should_claim_at_construction(&self) -> bool {
        match self.cached_active_uid.as_deref() {
            None => true,
            Some(uid) if uid == self.session.uid() => true,
            // The recorded holder no longer exists (stale entry from a
            // session that never ran its close path)
            Some(uid) if !self.session.all_uids().iter().any(|u| u == uid) => true,
            Some(_) => self.session.has_focus(),
        }
    }

    /// This session's uid.
    pub fn uid(&self) -> &str {
        self.session.uid()
    }

    /// Whether this session currently owns polling and the alarm.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current user settings cache.
    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    /// Ids of the currently visible notifications.
    pub fn visible_ids(&self) -> Vec<EventId> {
        self.collection.ids()
    }

    /// The alarm state machine (read-only).
    pub fn alarm(&self) -> &AlarmController {
        &self.alarm
    }

    // =========================================================================
    // Election
    // =========================================================================

    /// Take over polling and the alarm. Idempotent; a no-op once this
    /// session is already active or has begun unloading.
    pub fn become_active(&mut self) {
        if self.activation_disabled || self.active {
            return;
        }
        log_session_event!(self.session.uid(), "become_active");

        self.cached_active_uid = Some(self.session.uid().to_string());
        self.active = true;
        self.push_active_session();

        // Start from the latest shared truth, not our possibly-stale caches
        self.consume_user_settings(self.store.read_key(StoreTopic::UserSettings));
        self.consume_alarm_state(self.store.read_key(StoreTopic::AlarmState));
        self.consume_list(self.store.read_key(StoreTopic::List));

        self.schedule_poll_now();
        self.render();
    }

    /// Yield the active role. Flushes the playback snapshot first so the
    /// next active session inherits the exact position, then silences the
    /// player: only the active session may produce sound.
    pub fn become_inactive(&mut self) {
        if self.active {
            log_session_event!(self.session.uid(), "become_inactive");
            self.push_alarm_state();
            self.player.stop();
            self.alarm_deadline = None;
        }
        self.active = false;
        self.cached_active_uid = None;
        self.poll_deadline = None;
    }

    // =========================================================================
    // Consume (inbound, idempotent, never writes)
    // =========================================================================

    /// Apply a `user_settings` document to the local cache.
    pub fn consume_user_settings(&mut self, value: Option<Value>) {
        let settings = decode_or_default(StoreTopic::UserSettings, value);
        self.apply_settings(settings);
    }

    fn apply_settings(&mut self, settings: UserSettings) {
        let interval = calc_poll_interval(&settings);
        self.settings = settings;
        if interval != self.poll_interval {
            debug!(
                interval_secs = interval.as_secs(),
                "poll interval retuned"
            );
            self.poll_interval = interval;
            // Restart the cadence; one poll fires right away
            if self.active {
                self.schedule_poll_now();
            }
        }
    }

    /// Apply a `list` document to the working set.
    pub fn consume_list(&mut self, value: Option<Value>) {
        let raws: Vec<RawNotification> = decode_or_default(StoreTopic::List, value);
        self.apply_list(raws);
    }

    fn apply_list(&mut self, raws: Vec<RawNotification>) {
        self.collection
            .replace_all(raws, &self.settings, &mut self.alarm, Instant::now());
    }

    /// Apply an `alarm_state` document to the controller.
    pub fn consume_alarm_state(&mut self, value: Option<Value>) {
        let snapshot: AlarmStateSnapshot = decode_or_default(StoreTopic::AlarmState, value);
        self.alarm.consume(&snapshot);
    }

    /// Apply an `active_tabid` document to the cache.
    pub fn consume_active_session(&mut self, uid: Option<SessionId>) {
        self.cached_active_uid = uid;
    }

    // =========================================================================
    // Push (outbound, only for locally-originated changes)
    // =========================================================================

    fn push_value<T: Serialize>(&self, topic: StoreTopic, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.store.write_key(self.session.uid(), topic, value),
            Err(e) => warn!(topic = %topic, error = %e, "failed to encode shared document"),
        }
    }

    fn push_list(&self) {
        self.push_value(StoreTopic::List, &self.collection.to_raw());
    }

    fn push_user_settings(&self) {
        self.push_value(StoreTopic::UserSettings, &self.settings);
    }

    fn push_alarm_state(&self) {
        let snapshot = self.alarm.produce(&*self.player);
        self.push_value(StoreTopic::AlarmState, &snapshot);
    }

    fn push_active_session(&self) {
        self.push_value(StoreTopic::ActiveSession, &self.session.uid());
    }

    fn push_updates(&self) {
        self.push_user_settings();
        self.push_list();
        self.push_alarm_state();
        if self.active {
            self.push_active_session();
        }
    }

    // =========================================================================
    // Change notification
    // =========================================================================

    /// React to a peer's store write: consume, transition if the election
    /// key changed, render. Never pushes.
    pub fn handle_sync(&mut self, message: SyncMessage) {
        match message.topic {
            StoreTopic::List => self.consume_list(Some(message.value)),
            StoreTopic::UserSettings => self.consume_user_settings(Some(message.value)),
            StoreTopic::AlarmState => self.consume_alarm_state(Some(message.value)),
            StoreTopic::ActiveSession => {
                let uid = message.value.as_str().map(String::from);
                self.consume_active_session(uid.clone());
                match uid {
                    Some(uid) if uid == self.session.uid() => self.become_active(),
                    Some(uid) => {
                        self.become_inactive();
                        self.cached_active_uid = Some(uid);
                    }
                    // Erased: construction-time election decides next time
                    None => {}
                }
            }
        }
        self.render();
    }

    /// React to a session lifecycle event. Returns false when the session
    /// is closing and the loop should exit.
    pub fn handle_session_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::FocusGained => {
                self.become_active();
                self.render();
                true
            }
            SessionEvent::PeerCrashed { uid } => {
                // Only the crashed holder's role needs re-electing; an
                // unrelated crash changes nothing
                if self.cached_active_uid.is_none()
                    || self.cached_active_uid.as_deref() == Some(uid.as_str())
                {
                    log_session_event!(self.session.uid(), "peer_crashed", crashed = %uid);
                    self.become_active();
                }
                self.render();
                true
            }
            SessionEvent::Closing { peer_uids } => {
                self.handle_shutdown(&peer_uids);
                false
            }
        }
    }

    /// Before-unload: hand the active role to the first surviving peer, or
    /// erase everything when this was the last session (nothing may linger
    /// for a future single-session run to misread as live).
    pub fn handle_shutdown(&mut self, peer_uids: &[SessionId]) {
        if peer_uids.is_empty() {
            log_session_event!(self.session.uid(), "teardown");
            self.push_alarm_state();
            self.store.erase_all(self.session.uid());
        } else if self.active {
            let successor = peer_uids[0].clone();
            log_session_event!(self.session.uid(), "handoff", successor = %successor);
            self.push_alarm_state();
            self.player.stop();
            self.store.write_key(
                self.session.uid(),
                StoreTopic::ActiveSession,
                Value::String(successor),
            );
            self.active = false;
            self.cached_active_uid = None;
            self.poll_deadline = None;
        }
        self.activation_disabled = true;
        self.store.unsubscribe(self.session.uid());
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Repaint the local view and, on the active session only, re-render
    /// the alarm into the player.
    pub fn render(&mut self) {
        let snapshot = self.collection.snapshot();
        if self.settings.disabled {
            self.sink.render(&[]);
        } else {
            self.sink.render(&snapshot);
        }

        if self.active {
            let remaining = self
                .alarm
                .render(&mut *self.player, &self.settings, &snapshot);
            self.alarm_deadline = remaining.map(|d| Instant::now() + d);
        }
    }

    // =========================================================================
    // Poll loop
    // =========================================================================

    fn schedule_poll_now(&mut self) {
        if !self.polling_stopped {
            self.poll_deadline = Some(Instant::now());
        }
    }

    /// One poll cycle: fetch, consume, render, push.
    pub async fn poll_tick(&mut self) {
        if !self.active || self.polling_stopped {
            return;
        }

        let known = self.collection.ids();
        let reply = self.poll_client.poll(&known).await;

        // The role may have been handed off while the request was in flight
        if !self.active {
            return;
        }

        match reply {
            Ok(envelope) => {
                if let Some(server_time) = envelope.server_time {
                    debug!(%server_time, "poll reply");
                }
                self.apply_settings(envelope.settings);
                self.apply_list(envelope.notifications);
                self.render();
                self.push_updates();
            }
            Err(e) => {
                warn!(error = %e, "poll failed; tearing down shared notification state");
                self.shutdown_shared_state();
            }
        }
    }

    /// Go silent after a transport failure: stop polling, erase every
    /// shared key, drop the local set. Resumes only on reconstruction.
    fn shutdown_shared_state(&mut self) {
        self.polling_stopped = true;
        self.poll_deadline = None;
        self.store.erase_all(self.session.uid());
        self.collection.clear();
        self.alarm.reset();
        self.player.stop();
        self.alarm_deadline = None;
        self.render();
    }

    // =========================================================================
    // Display timers
    // =========================================================================

    fn handle_display_expiry(&mut self) {
        let removed = self.collection.expire_due(Instant::now());
        if removed.is_empty() {
            return;
        }
        debug!(count = removed.len(), "display timeout elapsed");
        // Coalesce a burst of near-simultaneous removals into one repaint
        self.render_deadline =
            Some(Instant::now() + Duration::from_millis(RENDER_DEBOUNCE_MS));
        self.push_list();
    }

    // =========================================================================
    // User actions
    // =========================================================================

    /// Close (mark read) one notification.
    ///
    /// Server first; on transport failure the local state is left unchanged
    /// so the action can be retried by repeating the click.
    pub async fn close_notification(&mut self, id: &str) {
        match self.poll_client.mark_read(&[id.to_string()]).await {
            Ok(()) => {
                if self.collection.remove(id) {
                    self.render();
                    self.push_list();
                }
            }
            Err(e) => {
                warn!(error = %e, eventid = id, "close failed; notification left in place");
            }
        }
    }

    /// Snooze every visible notification and propagate the flags.
    pub fn snooze_all(&mut self) {
        if self.collection.snooze_all() {
            self.render();
            self.push_list();
            self.push_alarm_state();
        }
    }

    /// Mute or unmute the alarm, persisting the flag remotely before
    /// applying it locally.
    pub async fn set_muted(&mut self, muted: bool) {
        match self.poll_client.set_muted(muted).await {
            Ok(()) => {
                self.settings.muted = muted;
                self.render();
                self.push_user_settings();
                self.push_alarm_state();
            }
            Err(e) => {
                warn!(error = %e, muted, "mute change failed; keeping current setting");
            }
        }
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Drive this session until it closes.
    ///
    /// Single task, cooperative: each arm runs to completion before the
    /// next event is taken, so a consume is always followed by the render
    /// that observes it with no interleaved local mutation.
    pub async fn run(
        mut self,
        mut sync_rx: mpsc::UnboundedReceiver<SyncMessage>,
        mut session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        if self.active && self.poll_deadline.is_none() {
            self.schedule_poll_now();
        }

        loop {
            let display_deadline = self.collection.next_deadline();
            tokio::select! {
                // Inbound state and lifecycle signals outrank timers: a
                // session must act on the freshest shared truth, never poll
                // or sound past a pending demotion
                biased;

                maybe = sync_rx.recv() => match maybe {
                    Some(message) => self.handle_sync(message),
                    None => break,
                },
                maybe = session_rx.recv() => match maybe {
                    Some(event) => {
                        if !self.handle_session_event(event) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = sleep_until_opt(self.poll_deadline), if self.poll_deadline.is_some() => {
                    self.poll_deadline = Some(Instant::now() + self.poll_interval);
                    self.poll_tick().await;
                }
                _ = sleep_until_opt(display_deadline), if display_deadline.is_some() => {
                    self.handle_display_expiry();
                }
                _ = sleep_until_opt(self.render_deadline), if self.render_deadline.is_some() => {
                    self.render_deadline = None;
                    self.render();
                }
                _ = sleep_until_opt(self.alarm_deadline), if self.alarm_deadline.is_some() => {
                    self.alarm_deadline = None;
                    self.alarm.mark_played();
                    self.push_alarm_state();
                    self.render();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::{PollEnvelope, ScriptedPollClient};
    use crate::render::NullSink;
    use klaxon_alarm::{AlarmPhase, RecordingPlayer};
    use klaxon_core::RawNotification;
    use klaxon_session::{MemoryStore, SessionRegistry};

    struct TestTab {
        center: NotificationCenter,
        sync_rx: mpsc::UnboundedReceiver<SyncMessage>,
        session_rx: mpsc::UnboundedReceiver<SessionEvent>,
        client: Arc<ScriptedPollClient>,
    }

    impl TestTab {
        fn open(store: &Arc<MemoryStore>, registry: &SessionRegistry, uid: &str) -> Self {
            let (handle, session_rx) = registry.register_with_uid(uid);
            let sync_rx = store.subscribe(uid);
            let client = Arc::new(ScriptedPollClient::new());
            let center = NotificationCenter::new(
                store.clone(),
                Arc::new(handle),
                client.clone(),
                Box::new(RecordingPlayer::new()),
                Box::new(NullSink),
            );
            Self {
                center,
                sync_rx,
                session_rx,
                client,
            }
        }

        /// Deliver every pending message, returning how many were handled.
        fn drain(&mut self) -> usize {
            let mut handled = 0;
            while let Ok(message) = self.sync_rx.try_recv() {
                self.center.handle_sync(message);
                handled += 1;
            }
            while let Ok(event) = self.session_rx.try_recv() {
                self.center.handle_session_event(event);
                handled += 1;
            }
            handled
        }
    }

    /// Deliver messages across all tabs until nothing is pending anywhere.
    fn settle(tabs: &mut [&mut TestTab]) {
        loop {
            let handled: usize = tabs.iter_mut().map(|t| t.drain()).sum();
            if handled == 0 {
                break;
            }
        }
    }

    fn envelope(specs: &[(&str, i32)]) -> PollEnvelope {
        PollEnvelope {
            notifications: specs
                .iter()
                .map(|(id, sev)| RawNotification::new(*id, *sev))
                .collect(),
            ..PollEnvelope::default()
        }
    }

    #[test]
    fn test_calc_poll_interval_tuning() {
        let with_timeout = |msg_timeout| UserSettings {
            msg_timeout,
            ..UserSettings::default()
        };
        assert_eq!(calc_poll_interval(&with_timeout(4)), Duration::from_secs(2));
        assert_eq!(
            calc_poll_interval(&with_timeout(1000)),
            Duration::from_secs(POLL_INTERVAL_DEFAULT_SECS)
        );
        assert_eq!(calc_poll_interval(&with_timeout(0)), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sole_session_claims_active_at_construction() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let tab = TestTab::open(&store, &registry, "a");

        assert!(tab.center.is_active());
        assert_eq!(
            store.read_key(StoreTopic::ActiveSession),
            Some(Value::String("a".into()))
        );
    }

    #[tokio::test]
    async fn test_focused_newcomer_takes_over() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut a = TestTab::open(&store, &registry, "a");
        let mut b = TestTab::open(&store, &registry, "b");

        // b registered last, has focus, claims the role; a hears the write
        settle(&mut [&mut a, &mut b]);
        assert!(!a.center.is_active());
        assert!(b.center.is_active());
        assert_eq!(
            store.read_key(StoreTopic::ActiveSession),
            Some(Value::String("b".into()))
        );
    }

    #[tokio::test]
    async fn test_focus_gain_reelects() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut a = TestTab::open(&store, &registry, "a");
        let mut b = TestTab::open(&store, &registry, "b");
        settle(&mut [&mut a, &mut b]);

        registry.focus("a");
        settle(&mut [&mut a, &mut b]);

        assert!(a.center.is_active());
        assert!(!b.center.is_active());
    }

    #[tokio::test]
    async fn test_consume_is_idempotent_and_never_writes() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut tab = TestTab::open(&store, &registry, "a");
        let mut probe = store.subscribe("probe");
        let value = serde_json::to_value(vec![
            RawNotification::new("x", 3),
            RawNotification::new("y", 5),
        ])
        .unwrap();

        tab.center.consume_list(Some(value.clone()));
        let first_ids = tab.center.visible_ids();
        let first_candidate = tab.center.alarm().candidate_id().map(String::from);

        tab.center.consume_list(Some(value));
        assert_eq!(tab.center.visible_ids(), first_ids);
        assert_eq!(
            tab.center.alarm().candidate_id().map(String::from),
            first_candidate
        );
        assert!(
            probe.try_recv().is_err(),
            "consume must not write to the store"
        );
    }

    #[tokio::test]
    async fn test_sync_handler_never_echoes() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut tab = TestTab::open(&store, &registry, "a");
        let mut probe = store.subscribe("probe");
        let value = serde_json::to_value(vec![RawNotification::new("x", 3)]).unwrap();

        // The same unchanged value arrives over and over, as if a confused
        // peer kept rewriting it; the handler must stay silent
        for _ in 0..10 {
            tab.center.handle_sync(SyncMessage {
                topic: StoreTopic::List,
                value: value.clone(),
            });
        }
        assert!(probe.try_recv().is_err(), "handle_sync must never push");
    }

    #[tokio::test]
    async fn test_poll_tick_pushes_updates() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut tab = TestTab::open(&store, &registry, "a");
        tab.client.push_envelope(envelope(&[("1", 4), ("2", 2)]));

        tab.center.poll_tick().await;

        assert_eq!(tab.center.visible_ids(), vec!["1", "2"]);
        assert_eq!(tab.client.poll_log(), vec![Vec::<String>::new()]);
        let list = store.read_key(StoreTopic::List).expect("list pushed");
        assert_eq!(list.as_array().unwrap().len(), 2);
        assert!(store.read_key(StoreTopic::AlarmState).is_some());

        // The next poll carries the now-known ids
        tab.center.poll_tick().await;
        assert_eq!(
            tab.client.poll_log()[1],
            vec!["1".to_string(), "2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_poll_failure_goes_silent() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut tab = TestTab::open(&store, &registry, "a");
        tab.client.push_envelope(envelope(&[("1", 4)]));
        tab.center.poll_tick().await;
        assert!(store.read_key(StoreTopic::List).is_some());

        tab.client.push_failure("connection reset");
        tab.center.poll_tick().await;

        assert!(tab.center.visible_ids().is_empty());
        for topic in StoreTopic::ALL {
            assert_eq!(store.read_key(topic), None, "{topic} must be erased");
        }

        // Polling stays latched off, even through re-election
        tab.center.become_inactive();
        tab.center.become_active();
        assert!(tab.center.poll_deadline.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_hands_off_to_first_peer() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut a = TestTab::open(&store, &registry, "a");
        let mut b = TestTab::open(&store, &registry, "b");
        let mut c = TestTab::open(&store, &registry, "c");
        settle(&mut [&mut a, &mut b, &mut c]);
        registry.focus("a");
        settle(&mut [&mut a, &mut b, &mut c]);
        assert!(a.center.is_active());

        registry.close("a");
        a.drain();
        settle(&mut [&mut b, &mut c]);

        assert!(b.center.is_active(), "first surviving peer inherits");
        assert!(!c.center.is_active());
        assert_eq!(
            store.read_key(StoreTopic::ActiveSession),
            Some(Value::String("b".into()))
        );
    }

    #[tokio::test]
    async fn test_unload_guard_blocks_late_activation() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut a = TestTab::open(&store, &registry, "a");
        let _b = TestTab::open(&store, &registry, "b");

        a.center.handle_shutdown(&["b".to_string()]);
        // A stray focus event racing the unload
        a.center.become_active();
        assert!(!a.center.is_active());
    }

    #[tokio::test]
    async fn test_sole_session_teardown_erases_all_keys() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut tab = TestTab::open(&store, &registry, "a");
        tab.client.push_envelope(envelope(&[("1", 4)]));
        tab.center.poll_tick().await;

        registry.close("a");
        let event = tab.session_rx.try_recv().unwrap();
        assert!(!tab.center.handle_session_event(event));

        for topic in StoreTopic::ALL {
            assert_eq!(store.read_key(topic), None, "{topic} must be erased");
        }
    }

    #[tokio::test]
    async fn test_close_action_failure_leaves_state() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut tab = TestTab::open(&store, &registry, "a");
        tab.client.push_envelope(envelope(&[("1", 4)]));
        tab.center.poll_tick().await;

        tab.client.set_fail_actions(true);
        tab.center.close_notification("1").await;
        assert_eq!(tab.center.visible_ids(), vec!["1"]);

        // Retrying the click after the transport recovers succeeds
        tab.client.set_fail_actions(false);
        tab.center.close_notification("1").await;
        assert!(tab.center.visible_ids().is_empty());
        assert_eq!(tab.client.read_log(), vec![vec!["1".to_string()]]);
    }

    #[tokio::test]
    async fn test_mute_persists_remotely_first() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut tab = TestTab::open(&store, &registry, "a");

        tab.client.set_fail_actions(true);
        tab.center.set_muted(true).await;
        assert!(!tab.center.settings().muted, "failed persist leaves setting");

        tab.client.set_fail_actions(false);
        tab.center.set_muted(true).await;
        assert!(tab.center.settings().muted);
        assert_eq!(tab.client.mute_log(), vec![true]);
    }

    #[tokio::test]
    async fn test_snooze_all_propagates() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut a = TestTab::open(&store, &registry, "a");
        let mut b = TestTab::open(&store, &registry, "b");
        settle(&mut [&mut a, &mut b]);
        b.client.push_envelope(envelope(&[("1", 4)]));
        b.center.poll_tick().await;
        settle(&mut [&mut a, &mut b]);

        b.center.snooze_all();
        settle(&mut [&mut a, &mut b]);

        let list = store.read_key(StoreTopic::List).unwrap();
        assert_eq!(list[0]["snoozed"], Value::Bool(true));
        assert_eq!(b.center.alarm().phase(), AlarmPhase::Armed);
    }

    #[tokio::test]
    async fn test_crash_of_active_peer_reelects() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut a = TestTab::open(&store, &registry, "a");
        let mut b = TestTab::open(&store, &registry, "b");
        settle(&mut [&mut a, &mut b]);
        assert!(b.center.is_active());

        registry.crash("b");
        settle(&mut [&mut a]);

        assert!(a.center.is_active());
        assert_eq!(
            store.read_key(StoreTopic::ActiveSession),
            Some(Value::String("a".into()))
        );
    }

    #[tokio::test]
    async fn test_crash_of_inactive_peer_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let mut a = TestTab::open(&store, &registry, "a");
        let mut b = TestTab::open(&store, &registry, "b");
        let mut c = TestTab::open(&store, &registry, "c");
        settle(&mut [&mut a, &mut b, &mut c]);
        assert!(c.center.is_active());

        registry.crash("a");
        settle(&mut [&mut b, &mut c]);

        assert!(c.center.is_active());
        assert!(!b.center.is_active());
    }
}
