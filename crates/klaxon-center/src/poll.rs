//! Server poll endpoint client.
//!
//! The transport is an external collaborator behind [`PollClient`]: one
//! fetch per tick carrying the locally known event ids, plus the two
//! user-action calls (mark read, persist mute). A non-error reply always
//! contains the *full* current set, never a delta.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use klaxon_core::{EventId, KlaxonError, RawNotification, Result, UserSettings};

/// A successful poll reply: the authoritative settings and notification set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollEnvelope {
    /// Current user settings
    #[serde(default)]
    pub settings: UserSettings,

    /// The full current notification set
    #[serde(default)]
    pub notifications: Vec<RawNotification>,

    /// Server-side timestamp of the reply, when provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<DateTime<Utc>>,
}

/// Wire shape of a poll reply: either an envelope or an `{error}` payload.
#[derive(Debug, Deserialize)]
struct PollWire {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    settings: Option<UserSettings>,
    #[serde(default)]
    notifications: Option<Vec<RawNotification>>,
    #[serde(default)]
    server_time: Option<DateTime<Utc>>,
}

impl PollWire {
    fn into_envelope(self) -> Result<PollEnvelope> {
        if let Some(message) = self.error {
            return Err(KlaxonError::server_error(message));
        }
        Ok(PollEnvelope {
            settings: self.settings.unwrap_or_default(),
            notifications: self.notifications.unwrap_or_default(),
            server_time: self.server_time,
        })
    }
}

/// Narrow interface to the notification server.
#[async_trait]
pub trait PollClient: Send + Sync {
    /// Fetch the full current notification set.
    ///
    /// `known_eventids` tells the server what this client already displays,
    /// so it can compute exactly what changed or resolved.
    async fn poll(&self, known_eventids: &[EventId]) -> Result<PollEnvelope>;

    /// Mark the given events read (the close action).
    async fn mark_read(&self, eventids: &[EventId]) -> Result<()>;

    /// Persist the mute flag server-side before it is applied locally.
    async fn set_muted(&self, muted: bool) -> Result<()>;
}

/// Default request timeout for the HTTP client.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// [`PollClient`] over HTTP using JSON request/response bodies.
pub struct HttpPollClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPollClient {
    /// Create a client against the given base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KlaxonError::transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| KlaxonError::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KlaxonError::TransportStatus {
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PollClient for HttpPollClient {
    async fn poll(&self, known_eventids: &[EventId]) -> Result<PollEnvelope> {
        let body = serde_json::json!({ "known_eventids": known_eventids });
        let response = self.post_json("notifications/poll", &body).await?;

        let wire: PollWire = response
            .json()
            .await
            .map_err(|e| KlaxonError::transport(format!("malformed poll reply: {e}")))?;
        let envelope = wire.into_envelope()?;
        debug!(
            notifications = envelope.notifications.len(),
            "poll reply received"
        );
        Ok(envelope)
    }

    async fn mark_read(&self, eventids: &[EventId]) -> Result<()> {
        let body = serde_json::json!({ "eventids": eventids });
        self.post_json("notifications/read", &body).await?;
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        let body = serde_json::json!({ "muted": muted });
        self.post_json("notifications/mute", &body).await?;
        Ok(())
    }
}

/// One scripted poll outcome.
#[derive(Debug, Clone)]
enum ScriptedReply {
    Envelope(PollEnvelope),
    Failure(String),
}

/// [`PollClient`] fed from a queue of canned replies (tests, simulator).
///
/// When the queue runs dry the last envelope repeats, so a steady-state
/// scenario only scripts the transitions.
#[derive(Default)]
pub struct ScriptedPollClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    last: Mutex<Option<PollEnvelope>>,
    poll_count: AtomicUsize,
    poll_log: Mutex<Vec<Vec<EventId>>>,
    read_log: Mutex<Vec<Vec<EventId>>>,
    mute_log: Mutex<Vec<bool>>,
    fail_actions: Mutex<bool>,
}

impl ScriptedPollClient {
    /// Create a client with an empty script (polls return empty envelopes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn push_envelope(&self, envelope: PollEnvelope) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Envelope(envelope));
    }

    /// Queue a transport failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Failure(message.into()));
    }

    /// Make `mark_read`/`set_muted` fail until turned off again.
    pub fn set_fail_actions(&self, fail: bool) {
        *self.fail_actions.lock().unwrap() = fail;
    }

    /// Number of polls served so far.
    pub fn poll_count(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    /// Known-id sets received by each poll, in order.
    pub fn poll_log(&self) -> Vec<Vec<EventId>> {
        self.poll_log.lock().unwrap().clone()
    }

    /// Event-id batches marked read, in order.
    pub fn read_log(&self) -> Vec<Vec<EventId>> {
        self.read_log.lock().unwrap().clone()
    }

    /// Mute flags persisted, in order.
    pub fn mute_log(&self) -> Vec<bool> {
        self.mute_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl PollClient for ScriptedPollClient {
    async fn poll(&self, known_eventids: &[EventId]) -> Result<PollEnvelope> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        self.poll_log
            .lock()
            .unwrap()
            .push(known_eventids.to_vec());

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(ScriptedReply::Envelope(envelope)) => {
                *self.last.lock().unwrap() = Some(envelope.clone());
                Ok(envelope)
            }
            Some(ScriptedReply::Failure(message)) => Err(KlaxonError::transport(message)),
            None => Ok(self.last.lock().unwrap().clone().unwrap_or_default()),
        }
    }

    async fn mark_read(&self, eventids: &[EventId]) -> Result<()> {
        if *self.fail_actions.lock().unwrap() {
            return Err(KlaxonError::transport("scripted action failure"));
        }
        self.read_log.lock().unwrap().push(eventids.to_vec());
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        if *self.fail_actions.lock().unwrap() {
            return Err(KlaxonError::transport("scripted action failure"));
        }
        self.mute_log.lock().unwrap().push(muted);
        Ok(())
    }
}
