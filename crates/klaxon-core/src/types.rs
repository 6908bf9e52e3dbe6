//! Shared type definitions used across KLAXON crates.
//!
//! These are the documents that travel through the shared store and the poll
//! endpoint, plus the in-memory notification entity derived from them. The
//! wire encoding of severities matches the server's integer scheme, so raw
//! payloads round-trip byte-for-byte.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned notification identifier.
pub type EventId = String;

/// Stable unique identifier of one session (browser tab analogue).
pub type SessionId = String;

/// Wire value for the "resolved" severity sentinel.
pub const SEVERITY_RESOLVED_WIRE: i32 = -1;

/// Wire value for the "nothing selected" severity sentinel.
pub const SEVERITY_UNSET_WIRE: i32 = -2;

/// Default per-notification display timeout in seconds.
pub const DEFAULT_MSG_TIMEOUT_SECS: u64 = 60;

/// Default alarm playback timeout in seconds, used when the configured
/// value is unset.
pub const DEFAULT_ALARM_TIMEOUT_SECS: i64 = 10;

/// `alarm_timeout` policy value: play for the notification's display timeout.
pub const ALARM_TIMEOUT_INFINITE: i64 = -1;

/// `alarm_timeout` policy value: play the sound file exactly once.
pub const ALARM_TIMEOUT_ONCE: i64 = 1;

/// Sound file used when no per-severity file is configured.
pub const DEFAULT_ALARM_FILE: &str = "alarm_default.wav";

/// Alarm severity with a total order.
///
/// `Unset` is the "nothing selected" sentinel and sorts below everything.
/// `Resolved` marks a resolved notification and sorts *above* every numeric
/// level: a resolved event always wins candidate selection over an ongoing
/// one. Variant declaration order carries the `Ord` derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
pub enum AlarmSeverity {
    /// Nothing selected
    #[default]
    Unset,
    /// Numeric severity level, higher = more severe
    Level(u8),
    /// Resolved sentinel, outranks every level
    Resolved,
}

impl AlarmSeverity {
    /// Returns true for the resolved sentinel.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved)
    }

    /// Returns true for the "nothing selected" sentinel.
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl From<i32> for AlarmSeverity {
    fn from(wire: i32) -> Self {
        match wire {
            SEVERITY_RESOLVED_WIRE => Self::Resolved,
            n if n >= 0 => Self::Level(n.min(u8::MAX as i32) as u8),
            _ => Self::Unset,
        }
    }
}

impl From<AlarmSeverity> for i32 {
    fn from(severity: AlarmSeverity) -> i32 {
        match severity {
            AlarmSeverity::Unset => SEVERITY_UNSET_WIRE,
            AlarmSeverity::Level(n) => n as i32,
            AlarmSeverity::Resolved => SEVERITY_RESOLVED_WIRE,
        }
    }
}

impl std::fmt::Display for AlarmSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            Self::Level(n) => write!(f, "{n}"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// Raw notification payload as the server sent it.
///
/// Only the fields the coordinator needs are named; everything else rides
/// along in `extra` and round-trips through the shared store untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNotification {
    /// Server-assigned stable event id
    pub eventid: EventId,

    /// Severity on the server's integer scale (`-1` = resolved)
    #[serde(default)]
    pub severity: i32,

    /// Client-side snooze flag, merged back before pushing
    #[serde(default)]
    pub snoozed: bool,

    /// Remaining payload, forwarded opaquely
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RawNotification {
    /// Create a minimal raw payload (tests and simulator scenarios).
    pub fn new(eventid: impl Into<EventId>, severity: i32) -> Self {
        Self {
            eventid: eventid.into(),
            severity,
            snoozed: false,
            extra: serde_json::Map::new(),
        }
    }
}

/// One alertable event, as held in a session's working set.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Server-assigned stable id
    pub id: EventId,
    /// Parsed severity
    pub severity: AlarmSeverity,
    /// Snoozed by the user in some session
    pub snoozed: bool,
    /// When this session first saw the payload; local only, never shared
    pub received_at: DateTime<Utc>,
    /// The payload as received, for round-tripping
    pub raw: RawNotification,
}

impl Notification {
    /// Build the in-memory entity from a raw server payload.
    pub fn from_raw(raw: RawNotification) -> Self {
        Self {
            id: raw.eventid.clone(),
            severity: AlarmSeverity::from(raw.severity),
            snoozed: raw.snoozed,
            received_at: Utc::now(),
            raw,
        }
    }

    /// Composite alarm id pairing event id and severity.
    ///
    /// The alarm controller compares these to remember "already sounded for
    /// this exact notification+severity" across consume cycles.
    pub fn alarm_key(&self) -> String {
        format!("{}/{}", self.id, i32::from(self.severity))
    }

    /// Returns true if the underlying event is resolved.
    pub fn is_resolved(&self) -> bool {
        self.severity.is_resolved()
    }

    /// Auto-dismiss delay for this notification under the given settings.
    pub fn calc_display_timeout(&self, settings: &UserSettings) -> Duration {
        Duration::from_secs(settings.msg_timeout)
    }

    /// The raw payload with the current snooze flag merged back in.
    pub fn to_raw(&self) -> RawNotification {
        let mut raw = self.raw.clone();
        raw.snoozed = self.snoozed;
        raw
    }
}

/// Returns true if every notification in a *non-empty* set is snoozed.
///
/// Vacuously false on an empty set; a single non-snoozed item makes the
/// whole set not-snoozed. The alarm stop logic depends on this exact truth
/// table: an all-snoozed panel silences the alarm, an empty panel does not.
pub fn all_snoozed(notifications: &[Notification]) -> bool {
    !notifications.is_empty() && notifications.iter().all(|n| n.snoozed)
}

/// User-facing notification settings, as delivered by the poll endpoint and
/// mirrored through the shared store.
///
/// Missing fields are backfilled by serde defaults rather than validated:
/// a legacy-shaped document always decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Per-notification display timeout in seconds
    #[serde(default = "default_msg_timeout")]
    pub msg_timeout: u64,

    /// Alarm playback policy: `-1` = play for the notification's display
    /// timeout, `1` = play once, other positive = play that many seconds
    #[serde(default = "default_alarm_timeout")]
    pub alarm_timeout: i64,

    /// Alarm muted by the user
    #[serde(default)]
    pub muted: bool,

    /// Notification frontend disabled entirely
    #[serde(default)]
    pub disabled: bool,

    /// Sound file per severity wire value
    #[serde(default)]
    pub severity_files: HashMap<i32, String>,

    /// Display style name per severity wire value
    #[serde(default)]
    pub severity_styles: HashMap<i32, String>,
}

fn default_msg_timeout() -> u64 {
    DEFAULT_MSG_TIMEOUT_SECS
}

fn default_alarm_timeout() -> i64 {
    DEFAULT_ALARM_TIMEOUT_SECS
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            msg_timeout: default_msg_timeout(),
            alarm_timeout: default_alarm_timeout(),
            muted: false,
            disabled: false,
            severity_files: HashMap::new(),
            severity_styles: HashMap::new(),
        }
    }
}

impl UserSettings {
    /// Sound file for a severity, falling back to the default file.
    pub fn sound_for(&self, severity: AlarmSeverity) -> &str {
        self.severity_files
            .get(&i32::from(severity))
            .map(String::as_str)
            .unwrap_or(DEFAULT_ALARM_FILE)
    }
}

/// Snapshot of the alarm playback state, persisted as the `alarm_state`
/// shared document so a newly active session resumes audio mid-playback.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlarmStateSnapshot {
    /// Composite alarm id currently eligible to sound
    #[serde(default)]
    pub start: Option<String>,

    /// Last composite alarm id confirmed played
    #[serde(default)]
    pub end: Option<String>,

    /// Alarm muted
    #[serde(default)]
    pub muted: bool,

    /// Severity of the eligible notification
    #[serde(default)]
    pub severity: AlarmSeverity,

    /// Playback position in seconds at snapshot time
    #[serde(default)]
    pub seek: f64,

    /// Remaining playback timeout in seconds at snapshot time
    #[serde(default)]
    pub timeout: f64,

    /// Whether the snapshotting session could actually produce sound
    #[serde(default)]
    pub supported: bool,
}

/// Timestamp type used throughout KLAXON.
pub type Timestamp = DateTime<Utc>;

/// Get the current UTC timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}
