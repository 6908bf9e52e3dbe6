//! Alarm selection and playback state machine.
//!
//! The controller decides which notification (if any) should currently
//! sound, remembers what has already sounded, and renders its decision into
//! an [`AlarmPlayer`]. Selection state is rebuilt from scratch on every list
//! consumption; played state survives across consume cycles so a poll does
//! not restart an alarm the user already heard.

use std::time::Duration;

use tracing::debug;

use klaxon_core::types::{ALARM_TIMEOUT_INFINITE, ALARM_TIMEOUT_ONCE, DEFAULT_ALARM_TIMEOUT_SECS};
use klaxon_core::{AlarmSeverity, AlarmStateSnapshot, EventId, Notification, UserSettings, all_snoozed};

use crate::player::AlarmPlayer;

/// Explicit playback phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmPhase {
    /// No candidate selected
    #[default]
    Idle,
    /// A candidate is selected but not sounding
    Armed,
    /// The candidate is sounding
    Playing,
    /// The candidate has already sounded to completion
    Played,
}

/// The currently eligible notification, tracked by id rather than by
/// handle, so a removed notification cannot leave a dangling reference.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    eventid: EventId,
    severity: AlarmSeverity,
}

impl Candidate {
    /// Composite alarm id, the unit of "already played" bookkeeping.
    fn key(&self) -> String {
        format!("{}/{}", self.eventid, i32::from(self.severity))
    }
}

/// Playback bound derived from the configured `alarm_timeout` policy.
#[derive(Debug, Clone, Copy, PartialEq)]
enum PlaybackBound {
    /// Play the file exactly once
    Once,
    /// Loop for this many seconds
    Secs(f64),
}

/// Adopted playback position from a peer's snapshot, applied on the next
/// restart of the matching alarm key only.
#[derive(Debug, Clone, PartialEq)]
struct ResumePoint {
    key: String,
    seek: f64,
}

/// Decides which notification should sound and drives the player.
#[derive(Debug, Default)]
pub struct AlarmController {
    phase: AlarmPhase,
    severity: AlarmSeverity,
    candidate: Option<Candidate>,
    /// Composite key last confirmed played ("end")
    played: Option<String>,
    muted: bool,
    /// Composite key last rendered into the player; restart only on change
    last_rendered: Option<String>,
    resume: Option<ResumePoint>,
}

impl AlarmController {
    /// Create an idle controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current playback phase.
    pub fn phase(&self) -> AlarmPhase {
        self.phase
    }

    /// Severity of the current candidate.
    pub fn severity(&self) -> AlarmSeverity {
        self.severity
    }

    /// Event id of the current candidate.
    pub fn candidate_id(&self) -> Option<&str> {
        self.candidate.as_ref().map(|c| c.eventid.as_str())
    }

    /// Composite alarm id of the current candidate.
    pub fn current_key(&self) -> Option<String> {
        self.candidate.as_ref().map(Candidate::key)
    }

    /// Drop the selection. Called at the top of every list consumption;
    /// played state and mute survive.
    pub fn reset(&mut self) {
        self.phase = AlarmPhase::Idle;
        self.severity = AlarmSeverity::Unset;
        self.candidate = None;
    }

    /// Offer one notification as an alarm candidate.
    ///
    /// Snoozed notifications never sound. A strictly higher severity
    /// replaces the candidate; ties keep the first-seen notification, so
    /// iteration in server list order makes the earliest max-severity item
    /// win. The resolved sentinel outranks every numeric level.
    pub fn accept(&mut self, notification: &Notification) {
        if notification.snoozed {
            return;
        }
        if notification.severity > self.severity {
            self.severity = notification.severity;
            self.candidate = Some(Candidate {
                eventid: notification.id.clone(),
                severity: notification.severity,
            });
            self.phase = if self.is_played() {
                AlarmPhase::Played
            } else {
                AlarmPhase::Armed
            };
        }
    }

    /// True iff the current candidate has already sounded to completion.
    pub fn is_played(&self) -> bool {
        match &self.candidate {
            Some(candidate) => self.played.as_deref() == Some(candidate.key().as_str()),
            None => false,
        }
    }

    /// Record that the current candidate finished sounding.
    pub fn mark_played(&mut self) {
        if let Some(candidate) = &self.candidate {
            let key = candidate.key();
            debug!(alarm_key = %key, "alarm played to completion");
            self.played = Some(key);
            self.phase = AlarmPhase::Played;
        }
    }

    /// Adopt a peer's persisted playback state.
    ///
    /// Inbound only: the candidate itself is re-derived from the next list
    /// consumption, never taken from a snapshot, so `start` can only ever
    /// change through [`accept`](Self::accept). The seek position is kept
    /// until a restart of the matching alarm key consumes it.
    pub fn consume(&mut self, snapshot: &AlarmStateSnapshot) {
        self.muted = snapshot.muted;
        self.played = snapshot.end.clone();
        self.resume = snapshot.start.as_ref().map(|key| ResumePoint {
            key: key.clone(),
            seek: snapshot.seek,
        });
        // Force the next render to reissue playback commands
        self.last_rendered = None;
        if self.is_played() {
            self.phase = AlarmPhase::Played;
        }
    }

    /// Playback bound for the candidate under the configured policy.
    fn playback_bound(&self, settings: &UserSettings, notification: &Notification) -> PlaybackBound {
        match settings.alarm_timeout {
            ALARM_TIMEOUT_INFINITE => {
                PlaybackBound::Secs(notification.calc_display_timeout(settings).as_secs_f64())
            }
            ALARM_TIMEOUT_ONCE => PlaybackBound::Once,
            t if t > 0 => PlaybackBound::Secs(t as f64),
            _ => PlaybackBound::Secs(DEFAULT_ALARM_TIMEOUT_SECS as f64),
        }
    }

    /// Render the selection into the player.
    ///
    /// Returns how long until the alarm counts as played, or `None` when
    /// nothing is (or may be) sounding. Playback only restarts when the
    /// composite id differs from the last rendered one; re-rendering an
    /// unchanged selection must not cause an audible glitch.
    pub fn render(
        &mut self,
        player: &mut dyn AlarmPlayer,
        settings: &UserSettings,
        notifications: &[Notification],
    ) -> Option<Duration> {
        if !player.is_supported() {
            return None;
        }

        self.muted = settings.muted;
        if self.muted {
            player.mute();
        } else {
            player.unmute();
        }

        let visible = self
            .candidate
            .as_ref()
            .and_then(|c| notifications.iter().find(|n| n.id == c.eventid));

        let silenced = settings.disabled || self.is_played() || all_snoozed(notifications);

        let Some(notification) = visible.filter(|_| !silenced) else {
            player.stop();
            self.last_rendered = None;
            self.phase = match &self.candidate {
                None => AlarmPhase::Idle,
                Some(_) if self.is_played() => AlarmPhase::Played,
                Some(_) => AlarmPhase::Armed,
            };
            return None;
        };

        let key = self
            .candidate
            .as_ref()
            .map(Candidate::key)
            .unwrap_or_default();

        match self.playback_bound(settings, notification) {
            PlaybackBound::Once => player.play_once(true),
            PlaybackBound::Secs(secs) => {
                player.play_once(false);
                player.set_timeout(secs);
            }
        }

        if self.last_rendered.as_deref() != Some(key.as_str()) {
            let seek = match self.resume.take() {
                Some(point) if point.key == key => point.seek,
                _ => 0.0,
            };
            player.load(settings.sound_for(self.severity));
            player.seek(seek);
            player.play();
            self.last_rendered = Some(key);
        }

        self.phase = AlarmPhase::Playing;
        let remaining = player.timeout_remaining();
        (remaining > 0.0).then(|| Duration::from_secs_f64(remaining))
    }

    /// Pure snapshot of the playback state, suitable for persisting.
    pub fn produce(&self, player: &dyn AlarmPlayer) -> AlarmStateSnapshot {
        AlarmStateSnapshot {
            start: self.candidate.as_ref().map(Candidate::key),
            end: self.played.clone(),
            muted: self.muted,
            severity: self.severity,
            seek: player.seek_position(),
            timeout: player.timeout_remaining(),
            supported: player.is_supported(),
        }
    }
}
