//! The in-memory notification working set.
//!
//! Holds the ordered set of notifications a session currently displays,
//! along with each one's display deadline. The server's list is
//! authoritative: every consumption replaces the whole set, carrying only
//! the client-side snooze flags across. Deadlines are plain instants: the
//! center's event loop owns the single timer that watches the earliest one,
//! so a removed notification can never fire a stale callback.

use tokio::time::Instant;

use klaxon_alarm::AlarmController;
use klaxon_core::{EventId, Notification, RawNotification, UserSettings};

struct Entry {
    notification: Notification,
    deadline: Instant,
}

/// Ordered set of notifications with per-item display deadlines.
#[derive(Default)]
pub struct NotificationCollection {
    entries: Vec<Entry>,
}

impl NotificationCollection {
    /// Create an empty working set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire working set from an authoritative server list.
    ///
    /// Snooze flags of surviving ids are carried over before the alarm
    /// pass, so a user snooze outlives the next poll. The alarm controller
    /// is reset and re-offered every notification in list order, which is
    /// what gives equal severities their first-seen tie-break.
    pub fn replace_all(
        &mut self,
        raws: Vec<RawNotification>,
        settings: &UserSettings,
        alarm: &mut AlarmController,
        now: Instant,
    ) {
        let carried: Vec<EventId> = self
            .entries
            .iter()
            .filter(|e| e.notification.snoozed)
            .map(|e| e.notification.id.clone())
            .collect();

        alarm.reset();
        self.entries = raws
            .into_iter()
            .map(|raw| {
                let mut notification = Notification::from_raw(raw);
                notification.snoozed =
                    notification.snoozed || carried.contains(&notification.id);
                alarm.accept(&notification);
                let deadline = now + notification.calc_display_timeout(settings);
                Entry {
                    notification,
                    deadline,
                }
            })
            .collect();
    }

    /// Remove every notification whose display deadline has passed.
    ///
    /// Returns the removed ids in display order.
    pub fn expire_due(&mut self, now: Instant) -> Vec<EventId> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if e.deadline <= now {
                removed.push(e.notification.id.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// The earliest display deadline, if any notification is visible.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Remove one notification by id. Returns true if it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.notification.id != id);
        self.entries.len() != before
    }

    /// Snooze every visible notification. Returns true if anything changed.
    pub fn snooze_all(&mut self) -> bool {
        let mut changed = false;
        for entry in &mut self.entries {
            if !entry.notification.snoozed {
                entry.notification.snoozed = true;
                changed = true;
            }
        }
        changed
    }

    /// Look up one notification by id.
    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.entries
            .iter()
            .map(|e| &e.notification)
            .find(|n| n.id == id)
    }

    /// Ids of every visible notification, in display order.
    pub fn ids(&self) -> Vec<EventId> {
        self.entries
            .iter()
            .map(|e| e.notification.id.clone())
            .collect()
    }

    /// Owned copies of every visible notification, in display order.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries
            .iter()
            .map(|e| e.notification.clone())
            .collect()
    }

    /// Raw payloads with current snooze flags, for pushing to the store.
    pub fn to_raw(&self) -> Vec<RawNotification> {
        self.entries
            .iter()
            .map(|e| e.notification.to_raw())
            .collect()
    }

    /// Drop everything (poll-failure teardown).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of visible notifications.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the working set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
