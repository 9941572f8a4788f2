//! Reminder ledgers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One delivered reminder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReminderEntry {
    /// Delivery time.
    pub sent_at: DateTime<Utc>,
    /// Deadline the reminder was about; the entry expires after it.
    pub deadline: DateTime<Utc>,
    /// Course title at delivery time.
    pub course_name: String,
    /// Activity name at delivery time.
    pub activity_name: String,
}

/// Persisted set of reminder keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReminderLedger(BTreeMap<String, ReminderEntry>);

impl ReminderLedger {
    /// Key of the general reminder ledger.
    #[must_use]
    pub fn key(course_id: &str, activity_url: &str) -> String {
        format!("{course_id}_{activity_url}")
    }

    /// Key of the last-day reminder ledger.
    #[must_use]
    pub fn last_day_key(course_id: &str, activity_url: &str) -> String {
        format!("{course_id}_{activity_url}_lastday")
    }

    /// Whether `key` has been recorded.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ReminderEntry> {
        self.0.get(key)
    }

    /// Record a delivered reminder. An existing entry is kept.
    pub fn record(&mut self, key: String, entry: ReminderEntry) {
        self.0.entry(key).or_insert(entry);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop entries whose deadline is before `now`; returns how many went.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.0.len();
        self.0.retain(|_, entry| entry.deadline >= now);
        before - self.0.len()
    }
}
