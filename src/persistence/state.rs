//! In-memory monitor state and its persisted form.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::course::CourseRecord;
use crate::models::message::{MessageHandle, MessageIdentityMap};
use crate::models::reminder::ReminderLedger;
use crate::Result;

use super::document_repo::{
    DocumentRepo, COURSES, DEADLINE_MESSAGE, LAST_DAY_REMINDERS, MESSAGE_IDS, REMINDERS,
};

/// Everything the monitor remembers between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    /// Course records keyed by course id.
    pub courses: BTreeMap<String, CourseRecord>,
    /// Course overview messages.
    pub messages: MessageIdentityMap,
    /// Deadline overview message.
    pub deadline_message: Option<MessageHandle>,
    /// General reminder ledger.
    pub reminders: ReminderLedger,
    /// Last-day reminder ledger.
    pub last_day_reminders: ReminderLedger,
}

impl MonitorState {
    /// Load every document, defaulting missing ones to empty.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any document cannot be read.
    pub async fn load(repo: &DocumentRepo) -> Result<Self> {
        Ok(Self {
            courses: repo.load(COURSES).await?,
            messages: repo.load(MESSAGE_IDS).await?,
            deadline_message: repo.load(DEADLINE_MESSAGE).await?,
            reminders: repo.load(REMINDERS).await?,
            last_day_reminders: repo.load(LAST_DAY_REMINDERS).await?,
        })
    }

    /// Drop expired ledger entries, then rewrite every document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any write fails.
    pub async fn flush(&mut self, repo: &DocumentRepo, now: DateTime<Utc>) -> Result<()> {
        let general = self.reminders.prune_expired(now);
        let last_day = self.last_day_reminders.prune_expired(now);
        if general + last_day > 0 {
            debug!(general, last_day, "expired reminder entries removed");
        }

        repo.save(COURSES, &self.courses).await?;
        repo.save(MESSAGE_IDS, &self.messages).await?;
        repo.save(DEADLINE_MESSAGE, &self.deadline_message).await?;
        repo.save(REMINDERS, &self.reminders).await?;
        repo.save(LAST_DAY_REMINDERS, &self.last_day_reminders)
            .await?;
        Ok(())
    }

    /// Record for `course_id`, created empty on first sighting.
    pub fn course_mut(&mut self, course_id: &str, url: &str) -> &mut CourseRecord {
        self.courses
            .entry(course_id.to_owned())
            .or_insert_with(|| CourseRecord::new(course_id, url))
    }
}
