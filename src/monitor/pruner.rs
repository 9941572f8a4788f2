//! Garbage collection of expired course state.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::deadline::DeadlineTracker;
use crate::models::course::CourseRecord;

/// What a prune pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Expired assignments dropped.
    pub assignments: usize,
    /// Notification records dropped with them.
    pub notifications: usize,
    /// File records no longer reachable from a live assignment.
    pub files: usize,
}

impl PruneReport {
    /// Whether anything was removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments + self.notifications + self.files == 0
    }
}

/// Drop expired assignments, their notification records, and orphaned file
/// records from `course`.
pub fn prune_course(
    course: &mut CourseRecord,
    tracker: &DeadlineTracker,
    now: DateTime<Utc>,
) -> PruneReport {
    let expired: Vec<String> = course
        .assignments
        .iter()
        .filter(|(_, details)| {
            details
                .due()
                .and_then(|due| due.known())
                .is_some_and(|due| tracker.is_expired(due, now))
        })
        .map(|(url, _)| url.clone())
        .collect();

    let mut report = PruneReport::default();
    for url in &expired {
        if course.assignments.remove(url).is_some() {
            report.assignments += 1;
        }
        if course.sent_notifications.remove(url).is_some() {
            report.notifications += 1;
        }
    }

    let live: BTreeSet<&str> = course
        .assignments
        .values()
        .flat_map(|details| details.attachments.iter().map(|a| a.url.as_str()))
        .collect();
    let before = course.sent_files.len();
    course.sent_files.retain(|url, _| live.contains(url.as_str()));
    report.files = before - course.sent_files.len();

    report
}
