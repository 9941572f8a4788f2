//! Last-day reminders.
//!
//! Each deadline-bearing activity gets at most one reminder, sent once its
//! deadline is within the next 24 hours and never after it has passed.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::deadline::DeadlineTracker;
use crate::extract::fetch_details;
use crate::messaging::templates;
use crate::messaging::OutboundMessage;
use crate::models::course::{ActivityRef, DateText};
use crate::models::reminder::{ReminderEntry, ReminderLedger};
use crate::persistence::state::MonitorState;
use crate::Result;

use super::Collaborators;

/// Whether `remaining` falls in the `(0h, 24h]` last-day window.
#[must_use]
pub fn in_last_day_window(remaining: Duration) -> bool {
    remaining > Duration::zero() && remaining <= Duration::hours(24)
}

struct Candidate {
    course_id: String,
    course_name: String,
    section: String,
    activity: ActivityRef,
}

/// Activities that may still need a reminder: stored details whose due
/// date has not passed, with no ledger entry yet.
fn candidates(
    state: &MonitorState,
    tracker: &DeadlineTracker,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (course_id, course) in &state.courses {
        for (section, activity) in course.deadline_activities() {
            let Some(details) = course.assignments.get(&activity.url) else {
                continue;
            };
            let expired = details
                .due()
                .and_then(DateText::known)
                .is_some_and(|due| tracker.is_expired(due, now));
            if expired {
                continue;
            }
            if state
                .reminders
                .contains(&ReminderLedger::key(course_id, &activity.url))
            {
                continue;
            }
            if state
                .last_day_reminders
                .contains(&ReminderLedger::last_day_key(course_id, &activity.url))
            {
                continue;
            }
            out.push(Candidate {
                course_id: course_id.clone(),
                course_name: course.name.clone(),
                section: section.to_owned(),
                activity: activity.clone(),
            });
        }
    }
    out
}

/// Send due last-day reminders. Returns how many went out.
///
/// A broken browsing context stops the pass; it is picked up again next
/// cycle.
///
/// # Errors
///
/// Returns `AppError::Db` if recording a reminder fails.
pub async fn send_due_reminders(deps: &Collaborators, state: &mut MonitorState) -> Result<usize> {
    let mut sent = 0;

    for candidate in candidates(state, &deps.tracker, deps.now()) {
        let activity = &candidate.activity;
        let details =
            match fetch_details(deps.extractor.as_ref(), &activity.kind, &activity.url).await {
                Ok(details) => details,
                Err(err) => {
                    warn!(activity_url = %activity.url, %err, "reminder pass interrupted");
                    break;
                }
            };
        if !details.fetch_succeeded {
            continue;
        }

        let now = deps.now();
        let Some(due_text) = details.due().and_then(DateText::known) else {
            continue;
        };
        let Some(instant) = deps.tracker.instant(due_text) else {
            continue;
        };
        let remaining = DeadlineTracker::time_remaining(instant, now);
        if !in_last_day_window(remaining) {
            debug!(
                activity_url = %activity.url,
                hours = DeadlineTracker::hours_remaining(instant, now),
                "outside last-day window"
            );
            continue;
        }

        let due = deps.tracker.parse(due_text, now);
        let text = templates::last_day_reminder(
            &activity.kind,
            &candidate.course_name,
            &candidate.section,
            &activity.name,
            &due,
            remaining,
        );
        let message = OutboundMessage::subscribers(text)
            .with_button(templates::view_button(&activity.kind), activity.url.clone());
        if let Err(err) = deps.gateway.send_message(message).await {
            warn!(activity_url = %activity.url, %err, "failed to send reminder");
            continue;
        }

        let entry = ReminderEntry {
            sent_at: now,
            deadline: instant,
            course_name: candidate.course_name.clone(),
            activity_name: activity.name.clone(),
        };
        state.reminders.record(
            ReminderLedger::key(&candidate.course_id, &activity.url),
            entry.clone(),
        );
        state.last_day_reminders.record(
            ReminderLedger::last_day_key(&candidate.course_id, &activity.url),
            entry,
        );
        deps.flush(state).await?;
        info!(
            course_id = %candidate.course_id,
            activity_url = %activity.url,
            "last-day reminder sent"
        );
        sent += 1;
    }

    Ok(sent)
}
