//! Course and deadline overview messages, edited in place.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::deadline::{DeadlineInfo, DeadlineTracker};
use crate::messaging::templates::{self, OverviewEntry};
use crate::messaging::{MessagingGateway, OutboundMessage};
use crate::models::course::{course_id_from_url, ActivityKind, CourseRecord};
use crate::models::message::MessageHandle;
use crate::persistence::state::MonitorState;
use crate::{AppError, Result};

use super::Collaborators;

/// Which date of an activity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The activity opens.
    Opened,
    /// The deadline or closing time.
    Due,
}

/// One line of the deadline overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineEvent {
    /// Course title.
    pub course_name: String,
    /// Activity name.
    pub activity_name: String,
    /// Activity type.
    pub kind: ActivityKind,
    /// Parsed date.
    pub info: DeadlineInfo,
    /// Opening or due.
    pub event: EventKind,
}

/// Future openings and not-yet-passed deadlines across `courses`, sorted
/// by days remaining with unreadable dates last.
#[must_use]
pub fn collect_deadline_events<'a>(
    courses: impl IntoIterator<Item = &'a CourseRecord>,
    tracker: &DeadlineTracker,
    now: DateTime<Utc>,
) -> Vec<DeadlineEvent> {
    let mut events = Vec::new();

    for course in courses {
        for (_, activity) in course.deadline_activities() {
            let Some(details) = course.assignments.get(&activity.url) else {
                continue;
            };

            let mut push = |info: DeadlineInfo, event: EventKind| {
                events.push(DeadlineEvent {
                    course_name: course.name.clone(),
                    activity_name: activity.name.clone(),
                    kind: activity.kind.clone(),
                    info,
                    event,
                });
            };

            if let Some(opened) = details.opened.as_ref().and_then(|d| d.known()) {
                let info = tracker.parse(opened, now);
                if info.instant.is_some_and(|instant| instant > now) {
                    push(info, EventKind::Opened);
                }
            }

            if let Some(due) = details.due().and_then(|d| d.known()) {
                let info = tracker.parse(due, now);
                if !info.is_passed() {
                    push(info, EventKind::Due);
                }
            }
        }
    }

    events.sort_by_key(|event| (event.info.days_remaining.is_none(), event.info.days_remaining));
    events
}

/// Overview text of one course. Deadline-bearing activities are listed
/// only once their details are known.
#[must_use]
pub fn course_overview_text(
    course: &CourseRecord,
    tracker: &DeadlineTracker,
    now: DateTime<Utc>,
) -> String {
    let sections: Vec<(&str, Vec<OverviewEntry<'_>>)> = course
        .sections
        .iter()
        .map(|section| {
            let entries = section
                .activities
                .iter()
                .filter(|activity| {
                    !activity.kind.is_deadline_bearing()
                        || course.assignments.contains_key(&activity.url)
                })
                .map(|activity| OverviewEntry {
                    kind: &activity.kind,
                    name: &activity.name,
                    url: &activity.url,
                })
                .collect();
            (section.name.as_str(), entries)
        })
        .collect();

    templates::course_overview(&course.name, &course.url, &sections, &tracker.stamp(now))
}

/// Edit `handle` in place, or send a new message when there is none or it
/// has vanished. Returns the handle to remember, if it changed.
async fn upsert(
    gateway: &dyn MessagingGateway,
    handle: Option<&MessageHandle>,
    text: String,
) -> Result<Option<MessageHandle>> {
    if let Some(handle) = handle {
        match gateway.edit_message(handle, &text).await {
            Ok(()) => return Ok(None),
            Err(AppError::NotFound(reason)) => {
                info!(%reason, "overview message vanished, sending a new one");
            }
            Err(err) => return Err(err),
        }
    }
    let handle = gateway.send_message(OutboundMessage::subscribers(text)).await?;
    Ok(Some(handle))
}

/// Publish the overview of `course_id`.
///
/// Messaging failures are logged; the stored handle is only replaced when a
/// new message was sent.
pub async fn publish_course_overview(
    deps: &Collaborators,
    state: &mut MonitorState,
    course_id: &str,
) {
    let Some(course) = state.courses.get(course_id) else {
        return;
    };
    let text = course_overview_text(course, &deps.tracker, deps.now());

    match upsert(deps.gateway.as_ref(), state.messages.get(course_id), text).await {
        Ok(Some(handle)) => {
            debug!(course_id, message_id = handle.message_id, "course overview sent");
            state.messages.insert(course_id, handle);
        }
        Ok(None) => debug!(course_id, "course overview updated"),
        Err(err) => warn!(course_id, %err, "failed to publish course overview"),
    }
}

/// Publish the cross-course deadline overview.
pub async fn publish_deadline_overview(deps: &Collaborators, state: &mut MonitorState) {
    let now = deps.now();
    let courses = deps
        .config
        .courses
        .iter()
        .filter_map(|url| state.courses.get(&course_id_from_url(url)));
    let events = collect_deadline_events(courses, &deps.tracker, now);
    let text = templates::deadline_overview(&events, &deps.tracker.stamp(now));

    match upsert(deps.gateway.as_ref(), state.deadline_message.as_ref(), text).await {
        Ok(Some(handle)) => {
            debug!(message_id = handle.message_id, "deadline overview sent");
            state.deadline_message = Some(handle);
        }
        Ok(None) => debug!(events = events.len(), "deadline overview updated"),
        Err(err) => warn!(%err, "failed to publish deadline overview"),
    }
}
