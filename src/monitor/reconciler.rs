//! Decides which notices a change produces and guards them with ledgers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::deadline::{DeadlineInfo, DeadlineTracker};
use crate::extract::fetch_details;
use crate::messaging::templates::{self, NewActivityNotice};
use crate::messaging::OutboundMessage;
use crate::models::course::{
    ActivityKind, AssignmentDetails, Attachment, DateText, NotificationRecord,
};
use crate::models::reminder::{ReminderEntry, ReminderLedger};
use crate::persistence::state::MonitorState;
use crate::Result;

use super::detector::{NewItem, UpdatedItem};
use super::files::deliver_file;
use super::Collaborators;

/// Old and new value of a changed date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateDelta {
    /// Previous date, if there was one.
    pub old: Option<DeadlineInfo>,
    /// Current date, if there is one.
    pub new: Option<DeadlineInfo>,
}

/// Reportable differences between stored and fresh details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateDelta {
    /// Opening date changed.
    pub opened: Option<DateDelta>,
    /// Deadline or closing time changed.
    pub due: Option<DateDelta>,
    /// Attachments that appeared, by URL order.
    pub added: Vec<Attachment>,
    /// Attachments that disappeared, by URL order.
    pub removed: Vec<Attachment>,
}

impl UpdateDelta {
    /// Whether the delta warrants a message.
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        self.opened.is_some()
            || self.due.is_some()
            || !self.added.is_empty()
            || !self.removed.is_empty()
    }
}

fn date_delta(
    old: Option<&DateText>,
    new: Option<&DateText>,
    tracker: &DeadlineTracker,
    now: DateTime<Utc>,
) -> Option<DateDelta> {
    if old == new {
        return None;
    }
    Some(DateDelta {
        old: old.map(|d| tracker.parse_text(d, now)),
        new: new.map(|d| tracker.parse_text(d, now)),
    })
}

fn attachments_missing_from(from: &[Attachment], other: &[Attachment]) -> Vec<Attachment> {
    let urls: BTreeSet<&str> = other.iter().map(|a| a.url.as_str()).collect();
    let mut missing: Vec<Attachment> = from
        .iter()
        .filter(|a| !urls.contains(a.url.as_str()))
        .cloned()
        .collect();
    missing.sort_by(|a, b| a.url.cmp(&b.url));
    missing.dedup_by(|a, b| a.url == b.url);
    missing
}

/// Compare stored and freshly fetched details of one activity.
///
/// A due-date change between two already-passed dates is not reported.
/// Attachments are compared for assignments only, and a fetch that lost
/// every attachment does not report them as removed.
#[must_use]
pub fn compute_delta(
    kind: &ActivityKind,
    old: &AssignmentDetails,
    new: &AssignmentDetails,
    tracker: &DeadlineTracker,
    now: DateTime<Utc>,
) -> UpdateDelta {
    let opened = date_delta(old.opened.as_ref(), new.opened.as_ref(), tracker, now);

    let due = date_delta(old.due(), new.due(), tracker, now).filter(|delta| {
        let passed = |info: Option<&DeadlineInfo>| info.is_some_and(DeadlineInfo::is_passed);
        !(passed(delta.old.as_ref()) && passed(delta.new.as_ref()))
    });

    let (added, removed) = if matches!(kind, ActivityKind::Assignment) {
        let added = attachments_missing_from(&new.attachments, &old.attachments);
        let removed = if new.attachments.is_empty() && !old.attachments.is_empty() {
            Vec::new()
        } else {
            attachments_missing_from(&old.attachments, &new.attachments)
        };
        (added, removed)
    } else {
        (Vec::new(), Vec::new())
    };

    UpdateDelta {
        opened,
        due,
        added,
        removed,
    }
}

fn course_name(state: &MonitorState, course_id: &str) -> String {
    state
        .courses
        .get(course_id)
        .map(|course| course.name.clone())
        .unwrap_or_default()
}

fn store_details(state: &mut MonitorState, course_id: &str, url: &str, details: AssignmentDetails) {
    if let Some(course) = state.courses.get_mut(course_id) {
        course.assignments.insert(url.to_owned(), details);
    }
}

/// Handle a newly listed activity.
///
/// Returns whether a notice went out.
///
/// # Errors
///
/// Returns transient extraction errors and `AppError::Db` on flush
/// failure. Messaging failures are logged.
pub async fn notify_new(
    deps: &Collaborators,
    state: &mut MonitorState,
    course_id: &str,
    item: &NewItem,
) -> Result<bool> {
    let activity = &item.activity;
    if !activity.kind.is_deadline_bearing() {
        return Ok(false);
    }
    let already = state
        .courses
        .get(course_id)
        .is_some_and(|course| course.sent_notifications.contains_key(&activity.url));
    if already {
        debug!(activity_url = %activity.url, "new activity already announced");
        return Ok(false);
    }

    let span = info_span!("notify_new", course_id, activity_url = %activity.url);
    async move {
        let details = fetch_details(deps.extractor.as_ref(), &activity.kind, &activity.url).await?;
        let now = deps.now();
        let course = course_name(state, course_id);

        if !details.fetch_succeeded {
            let text = templates::reduced_new_activity(
                &activity.kind,
                &course,
                &item.section,
                &activity.name,
            );
            let sent = send(deps, text, &activity.kind, &activity.url).await;
            // The placeholder's unknown dates get it backfilled next cycle.
            store_details(state, course_id, &activity.url, details);
            if sent {
                record_notification(deps, state, course_id, &activity.url, &activity.name).await?;
            } else {
                deps.flush(state).await?;
            }
            return Ok(sent);
        }

        let opened = details
            .opened
            .as_ref()
            .map(|d| deps.tracker.parse_text(d, now));
        let due = details.due().map(|d| deps.tracker.parse_text(d, now));

        if due.as_ref().is_some_and(DeadlineInfo::is_passed) {
            info!("new activity already past its deadline, storing silently");
            store_details(state, course_id, &activity.url, details);
            deps.flush(state).await?;
            return Ok(false);
        }

        let quiz = matches!(activity.kind, ActivityKind::Quiz);
        let last_day = !quiz && due.as_ref().is_some_and(|d| d.days_remaining == Some(0));
        let text = templates::new_activity(&NewActivityNotice {
            kind: &activity.kind,
            course: &course,
            section: &item.section,
            name: &activity.name,
            opened: opened.as_ref(),
            due: due.as_ref(),
            attachments: &details.attachments,
        });

        let sent = send(deps, text, &activity.kind, &activity.url).await;
        let attachments = details.attachments.clone();
        store_details(state, course_id, &activity.url, details);

        if !sent {
            deps.flush(state).await?;
            return Ok(false);
        }

        if last_day {
            if let Some(deadline) = due.as_ref().and_then(|d| d.instant).filter(|i| *i > now) {
                state.last_day_reminders.record(
                    ReminderLedger::last_day_key(course_id, &activity.url),
                    ReminderEntry {
                        sent_at: now,
                        deadline,
                        course_name: course,
                        activity_name: activity.name.clone(),
                    },
                );
            }
        }
        record_notification(deps, state, course_id, &activity.url, &activity.name).await?;

        if !last_day && matches!(activity.kind, ActivityKind::Assignment) {
            for attachment in &attachments {
                deliver_file(deps, state, course_id, attachment).await?;
            }
        }
        Ok(true)
    }
    .instrument(span)
    .await
}

/// Handle a known activity whose details may have changed.
///
/// Returns whether an update notice went out.
///
/// # Errors
///
/// Returns transient extraction errors and `AppError::Db` on flush
/// failure.
pub async fn apply_update(
    deps: &Collaborators,
    state: &mut MonitorState,
    course_id: &str,
    item: &UpdatedItem,
) -> Result<bool> {
    let activity = &item.activity;
    let span = info_span!("apply_update", course_id, activity_url = %activity.url);
    async move {
        let details = fetch_details(deps.extractor.as_ref(), &activity.kind, &activity.url).await?;
        if !details.fetch_succeeded {
            debug!("details unavailable, keeping stored state");
            return Ok(false);
        }
        let now = deps.now();

        let passed = details
            .due()
            .and_then(DateText::known)
            .is_some_and(|due| deps.tracker.is_expired(due, now));
        if passed {
            store_details(state, course_id, &activity.url, details);
            deps.flush(state).await?;
            return Ok(false);
        }

        let delta = compute_delta(&activity.kind, &item.old_details, &details, &deps.tracker, now);
        store_details(state, course_id, &activity.url, details);

        if !delta.is_reportable() {
            deps.flush(state).await?;
            return Ok(false);
        }

        let course = course_name(state, course_id);
        let text = templates::activity_update(&activity.kind, &course, &activity.name, &delta);
        let url = &activity.url;
        let message = OutboundMessage::subscribers(text)
            .with_button(templates::view_update_button(&activity.kind), url.clone());
        let sent = match deps.gateway.send_message(message).await {
            Ok(_) => {
                info!(
                    added = delta.added.len(),
                    removed = delta.removed.len(),
                    "update notice sent"
                );
                true
            }
            Err(err) => {
                warn!(%err, "failed to send update notice");
                false
            }
        };
        deps.flush(state).await?;

        for attachment in &delta.added {
            deliver_file(deps, state, course_id, attachment).await?;
        }
        Ok(sent)
    }
    .instrument(span)
    .await
}

async fn send(deps: &Collaborators, text: String, kind: &ActivityKind, url: &str) -> bool {
    let message = OutboundMessage::subscribers(text).with_button(templates::view_button(kind), url);
    match deps.gateway.send_message(message).await {
        Ok(handle) => {
            info!(message_id = handle.message_id, "new activity notice sent");
            true
        }
        Err(err) => {
            warn!(%err, "failed to send new activity notice");
            false
        }
    }
}

async fn record_notification(
    deps: &Collaborators,
    state: &mut MonitorState,
    course_id: &str,
    url: &str,
    name: &str,
) -> Result<()> {
    let now = deps.now();
    if let Some(course) = state.courses.get_mut(course_id) {
        course
            .sent_notifications
            .entry(url.to_owned())
            .or_insert_with(|| NotificationRecord {
                sent: true,
                sent_at: now,
                activity_name: name.to_owned(),
            });
    }
    deps.flush(state).await
}
