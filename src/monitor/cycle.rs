//! One pass over every configured course.

use std::time::Duration;

use tracing::{error, info, info_span, warn, Instrument};

use crate::extract::fetch_details;
use crate::messaging::templates;
use crate::messaging::OutboundMessage;
use crate::models::course::{course_id_from_url, CourseSnapshot};
use crate::models::session::SessionState;
use crate::{AppError, Result};

use super::detector::detect;
use super::overview::{publish_course_overview, publish_deadline_overview};
use super::pruner::prune_course;
use super::reconciler::{apply_update, notify_new};
use super::reminders::send_due_reminders;
use super::Monitor;

/// Summary of a finished cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Courses reconciled.
    pub checked: usize,
    /// Courses abandoned after an error.
    pub failed: usize,
    /// Courses abandoned at the timeout.
    pub timed_out: usize,
    /// New-activity notices sent.
    pub new_notices: usize,
    /// Update notices sent.
    pub update_notices: usize,
    /// Last-day reminders sent.
    pub reminders: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct CourseOutcome {
    new_notices: usize,
    update_notices: usize,
}

impl Monitor {
    /// Run one cycle. Any error that aborts it is also reported to the
    /// admin chat.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LoginFailed` when no session could be established
    /// and `AppError::Db` when state cannot be persisted.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let span = info_span!("cycle", courses = self.deps.config.courses.len());
        async move {
            match self.cycle().await {
                Ok(report) => {
                    info!(?report, "cycle complete");
                    Ok(report)
                }
                Err(err) => {
                    error!(%err, "cycle aborted");
                    let alert = OutboundMessage::admin(templates::cycle_failure(&err.to_string()));
                    if let Err(send_err) = self.deps.gateway.send_message(alert).await {
                        warn!(%send_err, "failed to send cycle failure alert");
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn cycle(&mut self) -> Result<CycleReport> {
        let probe = self
            .deps
            .config
            .probe_url()
            .map(str::to_owned)
            .ok_or_else(|| AppError::Config("no courses configured".into()))?;
        self.session.ensure_authenticated(&probe).await?;

        let mut report = CycleReport::default();
        let limit = Duration::from_secs(self.deps.config.schedule.course_timeout_seconds);
        let courses = self.deps.config.courses.clone();

        for url in &courses {
            let course_id = course_id_from_url(url);

            if let Err(err) = self.ensure_ready().await {
                warn!(course_id = %course_id, %err, "no usable session, skipping course");
                report.failed += 1;
                continue;
            }

            let span = info_span!("course", course_id = %course_id);
            match tokio::time::timeout(limit, self.check_course(&course_id, url).instrument(span))
                .await
            {
                Err(_elapsed) => {
                    warn!(course_id = %course_id, ?limit, "course check timed out");
                    report.timed_out += 1;
                }
                Ok(Ok(outcome)) => {
                    report.checked += 1;
                    report.new_notices += outcome.new_notices;
                    report.update_notices += outcome.update_notices;
                }
                Ok(Err(err @ AppError::Db(_))) => return Err(err),
                Ok(Err(err)) if err.is_transient() => {
                    warn!(course_id = %course_id, %err, "browsing context failed, recovering");
                    report.failed += 1;
                    if let Err(recover_err) = self.session.recover().await {
                        warn!(%recover_err, "recovery failed");
                    }
                }
                Ok(Err(err)) => {
                    warn!(course_id = %course_id, %err, "course check failed");
                    report.failed += 1;
                }
            }
        }

        if let Err(err) = self.deps.browser.clear_cache().await {
            warn!(%err, "failed to clear browser cache");
        }

        publish_deadline_overview(&self.deps, &mut self.state).await;
        report.reminders = send_due_reminders(&self.deps, &mut self.state).await?;
        self.deps.flush(&mut self.state).await?;
        Ok(report)
    }

    /// Healthy context and an authenticated session before each course.
    async fn ensure_ready(&mut self) -> Result<()> {
        self.session.ensure_healthy().await?;
        if self.session.state() != SessionState::Authenticated {
            self.session.login().await?;
        }
        Ok(())
    }

    async fn extract(&mut self, url: &str) -> Result<CourseSnapshot> {
        match self.deps.extractor.extract_sections(url).await {
            Err(AppError::LoginRequired(reason)) => {
                info!(%reason, "session expired during extraction, logging in again");
                self.session.login().await?;
                self.deps.extractor.extract_sections(url).await
            }
            other => other,
        }
    }

    async fn check_course(&mut self, course_id: &str, url: &str) -> Result<CourseOutcome> {
        let snapshot = match self.extract(url).await {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_transient() || matches!(err, AppError::LoginFailed(_)) => {
                return Err(err);
            }
            Err(err) => {
                warn!(%err, "extraction failed, keeping stored state");
                if self.state.courses.contains_key(course_id) {
                    publish_course_overview(&self.deps, &mut self.state, course_id).await;
                    self.deps.flush(&mut self.state).await?;
                }
                return Err(err);
            }
        };

        {
            let record = self.state.course_mut(course_id, url);
            if !snapshot.name.is_empty() {
                record.name.clone_from(&snapshot.name);
            }
            url.clone_into(&mut record.url);
        }

        self.backfill(course_id).await?;

        let changes = match self.state.courses.get(course_id) {
            Some(record) => detect(&record.sections, &snapshot.sections, &record.assignments),
            None => return Ok(CourseOutcome::default()),
        };
        info!(
            new = changes.new_items.len(),
            updated = changes.updated_items.len(),
            "changes detected"
        );

        let mut outcome = CourseOutcome::default();
        for item in &changes.updated_items {
            if apply_update(&self.deps, &mut self.state, course_id, item).await? {
                outcome.update_notices += 1;
            }
        }
        for item in &changes.new_items {
            if notify_new(&self.deps, &mut self.state, course_id, item).await? {
                outcome.new_notices += 1;
            }
        }

        let now = self.deps.now();
        if let Some(record) = self.state.courses.get_mut(course_id) {
            record.sections = snapshot.sections;
            record.last_checked = Some(now);
        }
        publish_course_overview(&self.deps, &mut self.state, course_id).await;

        if let Some(record) = self.state.courses.get_mut(course_id) {
            let pruned = prune_course(record, &self.deps.tracker, now);
            if !pruned.is_empty() {
                info!(?pruned, "expired course state pruned");
            }
        }
        self.deps.flush(&mut self.state).await?;
        Ok(outcome)
    }

    /// Refetch stored details whose dates are missing or unreadable. Only
    /// successful fetches replace what is stored.
    async fn backfill(&mut self, course_id: &str) -> Result<()> {
        let targets: Vec<_> = match self.state.courses.get(course_id) {
            Some(record) => record
                .deadline_activities()
                .filter(|(_, activity)| {
                    record
                        .assignments
                        .get(&activity.url)
                        .is_some_and(|details| details.needs_backfill())
                })
                .map(|(_, activity)| activity.clone())
                .collect(),
            None => return Ok(()),
        };

        let mut filled = 0_usize;
        for activity in targets {
            let details =
                fetch_details(self.deps.extractor.as_ref(), &activity.kind, &activity.url).await?;
            if !details.fetch_succeeded {
                continue;
            }
            if let Some(record) = self.state.courses.get_mut(course_id) {
                record.assignments.insert(activity.url.clone(), details);
                filled += 1;
            }
        }

        if filled > 0 {
            info!(filled, "backfilled activity details");
            self.deps.flush(&mut self.state).await?;
        }
        Ok(())
    }
}
