//! Periodic cycle trigger with quiet hours and overlap suppression.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::GlobalConfig;
use crate::monitor::{CycleReport, Monitor};
use crate::Result;

/// Local time window during which no cycle starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    start: NaiveTime,
    end: NaiveTime,
    offset: FixedOffset,
}

impl QuietHours {
    /// Window `[start, end)` in `offset`; wraps past midnight when
    /// `start > end`.
    #[must_use]
    pub fn new(start: NaiveTime, end: NaiveTime, offset: FixedOffset) -> Self {
        Self { start, end, offset }
    }

    /// Window from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an invalid offset or time of day.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        let (start, end) = config.quiet_hours()?;
        Ok(Self::new(start, end, config.utc_offset()?))
    }

    /// Whether `now` falls in the window.
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset).time();
        if self.start <= self.end {
            local >= self.start && local < self.end
        } else {
            local >= self.start || local < self.end
        }
    }
}

/// What a trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A cycle ran to completion.
    Completed(CycleReport),
    /// A cycle ran and aborted.
    Failed,
    /// Inside quiet hours; nothing ran.
    QuietHours,
    /// A cycle was already running; nothing ran.
    Suppressed,
}

/// Fires monitor cycles; never runs two at once.
pub struct Scheduler {
    monitor: Arc<Mutex<Monitor>>,
    quiet: QuietHours,
    clock: Clock,
}

impl Scheduler {
    /// Scheduler over a shared monitor.
    #[must_use]
    pub fn new(monitor: Arc<Mutex<Monitor>>, quiet: QuietHours, clock: Clock) -> Self {
        Self {
            monitor,
            quiet,
            clock,
        }
    }

    /// Run a cycle unless quiet hours apply or one is already running.
    pub async fn trigger(&self) -> TriggerOutcome {
        if self.quiet.contains((self.clock)()) {
            debug!("quiet hours, skipping cycle");
            return TriggerOutcome::QuietHours;
        }
        let Ok(mut monitor) = self.monitor.try_lock() else {
            info!("previous cycle still running, skipping trigger");
            return TriggerOutcome::Suppressed;
        };
        match monitor.run_cycle().await {
            Ok(report) => TriggerOutcome::Completed(report),
            Err(err) => {
                warn!(%err, "cycle failed");
                TriggerOutcome::Failed
            }
        }
    }

    /// Trigger every `period` until `cancel` fires. The first tick is
    /// immediate; missed ticks are skipped, and a tick that lands while a
    /// cycle is still running is suppressed.
    #[must_use]
    pub fn spawn(self: Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("scheduler shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let scheduler = Arc::clone(&self);
                        tokio::spawn(async move {
                            let outcome = scheduler.trigger().await;
                            debug!(?outcome, "trigger finished");
                        });
                    }
                }
            }
        })
    }
}

/// Close the monitor's browsing context once any running cycle finishes.
///
/// Waits at most `grace` for the cycle; a cycle stuck on an unanswered
/// captcha never releases the monitor. Returns `false` when the wait ran
/// out, in which case the helper is left to `kill_on_drop` at exit.
pub async fn shutdown_monitor(monitor: &Mutex<Monitor>, grace: Duration) -> bool {
    match tokio::time::timeout(grace, monitor.lock()).await {
        Ok(mut monitor) => {
            if let Err(err) = monitor.shutdown().await {
                warn!(%err, "failed to close browsing context");
            }
            true
        }
        Err(_elapsed) => {
            warn!(?grace, "cycle still running at shutdown, abandoning it");
            false
        }
    }
}
