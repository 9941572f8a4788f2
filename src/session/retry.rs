//! Bounded login retry policy.

use std::time::Duration;

/// What to do after a failed login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Relaunch the browsing context after the delay and try again.
    RetryAfter(Duration),
    /// Attempts exhausted; abandon this cycle.
    GiveUp,
}

/// Fixed number of attempts with a constant backoff between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` attempts in total.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Total attempts allowed.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the second relaunch try when the first one fails.
    #[must_use]
    pub fn relaunch_delay(&self) -> Duration {
        self.backoff / 2
    }

    /// Decide after `attempts_made` attempts have failed.
    #[must_use]
    pub fn after_failure(&self, attempts_made: u32) -> RetryDecision {
        if attempts_made >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.backoff)
        }
    }
}
