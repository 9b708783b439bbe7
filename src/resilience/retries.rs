//! Bounded retry bookkeeping for epoch launches.
//!
//! # Responsibilities
//! - Count consecutive failed launches of the desired configuration
//! - Hand out the next backoff delay while budget remains
//! - Invalidate a pending retry when the desired configuration changes
//!
//! # Design Decisions
//! - The budget resets on a new desired config and on a successful start
//! - Pending retries carry a generation so stale timers are ignored

use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Static retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`; the timer must report back `generation`.
    Retry {
        attempt: u32,
        delay: Duration,
        generation: u64,
    },
    /// A retry is already armed; this failure rides on it.
    Scheduled,
    /// No budget left.
    Exhausted,
}

/// Mutable retry state owned by the restart agent's loop.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
    generation: u64,
    pending: Option<u64>,
    abandoned: bool,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            generation: 0,
            pending: None,
            abandoned: false,
        }
    }

    /// Restore the full budget and drop any pending retry.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.abandoned = false;
        self.cancel();
    }

    /// Drop any pending retry without touching the budget.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.pending = None;
    }

    /// Record a failed launch and decide what to do next.
    ///
    /// A failure while a retry is armed counts nothing: the pending
    /// relaunch already covers it.
    pub fn record_failure(&mut self) -> RetryDecision {
        if self.pending.is_some() {
            return RetryDecision::Scheduled;
        }
        if self.attempts >= self.policy.max_retries {
            self.cancel();
            return RetryDecision::Exhausted;
        }

        self.attempts += 1;
        self.generation += 1;
        self.pending = Some(self.generation);

        RetryDecision::Retry {
            attempt: self.attempts,
            delay: calculate_backoff(
                self.attempts,
                self.policy.initial_interval,
                self.policy.max_interval,
            ),
            generation: self.generation,
        }
    }

    /// A retry timer fired. Returns false when the timer is stale.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.pending == Some(generation) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Stop retrying the current desired config until a new one arrives.
    pub fn abandon(&mut self) {
        self.abandoned = true;
        self.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// True when launches must wait (timer armed or config abandoned).
    pub fn is_blocked(&self) -> bool {
        self.pending.is_some() || self.abandoned
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
