//! Retry policy for failed job executions.
//!
//! The policy is an explicit value object held by the worker pool, so
//! retry behavior is inspectable and testable independently of queue or
//! worker machinery. Delays grow exponentially (`base * multiplier^(n-1)`)
//! up to a cap, with bounded random jitter to avoid thundering-herd
//! resubmission after an upstream outage.

use std::time::Duration;

use rand::{Rng, RngExt};

use crate::error::TaskError;

/// Decision produced by [`RetryPolicy::decide`] after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue the job, delivering it no earlier than `delay` from now.
    Retry {
        /// Backoff delay before the next attempt.
        delay: Duration,
    },
    /// Stop retrying; the job is abandoned permanently.
    Abandon,
}

impl RetryDecision {
    /// Whether the job should be requeued.
    pub fn should_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry { .. })
    }

    /// The backoff delay, when retrying.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            RetryDecision::Retry { delay } => Some(*delay),
            RetryDecision::Abandon => None,
        }
    }

    /// Whether the job is abandoned.
    pub fn is_abandon(&self) -> bool {
        matches!(self, RetryDecision::Abandon)
    }
}

/// Exponential backoff policy with jitter and an attempt budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempt budget; a job failing its `max_attempts`-th attempt is
    /// abandoned.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Growth factor applied per subsequent attempt.
    pub multiplier: f64,
    /// Upper bound on the computed delay.
    pub max_delay: Duration,
    /// Jitter fraction; the final delay is scaled by a factor drawn
    /// uniformly from `[1 - jitter, 1 + jitter]`. Zero disables jitter.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default backoff parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the jitter fraction.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Unjittered backoff delay for attempt `n` (1-based):
    /// `base * multiplier^(n-1)`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }

    /// Decides the fate of a job whose attempt number `attempt` just
    /// failed with `error`, drawing jitter from the thread RNG.
    pub fn decide(&self, attempt: u32, error: &TaskError) -> RetryDecision {
        self.decide_with_rng(attempt, error, &mut rand::rng())
    }

    /// Same as [`decide`](Self::decide) with a caller-supplied RNG, so
    /// jitter bounds can be verified deterministically.
    pub fn decide_with_rng<R: Rng>(
        &self,
        attempt: u32,
        error: &TaskError,
        rng: &mut R,
    ) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Abandon;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Abandon;
        }
        RetryDecision::Retry {
            delay: self.jittered(self.delay_for_attempt(attempt), rng),
        }
    }

    fn jittered<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rng.random_range(1.0 - self.jitter..=1.0 + self.jitter);
        Duration::from_secs_f64((delay.as_secs_f64() * factor).max(0.0))
    }
}
