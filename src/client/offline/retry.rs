//! # Retry Policy
//!
//! Decides what happens to a queue item after a failed delivery.
//!
//! - **Transient failures** (server errors, timeouts, rate limiting) are
//!   retried after `base_delay × attempts`
//! - **Max attempts**: once the budget is spent the item is `Exhausted` and
//!   waits for a manual retry
//! - **Permanent failures** (validation) and **conflicts** (record or job
//!   gone) are `Rejected` straight away and never retried automatically
//!
//! ## Usage
//!
//! ```rust
//! use chrono::Utc;
//! use fieldops::client::offline::retry::{RetryDecision, RetryPolicy};
//! use fieldops::client::remote::DeliveryError;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(Duration::from_secs(5), 3);
//! let now = Utc::now();
//! let decision = policy.decide(1, &DeliveryError::Timeout, now);
//! assert_eq!(decision, RetryDecision::RetryAt(now + chrono::Duration::seconds(5)));
//! ```

use crate::client::remote::DeliveryError;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Whether an error is worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
}

pub fn classify_error(error: &DeliveryError) -> ErrorClass {
    if error.is_retryable() {
        ErrorClass::Retryable
    } else {
        ErrorClass::NonRetryable
    }
}

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same interval every time
    Fixed { interval: Duration },
    /// `base × attempts`
    Linear { base: Duration },
}

impl BackoffStrategy {
    pub fn delay(&self, attempts: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed { interval } => *interval,
            BackoffStrategy::Linear { base } => base.saturating_mul(attempts.max(1)),
        }
    }
}

/// Outcome of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again automatically, not before the given time
    RetryAt(DateTime<Utc>),
    /// Attempt budget spent
    Exhausted,
    /// Server refused the record
    Rejected,
}

/// Retry policy for queue items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: BackoffStrategy,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            backoff: BackoffStrategy::Linear { base: base_delay },
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide after the `attempts`-th failed attempt (counting this one)
    pub fn decide(&self, attempts: u32, error: &DeliveryError, now: DateTime<Utc>) -> RetryDecision {
        if classify_error(error) == ErrorClass::NonRetryable {
            return RetryDecision::Rejected;
        }
        if attempts >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        let delay = chrono::Duration::from_std(self.backoff.delay(attempts))
            .unwrap_or_else(|_| chrono::Duration::days(1));
        RetryDecision::RetryAt(now + delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 3)
    }
}
