//! Retry policy, budget, and backoff

use std::{collections::BTreeSet, time::Duration};

use crate::response::ResponseRecord;

/// Retry budget used when nothing else is configured
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

/// Decides whether a completed response should be resent
///
/// Pure function of the response. The pipeline additionally requires budget
/// to remain before it resends.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, response: &ResponseRecord) -> bool;
}

/// Default policy; retry is opt-in
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn should_retry(&self, _response: &ResponseRecord) -> bool {
        false
    }
}

/// Retry when the raw status code is in a fixed set
#[derive(Debug, Clone, Default)]
pub struct RetryOnStatus {
    codes: BTreeSet<u16>,
}

impl RetryOnStatus {
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
        }
    }

    /// 429 plus the 5xx codes a gateway usually answers with
    pub fn transient() -> Self {
        Self::new([429, 500, 502, 503, 504])
    }
}

impl RetryPolicy for RetryOnStatus {
    fn should_retry(&self, response: &ResponseRecord) -> bool {
        self.codes.contains(&response.status())
    }
}

impl<F> RetryPolicy for F
where
    F: Fn(&ResponseRecord) -> bool + Send + Sync,
{
    fn should_retry(&self, response: &ResponseRecord) -> bool {
        self(response)
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum resend attempts per logical call
    pub budget: u32,
    /// Delay before the first resend; zero resends immediately
    pub initial_delay: Duration,
    /// Maximum delay between resends
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_RETRY_BUDGET,
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let delay = Duration::from_millis(delay_ms as u64);
        std::cmp::min(delay, self.max_delay)
    }
}

/// Per-call retry bookkeeping
///
/// The remaining counter only goes down. Once it reaches zero no further
/// resends happen regardless of what the policy says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    remaining: u32,
    attempts: u32,
    in_progress: bool,
}

impl RetryState {
    pub fn new(budget: u32) -> Self {
        Self {
            remaining: budget,
            attempts: 0,
            in_progress: false,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Resends performed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Spend one unit of budget; false when exhausted
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.attempts += 1;
        self.in_progress = true;
        true
    }

    /// Mark the logical call as finished
    pub fn finish(&mut self) {
        self.in_progress = false;
    }
}
