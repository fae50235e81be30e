//! Retry policy for object fetches and block listing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Computes the delay before each retry.
///
/// `max_retries: None` retries forever. Object fetches use a fixed delay
/// (`multiplier == 1.0`); listing backs off exponentially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the first try). `None` = unbounded.
    pub max_retries: Option<u32>,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Maximum delay (caps exponential growth).
    pub max_backoff: Duration,
    /// Multiplier applied to the delay on each retry.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Retry forever with the same delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_retries: None,
            initial_backoff: delay,
            max_backoff: delay,
            multiplier: 1.0,
        }
    }

    /// Retry forever, doubling the delay up to `max`.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            max_retries: None,
            initial_backoff: initial,
            max_backoff: max,
            multiplier: 2.0,
        }
    }

    /// Cap the number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Default policy for object fetches: every 200ms, forever.
    pub fn object_fetch() -> Self {
        Self::fixed(Duration::from_millis(200))
    }

    /// Default policy for listing: 100ms doubling up to 5s, forever.
    pub fn block_listing() -> Self {
        Self::exponential(Duration::from_millis(100), Duration::from_secs(5))
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` once the retries are used up.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let cap_ms = self.max_backoff.as_millis() as f64;
        Some(Duration::from_millis(base_ms.min(cap_ms) as u64))
    }

    /// Returns `true` if another retry is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_retries.map_or(true, |max| attempt <= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::object_fetch()
    }
}
