//! Reconnect backoff policy.

use std::time::Duration;

/// Largest exponent applied to `base_delay`.
pub const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Exponential backoff with a cap and a bounded number of automatic retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before automatic retry number `attempt` (zero-based).
    ///
    /// `min(base_delay * 2^min(attempt, 16), max_delay)`; non-decreasing in
    /// `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Whether another automatic retry is allowed after `attempt` retries.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
