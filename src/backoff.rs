//! Reconnect backoff policy.
//!
//! Delay for attempt `n` (1-based) is `min(base * 2^(n-1) + jitter, cap)`,
//! where jitter is drawn uniformly from `0..=max_jitter`.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_jitter: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, cap: Duration, max_jitter: Duration) -> Self {
        Self { base, cap, max_jitter }
    }

    /// Delay for `attempt` with a random jitter sample.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(rand::rng().random_range(0..=max_ms))
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Delay for `attempt` with an explicit jitter (clamped to the max).
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        let exp = self.base.checked_mul(factor).unwrap_or(Duration::MAX);
        exp.saturating_add(jitter.min(self.max_jitter)).min(self.cap)
    }
}

#[cfg(test)]
#[path = "backoff_test.rs"]
mod tests;
