//! Exponential backoff and retryability for webhook delivery.

use std::time::Duration;

use crate::types::check::RetryPolicy;

/// Computes backoff delays and retry decisions from a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    policy: RetryPolicy,
}

impl RetryStrategy {
    /// Build a strategy, filling zeroed policy fields with defaults.
    pub fn new(mut policy: RetryPolicy) -> Self {
        policy.fill_defaults();
        Self { policy }
    }

    /// Maximum number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Backoff before the attempt after `attempt` (1-based):
    /// `min(initial · multiplier^(attempt-1), max)`. `delay(0)` is zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = self.policy.multiplier.powi(attempt as i32 - 1);
        let delay_ms = (self.policy.initial_delay_ms as f64 * exp)
            .min(self.policy.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Whether attempt `attempt` (1-based) warrants another try.
    /// `status_code` of `None` means the request failed at the transport
    /// level, which is always retryable until attempts run out.
    pub fn should_retry(&self, attempt: u32, status_code: Option<u16>) -> bool {
        if attempt >= self.policy.max_attempts {
            return false;
        }
        let Some(status) = status_code else {
            return true;
        };
        if (500..600).contains(&status) {
            return true;
        }
        if status == 429 {
            return true;
        }
        if (400..500).contains(&status) {
            return false;
        }
        status >= 300
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
