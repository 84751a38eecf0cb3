//! Retry policy for transient connection failures.
//!
//! Backoff is strictly exponential with factor 2 and no jitter: attempt `n`
//! sleeps `base_delay * 2^n`. Only disconnection-class failures are retried;
//! everything else propagates on first occurrence (see
//! [`PoolManager::execute_with_retry`](crate::manager::PoolManager::execute_with_retry)).

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Retry policy for session-scoped operations.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RetryPolicy {
    /// Maximum number of attempts
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit attempts and base delay.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay after a failed attempt: `base_delay * 2^attempt`.
    ///
    /// Saturates rather than overflowing for very large attempt numbers.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Upper bound on cumulative sleep across all attempts:
    /// `base_delay * (2^max_retries - 1)`.
    #[must_use]
    pub fn max_total_delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.max_retries).saturating_sub(1);
        self.base_delay.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
    }

    #[test_case(0 => 100; "first attempt")]
    #[test_case(1 => 200; "second attempt")]
    #[test_case(2 => 400; "third attempt")]
    #[test_case(5 => 3200; "deep attempt")]
    fn backoff_doubles(attempt: u32) -> u128 {
        RetryPolicy::default().backoff_delay(attempt).as_millis()
    }

    #[test]
    fn cumulative_delay_is_bounded() {
        let policy = RetryPolicy::default();
        let total: Duration = (0..policy.max_retries)
            .map(|attempt| policy.backoff_delay(attempt))
            .sum();
        assert_eq!(total, policy.max_total_delay());
        assert_eq!(total, Duration::from_millis(700));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
        // Must not panic; the exact value is irrelevant.
        let _ = policy.backoff_delay(u32::MAX);
        let _ = policy.max_total_delay();
    }
}
