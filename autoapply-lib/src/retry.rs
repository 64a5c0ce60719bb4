//! Retry policy for transient workflow failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of attempts before a transient failure becomes terminal, 3.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base delay before the first retry, 1 second.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default upper bound on a single backoff delay, 30 seconds.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff policy applied to transient task failures.
///
/// Attempt `k` (1-based) sleeps `base_delay * 2^(k-1)` before the next try,
/// capped at `max_delay`. Only failures classified as transient are
/// retried; policy denials and permanent failures never enter this path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryPolicy {
    /// Total attempts allowed per task (first try included)
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Cap applied to every backoff delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// The backoff delay after failed attempt `attempt` (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1 << exponent);
        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` attempts
    #[must_use]
    pub const fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
