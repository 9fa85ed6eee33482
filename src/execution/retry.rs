//! Retry Backoff
//!
//! Delay inserted between attempts after a handler error:
//! `base * 2^(attempt - 1)`, optionally capped. No jitter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default backoff unit.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Exponential backoff settings.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt
    pub base: Duration,
    /// Upper bound on any single delay
    pub max_delay: Option<Duration>,
}

impl BackoffPolicy {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max_delay: None,
        }
    }

    /// Caps every delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Backoff that never waits; handy for tests and dry runs.
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base
            .checked_mul(1u32 << exponent)
            .unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_doubles_from_one_second() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
    }

    #[test]
    fn test_attempt_zero_treated_as_first() {
        assert_eq!(BackoffPolicy::default().delay(0), Duration::from_secs(1));
    }

    #[test]
    fn test_cap() {
        let policy = BackoffPolicy::new(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(300));
        assert_eq!(policy.delay(10), Duration::from_millis(300));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = BackoffPolicy::new(Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.delay(40), Duration::MAX);
    }

    #[test]
    fn test_none() {
        assert_eq!(BackoffPolicy::none().delay(5), Duration::ZERO);
    }
}
