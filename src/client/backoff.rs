//! Reconnect backoff schedule
//!
//! Delay before attempt `n` (0-based) is `base * 2^n`, capped at `max_delay`.
//! Once `max_attempts` reconnects have been scheduled without a successful
//! open in between, the schedule is exhausted.

use serde::Deserialize;
use std::time::Duration;

/// Reconnect tuning
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Attempt counter driven by the close path
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Consume one attempt, returning its delay, or `None` when exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.max_delay_ms, 30_000);
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_delays_double() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay())
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_delays_non_decreasing_and_capped() {
        let policy = ReconnectPolicy {
            base_delay_ms: 700,
            max_delay_ms: 5000,
            max_attempts: 12,
        };
        let mut backoff = Backoff::new(policy.clone());

        let mut last = Duration::ZERO;
        let mut count = 0;
        while let Some(delay) = backoff.next_delay() {
            assert!(delay >= last);
            assert!(delay <= Duration::from_millis(policy.max_delay_ms));
            last = delay;
            count += 1;
        }
        assert_eq!(count, 12);
        assert_eq!(last, Duration::from_millis(5000));
    }

    #[test]
    fn test_exhausted_until_reset() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            base_delay_ms: 10,
            max_delay_ms: 100,
            max_attempts: 2,
        });
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(200), Duration::from_millis(30_000));
    }
}
