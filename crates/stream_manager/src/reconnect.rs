//! Reconnect backoff
//!
//! Exponential delay `min(initial * multiplier^(attempt-1), max)` with full
//! jitter: the actual wait is uniform in `[0, delay]`.

use std::time::Duration;

use contracts::ReconnectPolicy;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    jitter: bool,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            jitter: true,
        }
    }

    /// Deterministic delays, for tests
    pub fn without_jitter(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            jitter: false,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Whether attempt `attempt` (1-based) is still allowed
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.policy.max_attempts
    }

    /// Upper bound of the wait before attempt `attempt`
    pub fn ceiling_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let raw = self.policy.initial_delay_ms as f64 * self.policy.multiplier.max(1.0).powi(exponent);
        let capped = raw.min(self.policy.max_delay_ms as f64);
        if capped.is_finite() {
            capped as u64
        } else {
            self.policy.max_delay_ms
        }
    }

    /// Wait before attempt `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling_ms(attempt);
        let ms = if self.jitter && ceiling > 0 {
            rand::rng().random_range(0..=ceiling)
        } else {
            ceiling
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            max_attempts: 5,
        }
    }

    #[test]
    fn test_exponential_growth_capped() {
        let backoff = Backoff::without_jitter(policy());
        let delays: Vec<u64> = (1..=6).map(|n| backoff.ceiling_ms(n)).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_within_ceiling() {
        let backoff = Backoff::new(policy());
        for attempt in 1..=5 {
            let delay = backoff.delay(attempt).as_millis() as u64;
            assert!(delay <= backoff.ceiling_ms(attempt));
        }
    }

    #[test]
    fn test_attempt_limit() {
        let backoff = Backoff::new(policy());
        assert!(!backoff.allows(0));
        assert!(backoff.allows(1));
        assert!(backoff.allows(5));
        assert!(!backoff.allows(6));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let backoff = Backoff::without_jitter(policy());
        assert_eq!(backoff.ceiling_ms(u32::MAX), 1_000);
    }
}
