//! Retry backoff policy.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use opshub_core::config::NotifierConfig;

/// Exponential backoff with a cap and randomized jitter.
///
/// The raw delay for attempt `n` is `min(cap, base * 2^n)`; the final delay
/// is the raw delay scaled by a random factor in `[1 - jitter, 1 + jitter]`
/// so that many records failing together do not retry in lockstep.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay in milliseconds.
    base_ms: u64,
    /// Maximum delay in milliseconds.
    cap_ms: u64,
    /// Jitter bound as a fraction of the delay.
    jitter: f64,
}

impl BackoffPolicy {
    /// Create a backoff policy from raw constants.
    pub fn new(base_ms: u64, cap_ms: u64, jitter: f64) -> Self {
        Self {
            base_ms,
            cap_ms,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Create a backoff policy from the notifier configuration.
    pub fn from_config(config: &NotifierConfig) -> Self {
        Self::new(
            config.backoff_base_ms,
            config.backoff_cap_ms,
            config.backoff_jitter,
        )
    }

    /// The raw (un-jittered) delay in milliseconds for a given retry count.
    pub fn delay_ms(&self, retry_count: u32) -> u64 {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.cap_ms)
    }

    /// Compute when the next retry of a record that has failed
    /// `retry_count` times before should run.
    pub fn next_retry_at(&self, retry_count: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let raw = self.delay_ms(retry_count) as f64;
        let scale = if self.jitter > 0.0 {
            1.0 + rand::rng().random_range(-self.jitter..=self.jitter)
        } else {
            1.0
        };
        now + Duration::milliseconds((raw * scale) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let policy = BackoffPolicy::new(1_000, 8_000, 0.0);
        assert_eq!(policy.delay_ms(0), 1_000);
        assert_eq!(policy.delay_ms(1), 2_000);
        assert_eq!(policy.delay_ms(2), 4_000);
        assert_eq!(policy.delay_ms(3), 8_000);
        assert_eq!(policy.delay_ms(4), 8_000);
        assert_eq!(policy.delay_ms(63), 8_000);
    }

    #[test]
    fn test_delay_is_non_decreasing() {
        let policy = BackoffPolicy::new(500, 60_000, 0.0);
        let mut prev = 0;
        for n in 0..32 {
            let d = policy.delay_ms(n);
            assert!(d >= prev);
            prev = d;
        }
    }

    #[test]
    fn test_shift_overflow_saturates_at_cap() {
        let policy = BackoffPolicy::new(1_000, 3_600_000, 0.0);
        assert_eq!(policy.delay_ms(64), 3_600_000);
        assert_eq!(policy.delay_ms(u32::MAX), 3_600_000);
    }

    #[test]
    fn test_next_retry_bounded_by_jitter() {
        let policy = BackoffPolicy::new(10_000, 40_000, 0.2);
        let now = Utc::now();
        for retry_count in 0..6 {
            let at = policy.next_retry_at(retry_count, now);
            let delta_ms = (at - now).num_milliseconds();
            let raw = policy.delay_ms(retry_count) as i64;
            assert!(delta_ms >= raw * 8 / 10, "delta {delta_ms} below jitter floor");
            assert!(delta_ms <= raw * 12 / 10 + 1, "delta {delta_ms} above jitter ceiling");
            assert!(delta_ms <= 40_000 * 12 / 10 + 1);
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = BackoffPolicy::new(2_000, 60_000, 0.0);
        let now = Utc::now();
        let a = policy.next_retry_at(3, now);
        let b = policy.next_retry_at(3, now);
        assert_eq!(a, b);
        assert_eq!((a - now).num_milliseconds(), 16_000);
    }
}
