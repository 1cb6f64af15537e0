//! Exponential backoff with multiplicative jitter.

use std::time::Duration;
use rand::Rng;

/// Backoff curve shared by every retry policy.
///
/// `wait(n) = min(initial * multiplier^(n-1), max_wait)`, then scaled by a
/// random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max_wait: Duration,
    /// Jitter factor in `[0.0, 1.0]`.
    pub jitter: f64,
}

impl Backoff {
    /// Un-jittered wait after failed attempt `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let initial_ms = self.initial.as_millis() as f64;
        let max_ms = self.max_wait.as_millis() as f64;
        let delay_ms = (initial_ms * self.multiplier.max(1.0).powi(exponent)).min(max_ms);

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Jittered wait after failed attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }

        let spread = rand::thread_rng().gen_range(-jitter..=jitter);
        base.mul_f64(1.0 + spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(jitter: f64) -> Backoff {
        Backoff {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max_wait: Duration::from_millis(2000),
            jitter,
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let b = curve(0.0);
        assert_eq!(b.delay(0), Duration::ZERO);
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(3), Duration::from_millis(400));
        assert_eq!(b.delay(10), Duration::from_millis(2000));
        assert_eq!(b.delay(u32::MAX), Duration::from_millis(2000));
    }

    #[test]
    fn test_base_delay_is_non_decreasing() {
        let b = curve(0.5);
        let mut prev = Duration::ZERO;
        for attempt in 1..40 {
            let d = b.base_delay(attempt);
            assert!(d >= prev, "attempt {attempt}: {d:?} < {prev:?}");
            prev = d;
        }
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let b = curve(0.3);
        for _ in 0..200 {
            let ms = b.delay(2).as_millis();
            assert!((139..=261).contains(&ms), "jittered delay {ms}ms outside band");
        }
    }

    #[test]
    fn test_full_jitter_never_negative() {
        let b = curve(1.0);
        for attempt in 1..10 {
            let d = b.delay(attempt);
            assert!(d <= b.base_delay(attempt) * 2);
        }
    }

    #[test]
    fn test_zero_initial_wait() {
        let b = Backoff {
            initial: Duration::ZERO,
            ..curve(0.5)
        };
        assert_eq!(b.delay(5), Duration::ZERO);
    }
}
