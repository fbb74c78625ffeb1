//! Retry policy for rate-limited portal calls.

use std::time::Duration;

use rand::Rng;

/// Capped exponential backoff with multiplicative jitter.
///
/// The delay before retry `n` (1-based) is
/// `min(base_delay * multiplier^(n-1), max_delay)`, scaled by a random factor
/// in `[1 - jitter, 1 + jitter]` and capped at `max_delay` again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Fraction in `[0, 1]`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before retry `retry` without jitter.
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry `retry`, jittered with `rng`.
    pub fn delay_with<R: Rng>(&self, retry: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(retry);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter <= f64::EPSILON {
            return nominal;
        }
        let factor = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
        nominal.mul_f64(factor).min(self.max_delay)
    }

    pub fn delay(&self, retry: u32) -> Duration {
        self.delay_with(retry, &mut rand::thread_rng())
    }
}
