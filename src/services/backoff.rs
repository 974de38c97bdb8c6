//! Capped exponential backoff

use rand::Rng;
use std::time::Duration;

/// Retry schedule for one page of upstream data
///
/// `delay(n) = min(base * 2^n, max)`, with optional symmetric jitter that is
/// clamped back under `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 0.2 means +-20%
    pub jitter_ratio: f64,
    /// Attempts per page, including the first one
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            jitter_ratio: 0.2,
            max_attempts: 6,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0-based), without jitter
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry number `retry` (0-based), jitter applied
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.base_delay_for(retry);
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }

        let spread = delay.as_secs_f64() * self.jitter_ratio;
        let jittered = delay.as_secs_f64() + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64(jittered.max(0.0)).min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
