//! ReconnectPolicy - bounded exponential backoff

use std::time::Duration;

use rand::Rng;

use crate::config::FeedConfig;

/// Pure backoff computation from a zero-based retry count
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
    /// Symmetric jitter fraction, 0.0..=1.0
    pub jitter: f64,
    pub enable_fallback: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            multiplier: config.backoff_multiplier.max(1.0),
            max_attempts: config.max_reconnect_attempts,
            jitter: if config.jitter.is_finite() {
                config.jitter.clamp(0.0, 1.0)
            } else {
                0.0
            },
            enable_fallback: config.enable_fallback,
        }
    }

    /// Delay before retry number `retry`, without jitter
    ///
    /// `min(initial * multiplier^retry, max)`. Retry 0 waits `initial_delay`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exponent = retry.min(i32::MAX as u32) as i32;
        let raw = initial_ms * self.multiplier.powi(exponent);

        // powi overflows to inf for large retries; min() keeps it bounded
        let capped = if raw.is_finite() { raw.min(max_ms) } else { max_ms };
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Delay before retry number `retry`, with jitter applied
    ///
    /// Never exceeds `max_delay`.
    pub fn next_delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter <= 0.0 {
            return base;
        }

        let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        let jittered = (base.as_millis() as f64 * factor).max(0.0);
        Duration::from_millis(jittered as u64).min(self.max_delay)
    }

    /// All attempts used up
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// All attempts used up and polling is allowed
    pub fn should_fallback(&self, attempts: u32) -> bool {
        self.enable_fallback && self.exhausted(attempts)
    }
}
