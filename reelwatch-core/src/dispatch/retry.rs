use std::time::Duration;

use rand::Rng;

use crate::settings::RetryConfig;

/// Exponential backoff with jitter, bounded by `backoff_max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u16 {
        self.config.max_attempts.max(1)
    }

    /// Wait before attempt `attempt + 1`, where `attempt` starts at 1. A
    /// channel-provided `floor` is always honoured, even past the cap.
    pub fn delay(&self, attempt: u16, floor: Option<Duration>) -> Duration {
        let base = self.config.backoff_base();
        let exp = attempt.saturating_sub(1).min(16) as u32;
        let raw = base.saturating_mul(1u32 << exp).min(self.config.backoff_max());
        let jittered = self.jitter(raw);
        match floor {
            Some(floor) => jittered.max(floor),
            None => jittered,
        }
    }

    fn jitter(&self, delay: Duration) -> Duration {
        let ratio = self.config.jitter_ratio.clamp(0.0, 1.0) as f64;
        if ratio == 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * ratio;
        let offset = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
    }
}
