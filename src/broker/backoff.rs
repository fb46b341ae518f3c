use crate::config::RedeliveryBackoffConfig;
use std::time::Duration;

/// Exponential redelivery delay: `min * multiplier^redeliveries`, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedeliveryBackoff {
    min: Duration,
    max: Duration,
    multiplier: f64,
}

impl RedeliveryBackoff {
    pub fn new(min: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            min,
            max: max.max(min),
            multiplier: multiplier.max(1.0),
        }
    }

    pub fn delay(&self, redelivery_count: u32) -> Duration {
        let factor = self.multiplier.powi(redelivery_count.min(64) as i32);
        let millis = (self.min.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

impl From<&RedeliveryBackoffConfig> for RedeliveryBackoff {
    fn from(config: &RedeliveryBackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.multiplier,
        )
    }
}
