//! Bounded retries for transient failures of the fast tier, the event log
//! and the authoritative store.

use crate::config::RetrySettings;
use crate::error::{ErrorKind, LikeBridgeError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Add up to a quarter of the delay at random
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_attempts as usize,
            initial_delay_ms: settings.initial_backoff_ms,
            max_delay_ms: settings.max_backoff_ms,
            multiplier: settings.backoff_multiplier,
            jitter: settings.jitter,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn delay_for(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as usize) as i32;
        let ms = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(ms.min(self.max_delay_ms as f64) as u64)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let spread = delay.as_millis() as u64 / 4;
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// Errors that may succeed when the same operation is repeated
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Run `operation` until it succeeds, fails permanently or runs out of retries
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, LikeBridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Retryable + Into<LikeBridgeError>,
{
    let mut retry = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!("{} recovered on retry {}", operation_name, retry);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            warn!("{} failed permanently: {}", operation_name, err);
            return Err(err.into());
        }
        if retry >= config.max_retries {
            warn!("{} gave up after {} attempts: {}", operation_name, retry + 1, err);
            return Err(err.into());
        }

        retry += 1;
        let delay = config.jittered(config.delay_for(retry));
        warn!(
            "{} failed ({}), retry {}/{} in {}ms",
            operation_name,
            err,
            retry,
            config.max_retries,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
    }
}

impl Retryable for LikeBridgeError {
    fn is_retryable(&self) -> bool {
        // Lock timeouts go back to the caller
        !matches!(self, LikeBridgeError::SystemBusy(_)) && self.kind() == ErrorKind::Transient
    }
}

impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind::*;

        matches!(
            self.kind(),
            ConnectionRefused | ConnectionReset | ConnectionAborted | BrokenPipe | TimedOut
        )
    }
}
