use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ErrorHandlingConfig {
    /// Backoff for reconciliation publishes and startup connectivity checks
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Bounded exponential backoff. Only transient failures are retried.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    /// Retries after the first attempt; 0 disables retrying
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on a single backoff
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "super::default_true")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}
