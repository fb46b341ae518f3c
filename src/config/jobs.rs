use serde::{Deserialize, Serialize};

/// Daily reconciliation sweep
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconciliationConfig {
    #[serde(default = "super::default_true")]
    pub enabled: bool,

    /// Local hour of day (0-23)
    #[serde(default = "default_hour")]
    pub hour: u32,

    /// Minute of the hour (0-59)
    #[serde(default)]
    pub minute: u32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: default_hour(),
            minute: 0,
        }
    }
}

/// Periodic temp ledger sync used by the atomic-script strategy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerSyncConfig {
    /// Run even when another strategy is active
    #[serde(default)]
    pub always_enabled: bool,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_sync_interval_ms")]
    pub interval_ms: u64,
}

impl Default for LedgerSyncConfig {
    fn default() -> Self {
        Self {
            always_enabled: false,
            initial_delay_ms: default_initial_delay_ms(),
            interval_ms: default_sync_interval_ms(),
        }
    }
}

fn default_hour() -> u32 {
    2
}
fn default_initial_delay_ms() -> u64 {
    10_000
}
fn default_sync_interval_ms() -> u64 {
    10_000
}
