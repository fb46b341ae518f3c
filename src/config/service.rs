use serde::{Deserialize, Serialize};

/// Which like service implementation handles requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeStrategy {
    /// Lease lock plus a database transaction per toggle
    LockedTransaction,
    /// Server-side script over the fast tier plus a periodic ledger sync
    AtomicScript,
    /// Fast-tier marker plus an asynchronously published event
    EventSourced,
}

impl LikeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeStrategy::LockedTransaction => "locked_transaction",
            LikeStrategy::AtomicScript => "atomic_script",
            LikeStrategy::EventSourced => "event_sourced",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LikeServiceConfig {
    #[serde(default = "default_strategy")]
    pub strategy: LikeStrategy,

    /// Prefix of the per-actor relation mirror hash (`{prefix}:{actorId}`)
    #[serde(default = "default_relation_key_prefix")]
    pub relation_key_prefix: String,

    /// Width of a temp ledger time slice in seconds
    #[serde(default = "default_ledger_slice_secs")]
    pub ledger_slice_secs: u64,

    #[serde(default)]
    pub lock: LockConfig,
}

impl Default for LikeServiceConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            relation_key_prefix: default_relation_key_prefix(),
            ledger_slice_secs: default_ledger_slice_secs(),
            lock: LockConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockConfig {
    /// Maximum time to wait for the lock
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,

    /// Lease after which an unreleased lock expires
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,

    /// Pause between acquisition attempts
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_ms: default_wait_ms(),
            lease_ms: default_lease_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

fn default_strategy() -> LikeStrategy {
    LikeStrategy::EventSourced
}
fn default_relation_key_prefix() -> String {
    "thumb".to_string()
}
fn default_ledger_slice_secs() -> u64 {
    10
}
fn default_wait_ms() -> u64 {
    3_000
}
fn default_lease_ms() -> u64 {
    10_000
}
fn default_retry_interval_ms() -> u64 {
    50
}
