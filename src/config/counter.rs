use serde::{Deserialize, Serialize};

/// Where flushed counter values go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterSinkKind {
    /// Write straight to the key-value store
    Kv,
    /// Publish to the counter topic; a consumer writes to the key-value store
    Broker,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CounterCacheConfig {
    /// Time bucket width in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Local entry lifetime after the last write
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Expiry applied to counters created in the key-value store
    #[serde(default = "default_remote_ttl_secs")]
    pub remote_ttl_secs: u64,

    /// Flush schedule
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Upper bound on tracked window keys
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_sink")]
    pub sink: CounterSinkKind,
}

impl Default for CounterCacheConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            ttl_secs: default_ttl_secs(),
            remote_ttl_secs: default_remote_ttl_secs(),
            flush_interval_ms: default_flush_interval_ms(),
            max_entries: default_max_entries(),
            sink: default_sink(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessGuardConfig {
    #[serde(default = "super::default_true")]
    pub enabled: bool,

    /// Access count that triggers a warning
    #[serde(default = "default_warn_count")]
    pub warn_count: i64,

    /// Access count above which the actor is banned
    #[serde(default = "default_ban_count")]
    pub ban_count: i64,

    /// Counting window in seconds
    #[serde(default = "default_interval_secs")]
    pub window_secs: u64,
}

impl Default for AccessGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warn_count: default_warn_count(),
            ban_count: default_ban_count(),
            window_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelationCacheConfig {
    #[serde(default = "super::default_true")]
    pub enabled: bool,

    /// Maximum cached subjects
    #[serde(default = "default_relation_max_entries")]
    pub max_entries: usize,

    /// Seconds a cached actor set stays valid after being written
    #[serde(default = "default_relation_ttl_secs")]
    pub ttl_secs: u64,

    /// Hits within one decay period that make a subject hot
    #[serde(default = "default_hot_threshold")]
    pub hot_threshold: u64,

    /// Hit counters are halved every decay period
    #[serde(default = "default_decay_secs")]
    pub decay_secs: u64,
}

impl Default for RelationCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_relation_max_entries(),
            ttl_secs: default_relation_ttl_secs(),
            hot_threshold: default_hot_threshold(),
            decay_secs: default_decay_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}
fn default_ttl_secs() -> u64 {
    60
}
fn default_remote_ttl_secs() -> u64 {
    60
}
fn default_flush_interval_ms() -> u64 {
    5_000
}
fn default_max_entries() -> usize {
    100_000
}
fn default_sink() -> CounterSinkKind {
    CounterSinkKind::Broker
}
fn default_warn_count() -> i64 {
    10
}
fn default_ban_count() -> i64 {
    20
}
fn default_relation_max_entries() -> usize {
    1_000
}
fn default_relation_ttl_secs() -> u64 {
    300
}
fn default_hot_threshold() -> u64 {
    100
}
fn default_decay_secs() -> u64 {
    60
}
