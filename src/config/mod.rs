use serde::{Deserialize, Serialize};
use std::collections::HashMap;

mod broker;
mod counter;
mod database;
mod error_handling;
mod jobs;
mod loader;
mod logging;
mod redis;
mod service;
mod validation;

pub use broker::*;
pub use counter::*;
pub use database::*;
pub use error_handling::*;
pub use jobs::*;
pub use loader::*;
pub use logging::*;
pub use redis::*;
pub use service::*;
pub use validation::*;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Application metadata
    #[serde(default)]
    pub app: AppConfig,

    /// Fast tier (atomic key-value store)
    pub redis: RedisConfig,

    /// Authoritative relational store
    pub database: DatabaseConfig,

    /// Event broker topics, batching and redelivery
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Like service strategy selection
    #[serde(default)]
    pub like_service: LikeServiceConfig,

    /// Local windowed counter cache
    #[serde(default)]
    pub counter_cache: CounterCacheConfig,

    /// Per-actor access counting
    #[serde(default)]
    pub access_guard: AccessGuardConfig,

    /// Hot-subject relation cache
    #[serde(default)]
    pub relation_cache: RelationCacheConfig,

    /// Daily reconciliation sweep
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    /// Temp ledger sync (atomic-script strategy)
    #[serde(default)]
    pub ledger_sync: LedgerSyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Error handling configuration
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            instance_id: default_instance_id(),
            tags: HashMap::new(),
        }
    }
}

fn default_name() -> String {
    "likebridge".to_string()
}

fn default_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn default_true() -> bool {
    true
}
