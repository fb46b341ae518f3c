use serde::{Deserialize, Serialize};

/// Authoritative store connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Connection details
    #[serde(flatten)]
    pub connection: DatabaseConnection,

    /// Connection pool settings
    #[serde(default)]
    pub pool: DatabasePoolConfig,

    /// Create the like tables on startup if they are missing
    #[serde(default = "super::default_true")]
    pub ensure_schema: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DatabaseConnection {
    ConnectionString { url: String },
    Parameters {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        database: String,
        username: String,
        #[serde(default)]
        password: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabasePoolConfig {
    #[serde(default = "default_pool_size")]
    pub max_size: usize,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_pool_size(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}

fn default_port() -> u16 {
    5432
}
fn default_pool_size() -> usize {
    10
}
fn default_acquire_timeout() -> u64 {
    30
}
