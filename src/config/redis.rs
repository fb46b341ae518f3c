use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL
    pub url: String,

    /// Password for authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database number
    #[serde(default)]
    pub database: u8,

    /// Connection timeout in seconds
    #[serde(default = "default_redis_timeout")]
    pub connection_timeout: u64,

    /// COUNT hint used when scanning key patterns
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

impl RedisConfig {
    /// Build the effective connection URL, folding in password and database.
    pub fn connection_url(&self) -> String {
        let mut url = self.url.trim_end_matches('/').to_string();
        if let Some(password) = &self.password {
            if let Some(rest) = url.strip_prefix("redis://") {
                if !rest.contains('@') {
                    url = format!("redis://:{}@{}", password, rest);
                }
            }
        }
        if self.database != 0 {
            url = format!("{}/{}", url, self.database);
        }
        url
    }
}

fn default_redis_timeout() -> u64 {
    5
}

fn default_scan_count() -> usize {
    1000
}
