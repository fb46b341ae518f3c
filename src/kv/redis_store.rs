use super::{AtomicScript, KeyValueStore};
use crate::config::RedisConfig;
use crate::error::{LikeBridgeError, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

/// Redis-backed fast tier
pub struct RedisKvStore {
    client: Client,
    conn: MultiplexedConnection,
    scripts: HashMap<AtomicScript, redis::Script>,
}

impl RedisKvStore {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.connection_url()).map_err(|e| {
            LikeBridgeError::Config(format!("Failed to create Redis client: {}", e))
        })?;

        let conn = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout),
            client.get_multiplexed_tokio_connection(),
        )
        .await
        .map_err(|_| {
            LikeBridgeError::Redis(format!(
                "Timed out connecting to Redis after {}s",
                config.connection_timeout
            ))
        })?
        .map_err(|e| LikeBridgeError::Redis(format!("Failed to connect to Redis: {}", e)))?;

        let scripts = AtomicScript::ALL
            .iter()
            .map(|script| (*script, redis::Script::new(script.source())))
            .collect();

        info!("Connected to Redis");

        Ok(Self {
            client,
            conn,
            scripts,
        })
    }

    /// Shared multiplexed connection, for components issuing non-blocking commands
    pub fn connection(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl KeyValueStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        cmd.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("HDEL")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: i64 = redis::cmd("HEXISTS")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;
        Ok(exists == 1)
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("HKEYS").arg(key).query_async(&mut conn).await?)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?)
    }

    async fn scan_keys(&self, pattern: &str, count: usize) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut seen = HashSet::new();
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count.max(1))
                .query_async(&mut conn)
                .await?;

            // SCAN may return a key more than once
            for key in batch {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("Scanned {} keys matching '{}'", keys.len(), pattern);
        Ok(keys)
    }

    async fn eval(&self, script: AtomicScript, keys: &[String], args: &[String]) -> Result<i64> {
        script.check_arity(keys, args)?;
        let compiled = self.scripts.get(&script).ok_or_else(|| {
            LikeBridgeError::Config(format!("script {} is not loaded", script.name()))
        })?;

        let mut invocation = compiled.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }

        let mut conn = self.conn.clone();
        let result: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(result)
    }

    async fn try_lock(&self, key: &str, token: &str, lease: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}
