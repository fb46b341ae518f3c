//! Fast-tier key-value store access.
//!
//! Everything the engine keeps in Redis goes through [`KeyValueStore`]:
//! the per-actor relation mirror, temp ledgers, lease locks and windowed
//! counters. [`InMemoryKvStore`] implements the same semantics, scripts
//! included, for tests and single-process deployments.

pub mod keys;
pub mod lock;
mod memory;
mod redis_store;
pub mod scripts;

pub use keys::KeyScheme;
pub use lock::{LeaseLock, LockToken};
pub use memory::InMemoryKvStore;
pub use redis_store::RedisKvStore;
pub use scripts::{AtomicScript, ScriptOutcome};

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a string value, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Returns true when the key existed
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Returns true when the field existed
    async fn hdel(&self, key: &str, field: &str) -> Result<bool>;

    async fn hexists(&self, key: &str, field: &str) -> Result<bool>;

    async fn hkeys(&self, key: &str) -> Result<Vec<String>>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Incrementally scan keys matching a glob pattern (`*` and `?`)
    async fn scan_keys(&self, pattern: &str, count: usize) -> Result<Vec<String>>;

    /// Run a server-side script atomically and return its integer result
    async fn eval(&self, script: AtomicScript, keys: &[String], args: &[String]) -> Result<i64>;

    /// SET NX with a lease. Returns true when the lock was taken.
    async fn try_lock(&self, key: &str, token: &str, lease: Duration) -> Result<bool>;

    /// Compare-and-delete. Returns true when the caller still held the lock.
    async fn release_lock(&self, key: &str, token: &str) -> Result<bool> {
        let released = self
            .eval(
                AtomicScript::ReleaseLock,
                &[key.to_string()],
                &[token.to_string()],
            )
            .await?;
        Ok(released == 1)
    }

    async fn ping(&self) -> Result<()>;
}
