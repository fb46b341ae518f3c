use super::KeyValueStore;
use crate::config::LockConfig;
use crate::error::{LikeBridgeError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Proof of holding a lease lock
#[derive(Debug)]
pub struct LockToken {
    key: String,
    token: String,
}

impl LockToken {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Lease lock on the fast tier with bounded wait.
///
/// A holder that dies keeps the lock only until the lease runs out.
#[derive(Clone)]
pub struct LeaseLock {
    store: Arc<dyn KeyValueStore>,
    wait: Duration,
    lease: Duration,
    retry_interval: Duration,
}

impl LeaseLock {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &LockConfig) -> Self {
        Self {
            store,
            wait: Duration::from_millis(config.wait_ms),
            lease: Duration::from_millis(config.lease_ms),
            retry_interval: Duration::from_millis(config.retry_interval_ms.max(1)),
        }
    }

    /// Acquire `key`, waiting at most the configured wait time.
    ///
    /// Fails with `SystemBusy` when the wait runs out.
    pub async fn acquire(&self, key: &str) -> Result<LockToken> {
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.wait;

        loop {
            if self.store.try_lock(key, &token, self.lease).await? {
                debug!("Acquired lock {}", key);
                return Ok(LockToken {
                    key: key.to_string(),
                    token,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LikeBridgeError::SystemBusy(format!(
                    "timed out waiting {}ms for lock {}",
                    self.wait.as_millis(),
                    key
                )));
            }
            tokio::time::sleep(self.retry_interval.min(deadline - now)).await;
        }
    }

    /// Release a held lock. A lock whose lease already expired is only logged.
    pub async fn release(&self, token: LockToken) -> Result<()> {
        if !self.store.release_lock(&token.key, &token.token).await? {
            warn!(
                "Lock {} expired before release; lease of {}ms may be too short",
                token.key,
                self.lease.as_millis()
            );
        }
        Ok(())
    }
}
