//! Parking lot for like events that cannot be applied.
//!
//! Entries keep the raw payload so they can be inspected and replayed to
//! their source topic once the cause is fixed.

mod memory;
mod redis_storage;

pub use memory::InMemoryDlqStorage;
pub use redis_storage::RedisDlqStorage;

use crate::broker::{BrokerMessage, EventBroker};
use crate::error::{LikeBridgeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: String,
    /// Topic the message was consumed from and is replayed to
    pub topic: String,
    pub message_id: String,
    pub payload: Vec<u8>,
    pub error: String,
    /// Coarse class of the error, e.g. `Transient`
    pub error_kind: String,
    pub redelivery_count: u32,
    pub created_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(topic: &str, message: &BrokerMessage, cause: &LikeBridgeError) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            message_id: message.id.clone(),
            payload: message.payload.clone(),
            error: cause.to_string(),
            error_kind: format!("{:?}", cause.kind()),
            redelivery_count: message.redelivery_count,
            created_at: Utc::now(),
        }
    }

    /// Payload as text, lossy for non-UTF-8 bytes
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DlqStatistics {
    pub total_entries: usize,
    pub entries_by_topic: HashMap<String, usize>,
    /// Keyed by error kind
    pub entries_by_error: HashMap<String, usize>,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

impl DlqStatistics {
    pub(crate) fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a DeadLetterEntry>,
    ) -> Self {
        entries.into_iter().fold(Self::default(), |mut stats, entry| {
            stats.total_entries += 1;
            *stats.entries_by_topic.entry(entry.topic.clone()).or_default() += 1;
            *stats.entries_by_error.entry(entry.error_kind.clone()).or_default() += 1;
            let at = entry.created_at;
            stats.oldest_entry = Some(stats.oldest_entry.map_or(at, |t| t.min(at)));
            stats.newest_entry = Some(stats.newest_entry.map_or(at, |t| t.max(at)));
            stats
        })
    }
}

#[async_trait]
pub trait DlqStorage: Send + Sync {
    async fn store(&self, entry: DeadLetterEntry) -> Result<()>;

    /// Entries of one source topic, oldest first
    async fn list(&self, topic: &str, limit: Option<usize>) -> Result<Vec<DeadLetterEntry>>;

    async fn get(&self, id: &str) -> Result<Option<DeadLetterEntry>>;

    async fn remove(&self, id: &str) -> Result<()>;

    async fn statistics(&self) -> Result<DlqStatistics>;

    /// Drop every entry of a source topic, returning how many were dropped
    async fn clear_topic(&self, topic: &str) -> Result<usize>;
}

pub struct DeadLetterQueue {
    storage: Arc<dyn DlqStorage>,
    forward: Option<(Arc<dyn EventBroker>, String)>,
}

impl DeadLetterQueue {
    pub fn new(storage: Arc<dyn DlqStorage>) -> Self {
        Self {
            storage,
            forward: None,
        }
    }

    /// Also publish every parked payload to `topic` for external consumers
    pub fn with_forwarding(
        mut self,
        broker: Arc<dyn EventBroker>,
        topic: impl Into<String>,
    ) -> Self {
        self.forward = Some((broker, topic.into()));
        self
    }

    /// Park a message consumed from `topic` that cannot be applied.
    ///
    /// Forwarding is best effort; the stored entry is what replay uses.
    pub async fn park(
        &self,
        topic: &str,
        message: &BrokerMessage,
        cause: &LikeBridgeError,
    ) -> Result<()> {
        let entry = DeadLetterEntry::new(topic, message, cause);
        warn!(
            "Dead-lettering message {} from {} after {} redeliveries: {}",
            entry.message_id, topic, entry.redelivery_count, entry.error
        );
        self.storage.store(entry).await?;
        crate::metrics::DEAD_LETTER_EVENTS_TOTAL
            .with_label_values(&[topic])
            .inc();

        if let Some((broker, dlq_topic)) = &self.forward {
            if let Err(e) = broker.publish(dlq_topic, message.payload.clone()).await {
                warn!("Could not forward message {} to {}: {}", message.id, dlq_topic, e);
            }
        }
        Ok(())
    }

    pub async fn list(&self, topic: &str, limit: Option<usize>) -> Result<Vec<DeadLetterEntry>> {
        self.storage.list(topic, limit).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<DeadLetterEntry>> {
        self.storage.get(id).await
    }

    /// Publish parked messages back to their topic, removing each once published.
    ///
    /// Stops at the first publish failure; the remaining entries stay parked.
    pub async fn replay(
        &self,
        topic: &str,
        broker: &dyn EventBroker,
        limit: Option<usize>,
    ) -> Result<usize> {
        let entries = self.storage.list(topic, limit).await?;
        let mut replayed = 0;
        for entry in entries {
            if let Err(e) = broker.publish(&entry.topic, entry.payload.clone()).await {
                error!("Replay of dead letter {} stopped: {}", entry.id, e);
                return Err(e);
            }
            self.storage.remove(&entry.id).await?;
            replayed += 1;
        }
        if replayed > 0 {
            info!("Replayed {} dead letters to {}", replayed, topic);
        }
        Ok(replayed)
    }

    pub async fn get_statistics(&self) -> Result<DlqStatistics> {
        self.storage.statistics().await
    }

    pub async fn clear_topic(&self, topic: &str) -> Result<usize> {
        let cleared = self.storage.clear_topic(topic).await?;
        info!("Cleared {} dead letters of {}", cleared, topic);
        Ok(cleared)
    }
}
