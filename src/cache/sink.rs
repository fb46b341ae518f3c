use crate::broker::EventBroker;
use crate::error::Result;
use crate::kv::{AtomicScript, KeyValueStore};
use crate::models::CounterSyncRecord;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Destination of flushed counter values
#[async_trait]
pub trait CounterSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn write(&self, records: &[CounterSyncRecord]) -> Result<()>;
}

/// Writes counters straight into the key-value store
pub struct KvCounterSink {
    store: Arc<dyn KeyValueStore>,
    expiry: Duration,
}

impl KvCounterSink {
    pub fn new(store: Arc<dyn KeyValueStore>, expiry: Duration) -> Self {
        Self { store, expiry }
    }
}

/// Set `record.value`; a new key also gets `expiry`, an existing one keeps its TTL
pub(crate) async fn write_counter(
    store: &dyn KeyValueStore,
    record: &CounterSyncRecord,
    expiry: Duration,
) -> Result<()> {
    store
        .eval(
            AtomicScript::SetCounter,
            &[record.key.clone()],
            &[record.value.to_string(), expiry.as_secs().max(1).to_string()],
        )
        .await?;
    Ok(())
}

#[async_trait]
impl CounterSink for KvCounterSink {
    fn name(&self) -> &'static str {
        "kv"
    }

    async fn write(&self, records: &[CounterSyncRecord]) -> Result<()> {
        for record in records {
            write_counter(self.store.as_ref(), record, self.expiry).await?;
        }
        Ok(())
    }
}

/// Publishes counters to the counter topic
pub struct BrokerCounterSink {
    broker: Arc<dyn EventBroker>,
    topic: String,
}

impl BrokerCounterSink {
    pub fn new(broker: Arc<dyn EventBroker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl CounterSink for BrokerCounterSink {
    fn name(&self) -> &'static str {
        "broker"
    }

    async fn write(&self, records: &[CounterSyncRecord]) -> Result<()> {
        for record in records {
            let payload = record.encode()?;
            match self.broker.publish(&self.topic, payload).await {
                Ok(_) => crate::metrics::record_publish(&self.topic, "success"),
                Err(e) => {
                    crate::metrics::record_publish(&self.topic, "failure");
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
