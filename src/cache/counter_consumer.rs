use super::sink::write_counter;
use crate::broker::{BrokerConsumer, BrokerMessage, EventBroker};
use crate::config::BatchReceiveConfig;
use crate::error::Result;
use crate::kv::KeyValueStore;
use crate::models::CounterSyncRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSyncStats {
    pub written: usize,
    pub malformed: usize,
    pub failed: usize,
}

/// Writes counter records from the counter topic into the key-value store
pub struct CounterSyncConsumer {
    store: Arc<dyn KeyValueStore>,
    topic: String,
    expiry: Duration,
    batch: BatchReceiveConfig,
}

impl CounterSyncConsumer {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        topic: impl Into<String>,
        expiry: Duration,
        batch: BatchReceiveConfig,
    ) -> Self {
        Self {
            store,
            topic: topic.into(),
            expiry,
            batch,
        }
    }

    /// Write one received batch. Every message is acked or nacked on its own.
    pub async fn process_batch(
        &self,
        consumer: &mut dyn BrokerConsumer,
        messages: &[BrokerMessage],
    ) -> Result<CounterSyncStats> {
        let mut stats = CounterSyncStats::default();

        for message in messages {
            let record = match CounterSyncRecord::decode(&message.payload) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Dropping malformed counter record {}: {}", message.id, e);
                    stats.malformed += 1;
                    consumer.ack(&message.id).await?;
                    continue;
                }
            };

            match write_counter(self.store.as_ref(), &record, self.expiry).await {
                Ok(()) => {
                    consumer.ack(&message.id).await?;
                    stats.written += 1;
                }
                Err(e) => {
                    warn!("Failed to write counter {}: {}", record.key, e);
                    consumer.nack(message).await?;
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    pub async fn run(
        self,
        broker: Arc<dyn EventBroker>,
        subscription: String,
        consumer_name: String,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut consumer = broker
            .subscribe(&self.topic, &subscription, &consumer_name)
            .await?;
        info!(
            "Counter sync consumer {} attached to {}/{}",
            consumer_name, self.topic, subscription
        );

        let timeout = Duration::from_millis(self.batch.timeout_ms);
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let messages = tokio::select! {
                received = consumer.batch_receive(self.batch.max_messages, timeout) => received,
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match messages {
                Ok(messages) if messages.is_empty() => {}
                Ok(messages) => {
                    crate::metrics::record_batch_size(&self.topic, messages.len());
                    match self.process_batch(consumer.as_mut(), &messages).await {
                        Ok(stats) => debug!("Counter sync batch: {:?}", stats),
                        Err(e) => error!("Counter sync batch failed: {}", e),
                    }
                }
                Err(e) => {
                    error!("Failed to receive counter records: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("Counter sync consumer stopped");
        Ok(())
    }
}
