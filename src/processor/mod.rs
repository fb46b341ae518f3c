//! Batch consumer applying like events to the authoritative store.
//!
//! A batch is decoded, folded to one change per relation and written in a
//! single store transaction. Messages are acknowledged only after that
//! transaction commits. A failed batch is negatively acknowledged so the
//! broker redelivers it, except for messages that already used up their
//! redeliveries, which go to the dead letter queue.

mod reducer;

pub use reducer::{reduce, ReducedBatch};

use crate::broker::{BrokerConsumer, BrokerMessage, EventBroker};
use crate::config::BrokerConfig;
use crate::dlq::DeadLetterQueue;
use crate::error::{LikeBridgeError, Result};
use crate::models::LikeEvent;
use crate::store::LikeStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What happened to one received batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub received: usize,
    pub inserted: usize,
    pub removed: usize,
    /// Changes the store dropped because the relation was already in place
    pub skipped: usize,
    pub malformed: usize,
    pub dropped: usize,
    pub dead_lettered: usize,
    pub nacked: usize,
}

pub struct LikeEventProcessor {
    store: Arc<dyn LikeStore>,
    dlq: Arc<DeadLetterQueue>,
    topic: String,
    subscription: String,
    max_messages: usize,
    timeout: Duration,
    max_redeliver_count: u32,
}

impl LikeEventProcessor {
    pub fn new(store: Arc<dyn LikeStore>, dlq: Arc<DeadLetterQueue>, config: &BrokerConfig) -> Self {
        Self {
            store,
            dlq,
            topic: config.like_topic.clone(),
            subscription: config.like_subscription.clone(),
            max_messages: config.batch.max_messages,
            timeout: Duration::from_millis(config.batch.timeout_ms),
            max_redeliver_count: config.dead_letter.max_redeliver_count,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Apply one received batch and settle every message in it
    pub async fn process_batch(
        &self,
        consumer: &mut dyn BrokerConsumer,
        messages: Vec<BrokerMessage>,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome {
            received: messages.len(),
            ..Default::default()
        };
        crate::metrics::record_batch_size(&self.topic, messages.len());

        let mut accepted = Vec::with_capacity(messages.len());
        let mut events = Vec::with_capacity(messages.len());

        for message in messages {
            if message.redelivery_count > self.max_redeliver_count {
                let err = LikeBridgeError::Delivery(format!(
                    "redelivered {} times",
                    message.redelivery_count
                ));
                self.dead_letter(consumer, &message, &err).await?;
                outcome.dead_lettered += 1;
                continue;
            }

            match LikeEvent::decode(&message.payload) {
                Ok(event) => {
                    events.push(event);
                    accepted.push(message);
                }
                Err(e) => {
                    warn!("Malformed like event {}: {}", message.id, e);
                    self.dead_letter(consumer, &message, &e).await?;
                    outcome.malformed += 1;
                }
            }
        }

        if accepted.is_empty() {
            self.record(&outcome);
            return Ok(outcome);
        }

        let reduced = reduce(events);
        outcome.dropped = reduced.dropped;

        let started = Instant::now();
        match self.store.apply_batch(&reduced.plan).await {
            Ok(applied) => {
                crate::metrics::record_batch_apply("like_events", started.elapsed());
                consumer.ack_all(&accepted).await?;
                outcome.inserted = applied.inserted;
                outcome.removed = applied.removed;
                outcome.skipped = applied.skipped;
                debug!(
                    "Applied {} like events: {} inserted, {} removed, {} skipped",
                    accepted.len(),
                    applied.inserted,
                    applied.removed,
                    applied.skipped
                );
            }
            Err(e) => {
                warn!("Failed to apply batch of {} like events: {}", accepted.len(), e);
                for message in &accepted {
                    if message.redelivery_count >= self.max_redeliver_count {
                        self.dead_letter(consumer, message, &e).await?;
                        outcome.dead_lettered += 1;
                    } else {
                        consumer.nack(message).await?;
                        outcome.nacked += 1;
                    }
                }
            }
        }

        self.record(&outcome);
        Ok(outcome)
    }

    /// Park a message in the dead letter queue, then ack it.
    ///
    /// If parking fails the message is nacked instead so it is not lost.
    async fn dead_letter(
        &self,
        consumer: &mut dyn BrokerConsumer,
        message: &BrokerMessage,
        cause: &LikeBridgeError,
    ) -> Result<()> {
        match self.dlq.park(&self.topic, message, cause).await {
            Ok(()) => consumer.ack(&message.id).await,
            Err(e) => {
                error!("Failed to dead-letter message {}: {}", message.id, e);
                consumer.nack(message).await
            }
        }
    }

    fn record(&self, outcome: &BatchOutcome) {
        crate::metrics::record_events_processed("inserted", outcome.inserted);
        crate::metrics::record_events_processed("removed", outcome.removed);
        crate::metrics::record_events_processed("skipped", outcome.skipped);
        crate::metrics::record_events_processed("malformed", outcome.malformed);
        crate::metrics::record_events_processed("dropped", outcome.dropped);
        crate::metrics::record_events_processed("dead_lettered", outcome.dead_lettered);
        crate::metrics::record_events_processed("nacked", outcome.nacked);
    }

    /// Receive and apply batches until shutdown. An in-flight batch always
    /// completes before the loop exits.
    pub async fn run(
        self,
        broker: Arc<dyn EventBroker>,
        consumer_name: String,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut consumer = broker
            .subscribe(&self.topic, &self.subscription, &consumer_name)
            .await?;
        info!(
            "Like event processor {} attached to {}/{}",
            consumer_name, self.topic, self.subscription
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let received = tokio::select! {
                received = consumer.batch_receive(self.max_messages, self.timeout) => received,
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match received {
                Ok(messages) if messages.is_empty() => {}
                Ok(messages) => {
                    if let Err(e) = self.process_batch(consumer.as_mut(), messages).await {
                        error!("Failed to settle like event batch: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to receive like events: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("Like event processor stopped");
        Ok(())
    }
}
