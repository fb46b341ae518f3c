//! Durable at-least-once event log.
//!
//! Topics are append-only logs; a subscription is a named cursor shared by
//! competing consumers. Delivered messages stay pending until acknowledged.
//! A negatively acknowledged message, or one left unacknowledged for too
//! long, is redelivered after an exponential backoff with its redelivery
//! count incremented.

mod backoff;
mod memory;
mod redis_stream;

pub use backoff::RedeliveryBackoff;
pub use memory::InMemoryBroker;
pub use redis_stream::RedisStreamBroker;

use crate::config::BrokerConfig;
use crate::error::{LikeBridgeError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

/// A message handed to a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub id: String,
    pub payload: Vec<u8>,
    /// How many times this message was delivered before this delivery
    pub redelivery_count: u32,
}

/// Redelivery policies applied by a subscription
#[derive(Debug, Clone, Copy)]
pub struct RedeliveryPolicy {
    pub nack: RedeliveryBackoff,
    pub ack_timeout: RedeliveryBackoff,
}

impl From<&BrokerConfig> for RedeliveryPolicy {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            nack: RedeliveryBackoff::from(&config.nack_redelivery),
            ack_timeout: RedeliveryBackoff::from(&config.ack_timeout_redelivery),
        }
    }
}

/// Completion handle of an asynchronous publish
pub struct PendingPublish {
    rx: oneshot::Receiver<Result<String>>,
}

impl PendingPublish {
    pub fn spawn<F>(publish: F) -> Self
    where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(publish.await);
        });
        Self { rx }
    }

    pub fn ready(result: Result<String>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Wait for the broker to confirm the publish. Resolves to the message id.
    pub async fn wait(self) -> Result<String> {
        self.rx.await.map_err(|_| {
            LikeBridgeError::Delivery("publish task ended without a result".to_string())
        })?
    }
}

#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Append a message and wait for the broker to store it
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<String>;

    /// Hand a message to the broker without waiting for it to be stored.
    ///
    /// An `Err` means the broker refused the message outright; failures
    /// after hand-off are reported through the returned handle.
    async fn publish_async(&self, topic: &str, payload: Vec<u8>) -> Result<PendingPublish>;

    /// Attach a consumer to a shared subscription, creating it if needed
    async fn subscribe(
        &self,
        topic: &str,
        subscription: &str,
        consumer_name: &str,
    ) -> Result<Box<dyn BrokerConsumer>>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait BrokerConsumer: Send {
    /// Receive up to `max_messages`, waiting at most `timeout` for the first one.
    ///
    /// Returns an empty batch when the timeout passes without messages.
    async fn batch_receive(
        &mut self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<BrokerMessage>>;

    async fn ack(&mut self, message_id: &str) -> Result<()>;

    /// Schedule a redelivery after the nack backoff for this message
    async fn nack(&mut self, message: &BrokerMessage) -> Result<()>;

    async fn ack_all(&mut self, messages: &[BrokerMessage]) -> Result<()> {
        for message in messages {
            self.ack(&message.id).await?;
        }
        Ok(())
    }
}
