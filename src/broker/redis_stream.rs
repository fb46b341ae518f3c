use super::{BrokerConsumer, BrokerMessage, EventBroker, PendingPublish, RedeliveryPolicy};
use crate::config::BrokerConfig;
use crate::error::{LikeBridgeError, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const PAYLOAD_FIELD: &str = "payload";

/// Broker on Redis Streams.
///
/// A topic is the stream `{prefix}:{topic}`, a subscription is a consumer
/// group. Redelivery claims pending entries whose idle time passed the
/// backoff for their delivery count.
pub struct RedisStreamBroker {
    client: Client,
    conn: MultiplexedConnection,
    prefix: String,
    max_len: usize,
    policy: RedeliveryPolicy,
}

impl RedisStreamBroker {
    pub async fn connect(client: Client, config: &BrokerConfig) -> Result<Self> {
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self {
            client,
            conn,
            prefix: config.stream_prefix.clone(),
            max_len: config.max_stream_len,
            policy: RedeliveryPolicy::from(config),
        })
    }

    fn stream_key(&self, topic: &str) -> String {
        format!("{}:{}", self.prefix, topic)
    }

    fn xadd_cmd(&self, topic: &str, payload: &[u8]) -> redis::Cmd {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(self.stream_key(topic));
        if self.max_len > 0 {
            cmd.arg("MAXLEN").arg("~").arg(self.max_len);
        }
        cmd.arg("*").arg(PAYLOAD_FIELD).arg(payload);
        cmd
    }
}

#[async_trait]
impl EventBroker for RedisStreamBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<String> {
        let mut conn = self.conn.clone();
        let id: String = self
            .xadd_cmd(topic, &payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| LikeBridgeError::Broker(format!("XADD to {} failed: {}", topic, e)))?;
        Ok(id)
    }

    async fn publish_async(&self, topic: &str, payload: Vec<u8>) -> Result<PendingPublish> {
        let cmd = self.xadd_cmd(topic, &payload);
        let mut conn = self.conn.clone();
        let topic = topic.to_string();
        Ok(PendingPublish::spawn(async move {
            cmd.query_async::<_, String>(&mut conn)
                .await
                .map_err(|e| LikeBridgeError::Delivery(format!("XADD to {} failed: {}", topic, e)))
        }))
    }

    async fn subscribe(
        &self,
        topic: &str,
        subscription: &str,
        consumer_name: &str,
    ) -> Result<Box<dyn BrokerConsumer>> {
        let stream = self.stream_key(topic);
        // Blocking reads get a connection of their own
        let mut conn = self.client.get_multiplexed_tokio_connection().await?;

        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&stream)
            .arg(subscription)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => info!("Created consumer group '{}' on {}", subscription, stream),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!("Consumer group '{}' already exists on {}", subscription, stream)
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Box::new(RedisStreamConsumer {
            conn,
            stream,
            group: subscription.to_string(),
            consumer: consumer_name.to_string(),
            policy: self.policy,
            nacked: HashMap::new(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

struct RedisStreamConsumer {
    conn: MultiplexedConnection,
    stream: String,
    group: String,
    consumer: String,
    policy: RedeliveryPolicy,
    /// Nacked ids and the redelivery count they were nacked at
    nacked: HashMap<String, u32>,
}

impl RedisStreamConsumer {
    fn to_message(entry: &StreamId, redelivery_count: u32) -> Option<BrokerMessage> {
        let payload: Vec<u8> = entry.get(PAYLOAD_FIELD)?;
        Some(BrokerMessage {
            id: entry.id.clone(),
            payload,
            redelivery_count,
        })
    }

    /// Claim pending entries whose backoff has elapsed
    async fn claim_due(&mut self, max_messages: usize) -> Result<Vec<BrokerMessage>> {
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("-")
            .arg("+")
            .arg(max_messages)
            .query_async(&mut self.conn)
            .await?;

        let mut due = Vec::new();
        for (id, _owner, idle_ms, times_delivered) in pending {
            let redelivery_count = times_delivered as u32;
            let backoff = match self.nacked.get(&id) {
                Some(nacked_at) => self.policy.nack.delay(*nacked_at),
                None => self.policy.ack_timeout.delay(redelivery_count.saturating_sub(1)),
            };
            if Duration::from_millis(idle_ms) >= backoff {
                due.push((id, redelivery_count, backoff));
            }
        }

        let mut messages = Vec::new();
        for (id, redelivery_count, backoff) in due {
            // Another consumer may claim first; min-idle makes the claim exclusive
            let claimed: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
                .arg(&self.stream)
                .arg(&self.group)
                .arg(&self.consumer)
                .arg(backoff.as_millis() as u64)
                .arg(&id)
                .query_async(&mut self.conn)
                .await?;
            self.nacked.remove(&id);

            for entry in &claimed.ids {
                match Self::to_message(entry, redelivery_count) {
                    Some(message) => messages.push(message),
                    None => {
                        warn!("Stream entry {} has no payload; acknowledging", entry.id);
                        self.ack(&entry.id).await?;
                    }
                }
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl BrokerConsumer for RedisStreamConsumer {
    async fn batch_receive(
        &mut self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<BrokerMessage>> {
        let max_messages = max_messages.max(1);
        let deadline = Instant::now() + timeout;

        let mut batch = self.claim_due(max_messages).await?;
        if batch.len() >= max_messages {
            return Ok(batch);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max_messages - batch.len());
        if batch.is_empty() && !remaining.is_zero() {
            options = options.block(remaining.as_millis().max(1) as usize);
        }

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await?;

        let mut malformed = Vec::new();
        if let Some(reply) = reply {
            for key in reply.keys {
                for entry in key.ids {
                    match Self::to_message(&entry, 0) {
                        Some(message) => batch.push(message),
                        None => malformed.push(entry.id),
                    }
                }
            }
        }
        for id in malformed {
            warn!("Stream entry {} has no payload; acknowledging", id);
            self.ack(&id).await?;
        }

        Ok(batch)
    }

    async fn ack(&mut self, message_id: &str) -> Result<()> {
        redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(message_id)
            .query_async::<_, i64>(&mut self.conn)
            .await?;
        self.nacked.remove(message_id);
        Ok(())
    }

    async fn nack(&mut self, message: &BrokerMessage) -> Result<()> {
        // Re-claiming to ourselves resets the idle clock without counting a delivery
        redis::cmd("XCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(0)
            .arg(&message.id)
            .arg("JUSTID")
            .query_async::<_, Vec<String>>(&mut self.conn)
            .await?;
        self.nacked
            .insert(message.id.clone(), message.redelivery_count);
        Ok(())
    }
}
