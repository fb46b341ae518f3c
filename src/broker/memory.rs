use super::{BrokerConsumer, BrokerMessage, EventBroker, PendingPublish, RedeliveryPolicy};
use crate::config::BrokerConfig;
use crate::error::{LikeBridgeError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

struct PendingEntry {
    payload: Vec<u8>,
    delivery_count: u32,
    redeliver_at: Instant,
}

struct GroupState {
    /// Log position of the next unread entry
    cursor: usize,
    pending: BTreeMap<u64, PendingEntry>,
}

/// Retained log entries of a topic.
///
/// `log[0]` sits at position `base`. Entries every group has read are
/// dropped since pending deliveries keep their own payload copy.
#[derive(Default)]
struct TopicState {
    log: VecDeque<(u64, Vec<u8>)>,
    base: usize,
    groups: HashMap<String, GroupState>,
}

impl TopicState {
    fn trim(&mut self, max_len: usize) {
        let read_by_all = self.groups.values().map(|g| g.cursor).min().unwrap_or(self.base);
        let mut surplus = read_by_all.saturating_sub(self.base);
        if max_len > 0 {
            surplus = surplus.max(self.log.len().saturating_sub(max_len));
        }
        let surplus = surplus.min(self.log.len());
        self.log.drain(..surplus);
        self.base += surplus;
    }
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicState>,
    next_seq: u64,
}

struct Inner {
    state: Mutex<BrokerState>,
    notify: Notify,
    policy: RedeliveryPolicy,
    /// Retained entries per topic (0 = unbounded)
    max_len: usize,
    unavailable: AtomicBool,
    fail_async: AtomicBool,
}

/// Single-process broker with the redelivery semantics of the stream broker
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::from_config(&BrokerConfig::default())
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::build(RedeliveryPolicy::from(config), config.max_stream_len)
    }

    pub fn with_policy(policy: RedeliveryPolicy) -> Self {
        Self::build(policy, BrokerConfig::default().max_stream_len)
    }

    fn build(policy: RedeliveryPolicy, max_len: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
                policy,
                max_len,
                unavailable: AtomicBool::new(false),
                fail_async: AtomicBool::new(false),
            }),
        }
    }

    /// Refuse every publish synchronously until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Accept asynchronous publishes but fail them after hand-off
    pub fn fail_async_publishes(&self, fail: bool) {
        self.inner.fail_async.store(fail, Ordering::SeqCst);
    }

    /// Payloads still retained for a topic, oldest first
    pub async fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        let state = self.inner.state.lock().await;
        state
            .topics
            .get(topic)
            .map(|t| t.log.iter().map(|(_, payload)| payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Delivered but unacknowledged messages of a subscription
    pub async fn pending_count(&self, topic: &str, subscription: &str) -> usize {
        let state = self.inner.state.lock().await;
        state
            .topics
            .get(topic)
            .and_then(|t| t.groups.get(subscription))
            .map(|g| g.pending.len())
            .unwrap_or(0)
    }

    async fn append(&self, topic: &str, payload: Vec<u8>) -> String {
        let mut state = self.inner.state.lock().await;
        state.next_seq += 1;
        let seq = state.next_seq;
        let topic = state.topics.entry(topic.to_string()).or_default();
        topic.log.push_back((seq, payload));
        topic.trim(self.inner.max_len);
        drop(state);
        self.inner.notify.notify_waiters();
        seq.to_string()
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(LikeBridgeError::Broker("broker unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<String> {
        self.check_available()?;
        Ok(self.append(topic, payload).await)
    }

    async fn publish_async(&self, topic: &str, payload: Vec<u8>) -> Result<PendingPublish> {
        self.check_available()?;
        if self.inner.fail_async.load(Ordering::SeqCst) {
            return Ok(PendingPublish::spawn(async {
                Err(LikeBridgeError::Delivery(
                    "broker rejected the message".to_string(),
                ))
            }));
        }
        let broker = self.clone();
        let topic = topic.to_string();
        Ok(PendingPublish::spawn(async move {
            Ok(broker.append(&topic, payload).await)
        }))
    }

    async fn subscribe(
        &self,
        topic: &str,
        subscription: &str,
        _consumer_name: &str,
    ) -> Result<Box<dyn BrokerConsumer>> {
        self.check_available()?;
        let mut state = self.inner.state.lock().await;
        let topic_state = state.topics.entry(topic.to_string()).or_default();
        let base = topic_state.base;
        topic_state
            .groups
            .entry(subscription.to_string())
            .or_insert_with(|| GroupState {
                cursor: base,
                pending: BTreeMap::new(),
            });

        Ok(Box::new(InMemoryConsumer {
            inner: self.inner.clone(),
            topic: topic.to_string(),
            subscription: subscription.to_string(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

struct InMemoryConsumer {
    inner: Arc<Inner>,
    topic: String,
    subscription: String,
}

impl InMemoryConsumer {
    async fn take_ready(&self, max_messages: usize) -> Vec<BrokerMessage> {
        let mut state = self.inner.state.lock().await;
        let now = Instant::now();
        let ack_timeout = self.inner.policy.ack_timeout;

        let Some(topic) = state.topics.get_mut(&self.topic) else {
            return Vec::new();
        };
        let Some(group) = topic.groups.get_mut(&self.subscription) else {
            return Vec::new();
        };

        let mut batch = Vec::new();

        for (seq, entry) in group.pending.iter_mut() {
            if batch.len() >= max_messages {
                break;
            }
            if entry.redeliver_at > now {
                continue;
            }
            let redelivery_count = entry.delivery_count;
            entry.delivery_count += 1;
            entry.redeliver_at = now + ack_timeout.delay(redelivery_count);
            batch.push(BrokerMessage {
                id: seq.to_string(),
                payload: entry.payload.clone(),
                redelivery_count,
            });
        }

        // Entries dropped by the length cap are gone for lagging groups too
        group.cursor = group.cursor.max(topic.base);
        let end = topic.base + topic.log.len();
        while batch.len() < max_messages && group.cursor < end {
            let (seq, payload) = &topic.log[group.cursor - topic.base];
            group.cursor += 1;
            group.pending.insert(
                *seq,
                PendingEntry {
                    payload: payload.clone(),
                    delivery_count: 1,
                    redeliver_at: now + ack_timeout.delay(0),
                },
            );
            batch.push(BrokerMessage {
                id: seq.to_string(),
                payload: payload.clone(),
                redelivery_count: 0,
            });
        }

        topic.trim(self.inner.max_len);
        batch
    }

    async fn with_pending<F>(&self, message_id: &str, apply: F)
    where
        F: FnOnce(&mut BTreeMap<u64, PendingEntry>, u64),
    {
        let Ok(seq) = message_id.parse::<u64>() else {
            return;
        };
        let mut state = self.inner.state.lock().await;
        if let Some(group) = state
            .topics
            .get_mut(&self.topic)
            .and_then(|t| t.groups.get_mut(&self.subscription))
        {
            apply(&mut group.pending, seq);
        }
    }
}

#[async_trait]
impl BrokerConsumer for InMemoryConsumer {
    async fn batch_receive(
        &mut self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<BrokerMessage>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.notify.notified();
            let batch = self.take_ready(max_messages.max(1)).await;
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(POLL_INTERVAL.min(deadline - now)) => {}
            }
        }
    }

    async fn ack(&mut self, message_id: &str) -> Result<()> {
        self.with_pending(message_id, |pending, seq| {
            pending.remove(&seq);
        })
        .await;
        Ok(())
    }

    async fn nack(&mut self, message: &BrokerMessage) -> Result<()> {
        let delay = self.inner.policy.nack.delay(message.redelivery_count);
        self.with_pending(&message.id, |pending, seq| {
            if let Some(entry) = pending.get_mut(&seq) {
                entry.redeliver_at = Instant::now() + delay;
            }
        })
        .await;
        Ok(())
    }
}
