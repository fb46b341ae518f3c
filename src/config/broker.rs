use serde::{Deserialize, Serialize};

/// Event broker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// Broker backend (redis, memory)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Prefix for stream keys backing topics
    #[serde(default = "default_stream_prefix")]
    pub stream_prefix: String,

    /// Topic carrying like events
    #[serde(default = "default_like_topic")]
    pub like_topic: String,

    /// Shared subscription for like event consumers
    #[serde(default = "default_like_subscription")]
    pub like_subscription: String,

    /// Topic carrying counter sync records
    #[serde(default = "default_counter_topic")]
    pub counter_topic: String,

    /// Shared subscription for counter sync consumers
    #[serde(default = "default_counter_subscription")]
    pub counter_subscription: String,

    /// Consumer name within the subscription (defaults to the instance id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_name: Option<String>,

    /// Batch receive policy for like events
    #[serde(default)]
    pub batch: BatchReceiveConfig,

    /// Batch receive policy for counter sync records
    #[serde(default = "default_counter_batch")]
    pub counter_batch: BatchReceiveConfig,

    /// Redelivery delay after a negative acknowledgement
    #[serde(default = "default_nack_backoff")]
    pub nack_redelivery: RedeliveryBackoffConfig,

    /// Redelivery delay for messages never acknowledged
    #[serde(default = "default_ack_timeout_backoff")]
    pub ack_timeout_redelivery: RedeliveryBackoffConfig,

    /// Dead letter policy
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,

    /// Approximate maximum stream length kept by the broker (0 = unbounded)
    #[serde(default = "default_max_stream_len")]
    pub max_stream_len: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            stream_prefix: default_stream_prefix(),
            like_topic: default_like_topic(),
            like_subscription: default_like_subscription(),
            counter_topic: default_counter_topic(),
            counter_subscription: default_counter_subscription(),
            consumer_name: None,
            batch: BatchReceiveConfig::default(),
            counter_batch: default_counter_batch(),
            nack_redelivery: default_nack_backoff(),
            ack_timeout_redelivery: default_ack_timeout_backoff(),
            dead_letter: DeadLetterConfig::default(),
            max_stream_len: default_max_stream_len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchReceiveConfig {
    /// Maximum messages per batch
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Maximum wait for a batch in milliseconds
    #[serde(default = "default_batch_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BatchReceiveConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            timeout_ms: default_batch_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedeliveryBackoffConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeadLetterConfig {
    /// Redeliveries allowed before a message is dead-lettered
    #[serde(default = "default_max_redeliver_count")]
    pub max_redeliver_count: u32,

    /// Topic parked payloads are forwarded to
    #[serde(default = "default_dead_letter_topic")]
    pub topic: String,

    /// Storage backend (memory, redis)
    #[serde(default = "default_dlq_storage")]
    pub storage: String,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_redeliver_count: default_max_redeliver_count(),
            topic: default_dead_letter_topic(),
            storage: default_dlq_storage(),
        }
    }
}

fn default_backend() -> String {
    "redis".to_string()
}
fn default_stream_prefix() -> String {
    "likebridge:stream".to_string()
}
fn default_like_topic() -> String {
    "thumb-topic".to_string()
}
fn default_like_subscription() -> String {
    "thumb-subscription".to_string()
}
fn default_counter_topic() -> String {
    "counter-sync-topic".to_string()
}
fn default_counter_subscription() -> String {
    "counter-sync-subscription".to_string()
}
fn default_max_messages() -> usize {
    1000
}
fn default_batch_timeout_ms() -> u64 {
    10_000
}
fn default_counter_batch() -> BatchReceiveConfig {
    BatchReceiveConfig {
        max_messages: 500,
        timeout_ms: 5_000,
    }
}
fn default_nack_backoff() -> RedeliveryBackoffConfig {
    RedeliveryBackoffConfig {
        min_delay_ms: 1_000,
        max_delay_ms: 60_000,
        multiplier: 2.0,
    }
}
fn default_ack_timeout_backoff() -> RedeliveryBackoffConfig {
    RedeliveryBackoffConfig {
        min_delay_ms: 5_000,
        max_delay_ms: 300_000,
        multiplier: 3.0,
    }
}
fn default_max_redeliver_count() -> u32 {
    3
}
fn default_dead_letter_topic() -> String {
    "thumb-dlq-topic".to_string()
}
fn default_dlq_storage() -> String {
    "redis".to_string()
}
fn default_max_stream_len() -> usize {
    1_000_000
}
