// Redis Streams broker integration tests

use crate::common::start_redis;
use likebridge::broker::{BrokerConsumer, EventBroker, RedisStreamBroker};
use likebridge::config::{BrokerConfig, RedeliveryBackoffConfig};
use likebridge::kv::RedisKvStore;
use std::time::Duration;
use testcontainers::Container;
use testcontainers_modules::redis::Redis;

#[cfg(test)]
mod redis_stream_tests {
    use super::*;

    const TOPIC: &str = "thumb-topic";
    const GROUP: &str = "thumb-subscription";
    const STREAM: &str = "test:thumb-topic";

    fn backoff(min_delay_ms: u64) -> RedeliveryBackoffConfig {
        RedeliveryBackoffConfig {
            min_delay_ms,
            max_delay_ms: min_delay_ms * 8,
            multiplier: 2.0,
        }
    }

    async fn setup() -> (Container<'static, Redis>, RedisStreamBroker, redis::Client) {
        let (container, redis_config) = start_redis().await.unwrap();
        let kv = RedisKvStore::connect(&redis_config).await.unwrap();
        let config = BrokerConfig {
            stream_prefix: "test".to_string(),
            nack_redelivery: backoff(100),
            ack_timeout_redelivery: backoff(300),
            ..BrokerConfig::default()
        };
        let broker = RedisStreamBroker::connect(kv.client().clone(), &config)
            .await
            .unwrap();
        (container, broker, kv.client().clone())
    }

    async fn pending_ids(client: &redis::Client) -> Vec<String> {
        let mut conn = client.get_multiplexed_tokio_connection().await.unwrap();
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(STREAM)
            .arg(GROUP)
            .arg("-")
            .arg("+")
            .arg(100)
            .query_async(&mut conn)
            .await
            .unwrap();
        pending.into_iter().map(|(id, _, _, _)| id).collect()
    }

    #[tokio::test]
    async fn test_publish_receive_ack() {
        let (_container, broker, client) = setup().await;
        let mut consumer = broker.subscribe(TOPIC, GROUP, "c1").await.unwrap();

        let first = broker.publish(TOPIC, b"one".to_vec()).await.unwrap();
        broker
            .publish_async(TOPIC, b"two".to_vec())
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        let batch = consumer
            .batch_receive(10, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, first);
        assert_eq!(batch[0].payload, b"one".to_vec());
        assert_eq!(batch[1].redelivery_count, 0);
        assert_eq!(pending_ids(&client).await.len(), 2);

        consumer.ack_all(&batch).await.unwrap();
        assert!(pending_ids(&client).await.is_empty());
        let empty = consumer
            .batch_receive(10, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_nack_redelivery_counts() {
        let (_container, broker, client) = setup().await;
        let mut consumer = broker.subscribe(TOPIC, GROUP, "c1").await.unwrap();
        broker.publish(TOPIC, b"a".to_vec()).await.unwrap();

        let batch = consumer
            .batch_receive(10, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(batch[0].redelivery_count, 0);
        consumer.nack(&batch[0]).await.unwrap();

        // Not due before the nack backoff
        let early = consumer
            .batch_receive(10, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(early.is_empty());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let again = consumer
            .batch_receive(10, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, batch[0].id);
        assert_eq!(again[0].redelivery_count, 1);

        // The second nack backs off twice as long
        consumer.nack(&again[0]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        let third = consumer
            .batch_receive(10, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].redelivery_count, 2);

        consumer.ack(&third[0].id).await.unwrap();
        assert!(pending_ids(&client).await.is_empty());
    }

    #[tokio::test]
    async fn test_ack_timeout_redelivery() {
        let (_container, broker, _client) = setup().await;
        let mut consumer = broker.subscribe(TOPIC, GROUP, "c1").await.unwrap();
        broker.publish(TOPIC, b"a".to_vec()).await.unwrap();

        let batch = consumer
            .batch_receive(10, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);

        let early = consumer
            .batch_receive(10, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(early.is_empty());

        tokio::time::sleep(Duration::from_millis(350)).await;
        let redelivered = consumer
            .batch_receive(10, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].payload, b"a".to_vec());
        assert_eq!(redelivered[0].redelivery_count, 1);
    }

    #[tokio::test]
    async fn test_existing_group_is_shared() {
        let (_container, broker, _client) = setup().await;
        let mut first = broker.subscribe(TOPIC, GROUP, "c1").await.unwrap();
        // The group already exists on the second subscribe
        let mut second = broker.subscribe(TOPIC, GROUP, "c2").await.unwrap();

        broker.publish(TOPIC, b"a".to_vec()).await.unwrap();
        broker.publish(TOPIC, b"b".to_vec()).await.unwrap();

        let one = first.batch_receive(1, Duration::from_secs(1)).await.unwrap();
        let other = second
            .batch_receive(10, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(other.len(), 1);
        assert_ne!(one[0].id, other[0].id);
    }

    #[tokio::test]
    async fn test_entry_without_payload_is_acknowledged() {
        let (_container, broker, client) = setup().await;
        let mut consumer = broker.subscribe(TOPIC, GROUP, "c1").await.unwrap();

        let mut conn = client.get_multiplexed_tokio_connection().await.unwrap();
        redis::cmd("XADD")
            .arg(STREAM)
            .arg("*")
            .arg("other")
            .arg("x")
            .query_async::<_, String>(&mut conn)
            .await
            .unwrap();

        let batch = consumer
            .batch_receive(10, Duration::from_millis(200))
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert!(pending_ids(&client).await.is_empty());
    }
}
