// In-memory broker tests

use likebridge::broker::{
    BrokerConsumer, EventBroker, InMemoryBroker, RedeliveryBackoff, RedeliveryPolicy,
};
use likebridge::config::BrokerConfig;
use likebridge::error::LikeBridgeError;
use std::time::Duration;

#[cfg(test)]
mod memory_broker_tests {
    use super::*;

    const TOPIC: &str = "thumb-topic";
    const SUB: &str = "thumb-subscription";

    fn fast_policy(nack_ms: u64, ack_timeout_ms: u64) -> RedeliveryPolicy {
        RedeliveryPolicy {
            nack: RedeliveryBackoff::new(
                Duration::from_millis(nack_ms),
                Duration::from_millis(nack_ms * 4),
                2.0,
            ),
            ack_timeout: RedeliveryBackoff::new(
                Duration::from_millis(ack_timeout_ms),
                Duration::from_millis(ack_timeout_ms * 4),
                2.0,
            ),
        }
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let backoff = RedeliveryBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 2.0);
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        assert_eq!(backoff.delay(10), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_publish_receive_ack() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.subscribe(TOPIC, SUB, "c1").await.unwrap();

        broker.publish(TOPIC, b"one".to_vec()).await.unwrap();
        broker.publish(TOPIC, b"two".to_vec()).await.unwrap();

        let batch = consumer
            .batch_receive(10, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].payload, b"one".to_vec());
        assert_eq!(batch[0].redelivery_count, 0);
        assert_eq!(broker.pending_count(TOPIC, SUB).await, 2);

        consumer.ack_all(&batch).await.unwrap();
        assert_eq!(broker.pending_count(TOPIC, SUB).await, 0);

        let empty = consumer
            .batch_receive(10, Duration::from_millis(30))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_batch_respects_max_messages() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.subscribe(TOPIC, SUB, "c1").await.unwrap();
        for i in 0..5 {
            broker.publish(TOPIC, vec![i]).await.unwrap();
        }

        let first = consumer.batch_receive(3, Duration::from_millis(50)).await.unwrap();
        let second = consumer.batch_receive(3, Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_receive_wakes_on_publish() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.subscribe(TOPIC, SUB, "c1").await.unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(TOPIC, b"late".to_vec()).await.unwrap();
        });

        let batch = consumer
            .batch_receive(10, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_nack_redelivers_with_count() {
        let broker = InMemoryBroker::with_policy(fast_policy(10, 5_000));
        let mut consumer = broker.subscribe(TOPIC, SUB, "c1").await.unwrap();
        broker.publish(TOPIC, b"retry me".to_vec()).await.unwrap();

        let first = consumer.batch_receive(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(first[0].redelivery_count, 0);
        consumer.nack(&first[0]).await.unwrap();

        let second = consumer.batch_receive(10, Duration::from_millis(500)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].redelivery_count, 1);

        consumer.ack(&second[0].id).await.unwrap();
        assert_eq!(broker.pending_count(TOPIC, SUB).await, 0);
    }

    #[tokio::test]
    async fn test_ack_timeout_redelivers() {
        let broker = InMemoryBroker::with_policy(fast_policy(10, 30));
        let mut consumer = broker.subscribe(TOPIC, SUB, "c1").await.unwrap();
        broker.publish(TOPIC, b"forgotten".to_vec()).await.unwrap();

        let first = consumer.batch_receive(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.len(), 1);

        // Never settled; comes back after the ack timeout
        tokio::time::sleep(Duration::from_millis(60)).await;
        let second = consumer.batch_receive(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].redelivery_count, 1);
    }

    #[tokio::test]
    async fn test_subscriptions_are_independent() {
        let broker = InMemoryBroker::new();
        let mut a = broker.subscribe(TOPIC, "sub-a", "c1").await.unwrap();
        let mut b = broker.subscribe(TOPIC, "sub-b", "c1").await.unwrap();
        broker.publish(TOPIC, b"fanout".to_vec()).await.unwrap();

        let from_a = a.batch_receive(10, Duration::from_millis(50)).await.unwrap();
        let from_b = b.batch_receive(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_b.len(), 1);

        a.ack_all(&from_a).await.unwrap();
        assert_eq!(broker.pending_count(TOPIC, "sub-a").await, 0);
        assert_eq!(broker.pending_count(TOPIC, "sub-b").await, 1);
    }

    #[tokio::test]
    async fn test_unavailable_broker_fails_synchronously() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable(true);

        let result = broker.publish(TOPIC, b"x".to_vec()).await;
        assert!(matches!(result, Err(LikeBridgeError::Broker(_))));
        assert!(broker.publish_async(TOPIC, b"x".to_vec()).await.is_err());
        assert!(broker.ping().await.is_err());
        assert!(broker.published(TOPIC).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_publish_failure_surfaces_on_wait() {
        let broker = InMemoryBroker::new();
        broker.fail_async_publishes(true);

        let pending = broker.publish_async(TOPIC, b"x".to_vec()).await.unwrap();
        assert!(matches!(pending.wait().await, Err(LikeBridgeError::Delivery(_))));
        assert!(broker.published(TOPIC).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_publish_success() {
        let broker = InMemoryBroker::new();
        let pending = broker.publish_async(TOPIC, b"x".to_vec()).await.unwrap();
        let id = pending.wait().await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(broker.published(TOPIC).await, vec![b"x".to_vec()]);
    }

    #[tokio::test]
    async fn test_read_entries_are_released() {
        let broker = InMemoryBroker::with_policy(fast_policy(20, 5000));
        let mut consumer = broker.subscribe(TOPIC, SUB, "c1").await.unwrap();
        for i in 0..1000 {
            broker.publish(TOPIC, i.to_string().into_bytes()).await.unwrap();
        }

        let batch = consumer
            .batch_receive(1000, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1000);
        assert!(broker.published(TOPIC).await.is_empty());

        // Pending deliveries survive the release of the log
        consumer.nack(&batch[0]).await.unwrap();
        consumer.ack_all(&batch[1..]).await.unwrap();
        let redelivered = consumer
            .batch_receive(10, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].payload, b"0".to_vec());
        assert_eq!(redelivered[0].redelivery_count, 1);

        consumer.ack_all(&redelivered).await.unwrap();
        assert_eq!(broker.pending_count(TOPIC, SUB).await, 0);
    }

    #[tokio::test]
    async fn test_lagging_subscription_keeps_entries() {
        let broker = InMemoryBroker::new();
        let mut fast = broker.subscribe(TOPIC, SUB, "c1").await.unwrap();
        let mut slow = broker.subscribe(TOPIC, "audit", "c1").await.unwrap();
        broker.publish(TOPIC, b"a".to_vec()).await.unwrap();
        broker.publish(TOPIC, b"b".to_vec()).await.unwrap();

        fast.batch_receive(10, Duration::from_millis(100)).await.unwrap();
        assert_eq!(broker.published(TOPIC).await.len(), 2);

        let batch = slow.batch_receive(10, Duration::from_millis(100)).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(broker.published(TOPIC).await.is_empty());
    }

    #[tokio::test]
    async fn test_length_cap_drops_oldest() {
        let config = BrokerConfig {
            max_stream_len: 3,
            ..BrokerConfig::default()
        };
        let broker = InMemoryBroker::from_config(&config);
        for i in 0..5 {
            broker.publish(TOPIC, i.to_string().into_bytes()).await.unwrap();
        }
        assert_eq!(
            broker.published(TOPIC).await,
            vec![b"2".to_vec(), b"3".to_vec(), b"4".to_vec()]
        );

        let mut consumer = broker.subscribe(TOPIC, SUB, "c1").await.unwrap();
        let batch = consumer
            .batch_receive(10, Duration::from_millis(100))
            .await
            .unwrap();
        let payloads: Vec<_> = batch.into_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, vec![b"2".to_vec(), b"3".to_vec(), b"4".to_vec()]);
    }
}
