// Reconciliation sweep tests

use likebridge::broker::{BrokerConsumer, EventBroker, InMemoryBroker};
use likebridge::config::BrokerConfig;
use likebridge::dlq::{DeadLetterQueue, InMemoryDlqStorage};
use likebridge::error::retry::RetryConfig;
use likebridge::jobs::ReconciliationJob;
use likebridge::kv::{InMemoryKvStore, KeyScheme, KeyValueStore};
use likebridge::models::{LikeEvent, LikeEventKind};
use likebridge::processor::LikeEventProcessor;
use likebridge::store::{InMemoryLikeStore, LikeStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod reconciliation_tests {
    use super::*;

    const TOPIC: &str = "thumb-topic";

    fn no_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 0,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            multiplier: 1.0,
            jitter: false,
        }
    }

    fn job(
        kv: &Arc<InMemoryKvStore>,
        store: &Arc<InMemoryLikeStore>,
        broker: &Arc<InMemoryBroker>,
    ) -> ReconciliationJob {
        ReconciliationJob::new(
            kv.clone(),
            store.clone(),
            broker.clone(),
            KeyScheme::new("thumb"),
            TOPIC,
        )
        .with_retry(no_retry())
    }

    async fn mirror(kv: &InMemoryKvStore, actor: i64, subjects: &[i64]) {
        for subject in subjects {
            kv.hset(&format!("thumb:{}", actor), &subject.to_string(), "1")
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_missing_like_reemitted() {
        let kv = Arc::new(InMemoryKvStore::new());
        let store = Arc::new(InMemoryLikeStore::new());
        let broker = Arc::new(InMemoryBroker::new());

        mirror(&kv, 7, &[3, 4, 5]).await;
        store.seed_relation(7, 3).await;
        store.seed_relation(7, 4).await;

        let report = job(&kv, &store, &broker).run_once().await.unwrap();
        assert_eq!(report.actors_scanned, 1);
        assert_eq!(report.corrections_emitted, 1);
        assert_eq!(report.failures, 0);

        let published = broker.published(TOPIC).await;
        assert_eq!(published.len(), 1);
        let event = LikeEvent::decode(&published[0]).unwrap();
        assert_eq!((event.actor_id, event.subject_id), (7, 5));
        assert_eq!(event.kind, LikeEventKind::Incr);
    }

    #[tokio::test]
    async fn test_store_converges_after_processing() {
        let kv = Arc::new(InMemoryKvStore::new());
        let store = Arc::new(InMemoryLikeStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let config = BrokerConfig::default();
        let mut consumer = broker
            .subscribe(&config.like_topic, &config.like_subscription, "test")
            .await
            .unwrap();

        mirror(&kv, 7, &[3, 4, 5]).await;
        store.seed_relation(7, 3).await;
        store.seed_relation(7, 4).await;
        job(&kv, &store, &broker).run_once().await.unwrap();

        let dlq = Arc::new(DeadLetterQueue::new(Arc::new(InMemoryDlqStorage::new())));
        let processor = LikeEventProcessor::new(store.clone(), dlq, &config);
        let messages = consumer
            .batch_receive(100, Duration::from_millis(50))
            .await
            .unwrap();
        processor
            .process_batch(consumer.as_mut(), messages)
            .await
            .unwrap();

        assert_eq!(
            store.liked_subjects(7).await.unwrap(),
            BTreeSet::from([3, 4, 5])
        );

        // A second sweep finds nothing to do
        let report = job(&kv, &store, &broker).run_once().await.unwrap();
        assert_eq!(report.corrections_emitted, 0);
    }

    #[tokio::test]
    async fn test_ledger_keys_skipped() {
        let kv = Arc::new(InMemoryKvStore::new());
        let store = Arc::new(InMemoryLikeStore::new());
        let broker = Arc::new(InMemoryBroker::new());

        kv.hset("thumb:temp:1700000000", "7:5", "1").await.unwrap();
        mirror(&kv, 7, &[5]).await;
        store.seed_relation(7, 5).await;

        let report = job(&kv, &store, &broker).run_once().await.unwrap();
        assert_eq!(report.actors_scanned, 1);
        assert_eq!(report.keys_skipped, 1);
        assert_eq!(report.corrections_emitted, 0);
        assert!(broker.published(TOPIC).await.is_empty());
    }

    #[tokio::test]
    async fn test_store_only_likes_left_alone() {
        let kv = Arc::new(InMemoryKvStore::new());
        let store = Arc::new(InMemoryLikeStore::new());
        let broker = Arc::new(InMemoryBroker::new());

        mirror(&kv, 7, &[3]).await;
        store.seed_relation(7, 3).await;
        store.seed_relation(7, 9).await;

        let report = job(&kv, &store, &broker).run_once().await.unwrap();
        assert_eq!(report.corrections_emitted, 0);
    }

    #[tokio::test]
    async fn test_failure_counted_and_sweep_continues() {
        let kv = Arc::new(InMemoryKvStore::new());
        let store = Arc::new(InMemoryLikeStore::new());
        let broker = Arc::new(InMemoryBroker::new());

        mirror(&kv, 7, &[3]).await;
        mirror(&kv, 8, &[4]).await;
        broker.set_unavailable(true);

        let report = job(&kv, &store, &broker).run_once().await.unwrap();
        assert_eq!(report.actors_scanned, 2);
        assert_eq!(report.failures, 2);
        assert_eq!(report.corrections_emitted, 0);
    }
}
