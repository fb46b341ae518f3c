// Event-sourced strategy tests

use likebridge::broker::InMemoryBroker;
use likebridge::error::LikeBridgeError;
use likebridge::kv::{InMemoryKvStore, KeyScheme, KeyValueStore};
use likebridge::models::{LikeEvent, LikeEventKind};
use likebridge::service::{EventSourcedLikeService, LikeService};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod event_sourced_tests {
    use super::*;

    const TOPIC: &str = "thumb-topic";

    fn service(kv: &Arc<InMemoryKvStore>, broker: &Arc<InMemoryBroker>) -> EventSourcedLikeService {
        EventSourcedLikeService::new(
            kv.clone(),
            broker.clone(),
            KeyScheme::new("thumb"),
            TOPIC.to_string(),
        )
    }

    async fn events(broker: &InMemoryBroker) -> Vec<LikeEvent> {
        broker
            .published(TOPIC)
            .await
            .iter()
            .map(|payload| LikeEvent::decode(payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_like_publishes_incr() {
        let kv = Arc::new(InMemoryKvStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let service = service(&kv, &broker);

        assert!(service.like(1, 10).await.unwrap());
        assert!(service.has_liked(1, 10).await.unwrap());

        let published = events(&broker).await;
        assert_eq!(published.len(), 1);
        assert_eq!((published[0].actor_id, published[0].subject_id), (1, 10));
        assert_eq!(published[0].kind, LikeEventKind::Incr);
    }

    #[tokio::test]
    async fn test_unlike_publishes_decr() {
        let kv = Arc::new(InMemoryKvStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let service = service(&kv, &broker);

        service.like(1, 10).await.unwrap();
        assert!(service.unlike(1, 10).await.unwrap());
        assert!(!service.has_liked(1, 10).await.unwrap());

        let published = events(&broker).await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].kind, LikeEventKind::Decr);
        assert!(published[0].event_time <= published[1].event_time);
    }

    #[tokio::test]
    async fn test_conflicts_publish_nothing() {
        let kv = Arc::new(InMemoryKvStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let service = service(&kv, &broker);

        assert!(matches!(
            service.unlike(1, 10).await,
            Err(LikeBridgeError::Conflict(_))
        ));
        service.like(1, 10).await.unwrap();
        assert!(matches!(
            service.like(1, 10).await,
            Err(LikeBridgeError::Conflict(_))
        ));
        assert_eq!(events(&broker).await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_refused_rolls_back_mark() {
        let kv = Arc::new(InMemoryKvStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let service = service(&kv, &broker);
        broker.set_unavailable(true);

        assert!(matches!(
            service.like(1, 10).await,
            Err(LikeBridgeError::Delivery(_))
        ));
        assert!(!kv.hexists("thumb:1", "10").await.unwrap());

        // The mark is restored, so a retry can succeed
        broker.set_unavailable(false);
        assert!(service.like(1, 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlike_refused_restores_mark() {
        let kv = Arc::new(InMemoryKvStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let service = service(&kv, &broker);

        service.like(1, 10).await.unwrap();
        broker.set_unavailable(true);
        assert!(service.unlike(1, 10).await.is_err());
        assert!(kv.hexists("thumb:1", "10").await.unwrap());
    }

    #[tokio::test]
    async fn test_async_delivery_failure_rolls_back() {
        let kv = Arc::new(InMemoryKvStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let service = service(&kv, &broker);
        broker.fail_async_publishes(true);

        // Accepted by the broker, so the call itself succeeds
        assert!(service.like(1, 10).await.unwrap());

        let mut marked = true;
        for _ in 0..50 {
            marked = kv.hexists("thumb:1", "10").await.unwrap();
            if !marked {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!marked);
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected() {
        let kv = Arc::new(InMemoryKvStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        assert!(matches!(
            service(&kv, &broker).like(1, 0).await,
            Err(LikeBridgeError::InvalidParameter(_))
        ));
        assert!(events(&broker).await.is_empty());
    }
}
