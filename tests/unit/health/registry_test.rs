// Health registry tests

use likebridge::broker::InMemoryBroker;
use likebridge::health::{
    BrokerHealthCheck, HealthRegistry, HealthStatus, KvHealthCheck, StoreHealthCheck,
};
use likebridge::kv::InMemoryKvStore;
use likebridge::store::InMemoryLikeStore;
use std::sync::Arc;

#[cfg(test)]
mod registry_tests {
    use super::*;

    struct Components {
        kv: Arc<InMemoryKvStore>,
        broker: Arc<InMemoryBroker>,
        store: Arc<InMemoryLikeStore>,
        registry: HealthRegistry,
    }

    async fn components() -> Components {
        let kv = Arc::new(InMemoryKvStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryLikeStore::new());
        let registry = HealthRegistry::new();
        registry.register(Box::new(KvHealthCheck::new(kv.clone()))).await;
        registry
            .register(Box::new(BrokerHealthCheck::new(broker.clone())))
            .await;
        registry
            .register(Box::new(StoreHealthCheck::new(store.clone())))
            .await;
        Components {
            kv,
            broker,
            store,
            registry,
        }
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let c = components().await;
        let health = c.registry.get_system_health().await;

        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.components.len(), 3);
        assert!(!health.version.is_empty());
        for name in ["kv", "broker", "store"] {
            assert_eq!(health.components[name].status, HealthStatus::Healthy);
        }
    }

    #[tokio::test]
    async fn test_one_unhealthy_component() {
        let c = components().await;
        c.broker.set_unavailable(true);

        let health = c.registry.get_system_health().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.components["broker"].status, HealthStatus::Unhealthy);
        assert!(health.components["broker"].message.is_some());
        assert_eq!(health.components["kv"].status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_component_lookup() {
        let c = components().await;
        c.kv.set_unavailable(true);
        c.store.set_unavailable(true);

        let kv = c.registry.get_component_health("kv").await.unwrap();
        assert_eq!(kv.status, HealthStatus::Unhealthy);
        let store = c.registry.get_component_health("store").await.unwrap();
        assert_eq!(store.status, HealthStatus::Unhealthy);
        assert!(c.registry.get_component_health("search").await.is_none());
    }

    #[tokio::test]
    async fn test_reregistering_replaces_check() {
        let c = components().await;
        let healthy_kv = Arc::new(InMemoryKvStore::new());
        c.kv.set_unavailable(true);
        c.registry
            .register(Box::new(KvHealthCheck::new(healthy_kv)))
            .await;

        let health = c.registry.get_system_health().await;
        assert_eq!(health.components.len(), 3);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.components["kv"].latency_ms.is_some());
    }
}
