// Hot subject relation cache tests

use async_trait::async_trait;
use likebridge::cache::RelationCache;
use likebridge::config::RelationCacheConfig;
use likebridge::error::Result;
use likebridge::models::{AppliedBatch, CounterDelta, LikeAction, LikeBatchPlan, ToggleOutcome};
use likebridge::store::{InMemoryLikeStore, LikeStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod relation_cache_tests {
    use super::*;

    /// Store whose actor set reads take a while
    struct SlowLoadStore {
        inner: InMemoryLikeStore,
        delay: Duration,
    }

    #[async_trait]
    impl LikeStore for SlowLoadStore {
        async fn ensure_schema(&self) -> Result<()> {
            self.inner.ensure_schema().await
        }

        async fn toggle(
            &self,
            actor_id: i64,
            subject_id: i64,
            action: LikeAction,
        ) -> Result<ToggleOutcome> {
            self.inner.toggle(actor_id, subject_id, action).await
        }

        async fn apply_batch(&self, plan: &LikeBatchPlan) -> Result<AppliedBatch> {
            self.inner.apply_batch(plan).await
        }

        async fn batch_update_counter(&self, deltas: &CounterDelta) -> Result<()> {
            self.inner.batch_update_counter(deltas).await
        }

        async fn liked_subjects(&self, actor_id: i64) -> Result<BTreeSet<i64>> {
            self.inner.liked_subjects(actor_id).await
        }

        async fn actors_of_subject(&self, subject_id: i64, limit: usize) -> Result<Vec<i64>> {
            let actors = self.inner.actors_of_subject(subject_id, limit).await;
            tokio::time::sleep(self.delay).await;
            actors
        }

        async fn has_relation(&self, actor_id: i64, subject_id: i64) -> Result<bool> {
            self.inner.has_relation(actor_id, subject_id).await
        }

        async fn like_count(&self, subject_id: i64) -> Result<i64> {
            self.inner.like_count(subject_id).await
        }

        async fn is_healthy(&self) -> bool {
            self.inner.is_healthy().await
        }
    }

    fn config(hot_threshold: u64, max_entries: usize) -> RelationCacheConfig {
        RelationCacheConfig {
            enabled: true,
            max_entries,
            ttl_secs: 300,
            hot_threshold,
            decay_secs: 60,
        }
    }

    async fn seeded_store() -> Arc<InMemoryLikeStore> {
        let store = Arc::new(InMemoryLikeStore::new());
        store.seed_relation(1, 10).await;
        store.seed_relation(2, 10).await;
        store.seed_relation(1, 20).await;
        store
    }

    #[tokio::test]
    async fn test_cold_subject_is_not_answered() {
        let store = seeded_store().await;
        let cache = RelationCache::new(store, config(3, 10));

        assert_eq!(cache.contains(1, 10).await.unwrap(), None);
        assert_eq!(cache.contains(1, 10).await.unwrap(), None);
        assert!(!cache.is_cached(10));
    }

    #[tokio::test]
    async fn test_hot_subject_loaded_and_answered() {
        let store = seeded_store().await;
        let cache = RelationCache::new(store, config(3, 10));

        cache.contains(1, 10).await.unwrap();
        cache.contains(1, 10).await.unwrap();
        assert_eq!(cache.contains(1, 10).await.unwrap(), Some(true));
        assert!(cache.is_cached(10));

        // Complete actor set, so absence is a definite no
        assert_eq!(cache.contains(9, 10).await.unwrap(), Some(false));
        assert_eq!(cache.contains(2, 10).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_toggle_updates_cached_set() {
        let store = seeded_store().await;
        let cache = RelationCache::new(store, config(1, 10));
        assert_eq!(cache.contains(9, 10).await.unwrap(), Some(false));

        cache.apply_toggle(9, 10, true);
        assert_eq!(cache.contains(9, 10).await.unwrap(), Some(true));

        cache.apply_toggle(1, 10, false);
        assert_eq!(cache.contains(1, 10).await.unwrap(), Some(false));

        // Uncached subjects are left alone
        cache.apply_toggle(9, 30, true);
        assert!(!cache.is_cached(30));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let store = seeded_store().await;
        let cache = RelationCache::new(store, config(1, 10));
        cache.contains(1, 10).await.unwrap();
        assert!(cache.is_cached(10));

        cache.invalidate(10);
        assert!(!cache.is_cached(10));
    }

    #[tokio::test]
    async fn test_bounded_entries() {
        let store = seeded_store().await;
        let cache = RelationCache::new(store, config(1, 1));

        cache.contains(1, 10).await.unwrap();
        cache.contains(1, 20).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.is_cached(20));
    }

    #[tokio::test]
    async fn test_disabled_cache_never_answers() {
        let store = seeded_store().await;
        let mut disabled = config(1, 10);
        disabled.enabled = false;
        let cache = RelationCache::new(store, disabled);

        for _ in 0..5 {
            assert_eq!(cache.contains(1, 10).await.unwrap(), None);
        }
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let store = seeded_store().await;
        store.set_unavailable(true);
        let cache = RelationCache::new(store.clone() as Arc<dyn LikeStore>, config(1, 10));
        assert!(cache.contains(1, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_set_loaded_across_a_toggle_is_discarded() {
        let store = Arc::new(SlowLoadStore {
            inner: InMemoryLikeStore::new(),
            delay: Duration::from_millis(200),
        });
        let cache = RelationCache::new(store.clone(), config(1, 10));

        // Actor 1 likes subject 10 while the actor set is being read
        let (lookup, toggled) = tokio::join!(cache.contains(2, 10), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let outcome = store.toggle(1, 10, LikeAction::Like).await.unwrap();
            cache.apply_toggle(1, 10, true);
            outcome
        });
        assert!(matches!(toggled, ToggleOutcome::Applied { .. }));
        assert_eq!(lookup.unwrap(), None);
        assert!(!cache.is_cached(10));

        // The next hot lookup reloads and sees the like
        assert_eq!(cache.contains(1, 10).await.unwrap(), Some(true));
        assert!(store.has_relation(1, 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_toggle_of_other_subject_keeps_load() {
        let store = Arc::new(SlowLoadStore {
            inner: InMemoryLikeStore::new(),
            delay: Duration::from_millis(100),
        });
        store.inner.seed_relation(2, 10).await;
        let cache = RelationCache::new(store.clone(), config(1, 10));

        let (lookup, _) = tokio::join!(cache.contains(2, 10), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cache.apply_toggle(1, 20, true);
        });
        assert_eq!(lookup.unwrap(), Some(true));
        assert!(cache.is_cached(10));
    }
}
