// Local windowed counter cache tests

use likebridge::cache::{window_key, KvCounterSink, LocalCounterCache};
use likebridge::error::LikeBridgeError;
use likebridge::kv::{InMemoryKvStore, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[cfg(test)]
mod counter_cache_tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn cache_with(kv: Arc<InMemoryKvStore>, ttl: Duration) -> LocalCounterCache {
        let sink = Arc::new(KvCounterSink::new(kv, Duration::from_secs(60)));
        LocalCounterCache::new(sink, HOUR, ttl)
    }

    fn current_window(key: &str) -> String {
        window_key(key, chrono::Utc::now().timestamp(), HOUR)
    }

    #[test]
    fn test_window_key_format() {
        assert_eq!(window_key("view:1", 125, Duration::from_secs(60)), "view:1:2");
        assert_eq!(window_key("view:1", 59, Duration::from_secs(60)), "view:1:0");
    }

    #[tokio::test]
    async fn test_increment_counts_in_window() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = cache_with(kv, HOUR);

        assert_eq!(cache.increment("view:1").await.unwrap(), 1);
        assert_eq!(cache.increment("view:1").await.unwrap(), 2);
        assert_eq!(cache.increment("view:2").await.unwrap(), 1);
        assert_eq!(cache.increment("view:1").await.unwrap(), 3);

        assert_eq!(cache.get(&current_window("view:1")), Some(3));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.dirty_count(), 2);
    }

    #[tokio::test]
    async fn test_increment_with_uses_own_window() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = cache_with(kv, HOUR);
        let minute = Duration::from_secs(60);

        assert_eq!(cache.increment("view:1").await.unwrap(), 1);
        assert_eq!(
            cache.increment_with("view:1", minute, minute).await.unwrap(),
            1
        );

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&current_window("view:1")), Some(1));
    }

    #[tokio::test]
    async fn test_blank_key_rejected() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = cache_with(kv, HOUR);
        let result = cache.increment("  ").await;
        assert!(matches!(result, Err(LikeBridgeError::InvalidParameter(_))));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_flush_emits_latest_value_once() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = cache_with(kv.clone(), HOUR);
        for _ in 0..3 {
            cache.increment("view:1").await.unwrap();
        }

        let report = cache.flush().await.unwrap();
        assert_eq!(report.flushed, 1);
        assert_eq!(report.evicted, 0);
        assert_eq!(cache.dirty_count(), 0);
        assert_eq!(
            kv.get(&current_window("view:1")).await.unwrap(),
            Some("3".to_string())
        );

        // Nothing changed since the last flush
        assert_eq!(cache.flush().await.unwrap().flushed, 0);
    }

    #[tokio::test]
    async fn test_idle_window_flushed_before_eviction() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = cache_with(kv.clone(), Duration::from_millis(50));
        for _ in 0..3 {
            cache.increment("view:1").await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        let report = cache.flush().await.unwrap();
        assert_eq!(report.flushed, 1);
        assert_eq!(report.evicted, 1);
        assert!(cache.is_empty());
        assert_eq!(
            kv.get(&current_window("view:1")).await.unwrap(),
            Some("3".to_string())
        );
    }

    #[tokio::test]
    async fn test_eviction_never_emits() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = cache_with(kv.clone(), Duration::from_millis(50));
        cache.increment("view:1").await.unwrap();
        assert_eq!(cache.flush().await.unwrap().flushed, 1);

        kv.set(&current_window("view:1"), "99", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let report = cache.flush().await.unwrap();
        assert_eq!(report.flushed, 0);
        assert_eq!(report.evicted, 1);
        assert_eq!(
            kv.get(&current_window("view:1")).await.unwrap(),
            Some("99".to_string())
        );
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_window_dirty() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = cache_with(kv.clone(), Duration::from_millis(50));
        cache.increment("view:1").await.unwrap();
        cache.increment("view:1").await.unwrap();

        kv.set_unavailable(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.flush().await.is_err());
        // Idle but unflushed, so still held
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.dirty_count(), 1);

        kv.set_unavailable(false);
        let report = cache.flush().await.unwrap();
        assert_eq!(report.flushed, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(
            kv.get(&current_window("view:1")).await.unwrap(),
            Some("2".to_string())
        );
    }

    #[tokio::test]
    async fn test_seed_from_store() {
        let kv = Arc::new(InMemoryKvStore::new());
        kv.set(&current_window("view:1"), "41", None).await.unwrap();

        let cache = cache_with(kv.clone(), HOUR).with_seed(kv.clone());
        assert_eq!(cache.increment("view:1").await.unwrap(), 42);
        assert_eq!(cache.increment("view:1").await.unwrap(), 43);
    }

    #[tokio::test]
    async fn test_max_entries_drops_clean_windows() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = cache_with(kv, HOUR).with_max_entries(2);
        for key in ["a", "b", "c"] {
            cache.increment(key).await.unwrap();
        }

        // All dirty: emitted first, then trimmed to the bound
        let report = cache.flush().await.unwrap();
        assert_eq!(report.flushed, 3);
        assert_eq!(report.evicted, 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_loop_flushes_on_shutdown() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = Arc::new(cache_with(kv.clone(), HOUR));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(
            cache
                .clone()
                .run_flush_loop(Duration::from_secs(3600), shutdown_rx),
        );

        cache.increment("view:1").await.unwrap();
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(
            kv.get(&current_window("view:1")).await.unwrap(),
            Some("1".to_string())
        );
    }

    #[tokio::test]
    async fn test_flush_loop_runs_on_schedule() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = Arc::new(cache_with(kv.clone(), HOUR));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        cache.increment("view:1").await.unwrap();
        let handle = tokio::spawn(
            cache
                .clone()
                .run_flush_loop(Duration::from_millis(20), shutdown_rx),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.dirty_count(), 0);
        assert_eq!(
            kv.get(&current_window("view:1")).await.unwrap(),
            Some("1".to_string())
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
