//! In-process caches in front of the fast tier.
//!
//! [`LocalCounterCache`] counts hits per time window without a network round
//! trip and pushes the latest window values downstream on a schedule.

mod access_guard;
mod counter_consumer;
mod relation_cache;
mod sink;

pub use access_guard::{AccessDecision, AccessGuard};
pub use counter_consumer::{CounterSyncConsumer, CounterSyncStats};
pub use relation_cache::RelationCache;
pub use sink::{BrokerCounterSink, CounterSink, KvCounterSink};

use crate::config::CounterCacheConfig;
use crate::error::{LikeBridgeError, Result};
use crate::kv::KeyValueStore;
use crate::models::CounterSyncRecord;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
struct CounterEntry {
    value: i64,
    last_write: Instant,
    ttl: Duration,
}

impl CounterEntry {
    fn is_idle(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_write) >= self.ttl
    }
}

/// Outcome of one flush sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: usize,
    pub evicted: usize,
}

/// Time-windowed counters held in process.
///
/// Each increment lands in `"{key}:{window}"` where the window is the current
/// epoch second divided by the interval. Written windows are marked dirty and
/// the flush loop emits their latest values to a [`CounterSink`]. Windows
/// idle past their TTL are dropped once flushed.
pub struct LocalCounterCache {
    entries: DashMap<String, CounterEntry>,
    dirty: DashSet<String>,
    interval: Duration,
    ttl: Duration,
    max_entries: usize,
    sink: Arc<dyn CounterSink>,
    seed: Option<Arc<dyn KeyValueStore>>,
}

impl LocalCounterCache {
    pub fn new(sink: Arc<dyn CounterSink>, interval: Duration, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            dirty: DashSet::new(),
            interval,
            ttl,
            max_entries: usize::MAX,
            sink,
            seed: None,
        }
    }

    pub fn from_config(config: &CounterCacheConfig, sink: Arc<dyn CounterSink>) -> Self {
        Self::new(
            sink,
            Duration::from_secs(config.interval_secs),
            Duration::from_secs(config.ttl_secs),
        )
        .with_max_entries(config.max_entries)
    }

    /// Seed windows missing locally from the value already in the store
    pub fn with_seed(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.seed = Some(store);
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Count one hit for `key` in the current window and return the window total
    pub async fn increment(&self, key: &str) -> Result<i64> {
        self.increment_with(key, self.interval, self.ttl).await
    }

    pub async fn increment_with(&self, key: &str, interval: Duration, ttl: Duration) -> Result<i64> {
        if key.trim().is_empty() {
            return Err(LikeBridgeError::InvalidParameter(
                "counter key must not be blank".to_string(),
            ));
        }

        let window_key = window_key(key, chrono::Utc::now().timestamp(), interval);

        // Seed outside the map so no shard lock is held across the await
        let initial = if self.entries.contains_key(&window_key) {
            0
        } else {
            self.seed_value(&window_key).await
        };

        let now = Instant::now();
        let value = {
            let mut entry = self
                .entries
                .entry(window_key.clone())
                .or_insert_with(|| CounterEntry {
                    value: initial,
                    last_write: now,
                    ttl,
                });
            entry.value += 1;
            entry.last_write = now;
            entry.ttl = ttl;
            entry.value
        };

        self.dirty.insert(window_key);
        Ok(value)
    }

    async fn seed_value(&self, window_key: &str) -> i64 {
        let Some(store) = &self.seed else {
            return 0;
        };
        match store.get(window_key).await {
            Ok(Some(raw)) => raw.parse::<i64>().unwrap_or_else(|_| {
                warn!("Ignoring non-numeric counter value {:?} at {}", raw, window_key);
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!("Could not seed counter {} from store: {}", window_key, e);
                0
            }
        }
    }

    /// Current local value of a window key
    pub fn get(&self, window_key: &str) -> Option<i64> {
        self.entries.get(window_key).map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Emit every dirty window's latest value, then evict idle windows.
    ///
    /// On a sink failure the drained keys are marked dirty again and kept.
    pub async fn flush(&self) -> Result<FlushReport> {
        let keys: Vec<String> = self.dirty.iter().map(|key| key.key().clone()).collect();
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            self.dirty.remove(&key);
            if let Some(entry) = self.entries.get(&key) {
                records.push(CounterSyncRecord::new(key.clone(), entry.value));
            }
        }

        let mut result = Ok(records.len());
        if !records.is_empty() {
            match self.sink.write(&records).await {
                Ok(()) => {
                    crate::metrics::record_counter_flush(self.sink.name(), "success", records.len());
                    debug!("Flushed {} counter windows to {}", records.len(), self.sink.name());
                }
                Err(e) => {
                    crate::metrics::record_counter_flush(self.sink.name(), "failure", 0);
                    for record in &records {
                        self.dirty.insert(record.key.clone());
                    }
                    result = Err(e);
                }
            }
        }

        let evicted = self.evict_idle();
        crate::metrics::update_counter_cache_entries(self.entries.len(), self.dirty.len());

        result.map(|flushed| FlushReport { flushed, evicted })
    }

    fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|key, entry| !entry.is_idle(now) || self.dirty.contains(key));

        if self.entries.len() > self.max_entries {
            let mut clean: Vec<(String, Instant)> = self
                .entries
                .iter()
                .filter(|entry| !self.dirty.contains(entry.key()))
                .map(|entry| (entry.key().clone(), entry.last_write))
                .collect();
            clean.sort_by_key(|(_, last_write)| *last_write);
            let excess = self.entries.len() - self.max_entries;
            for (key, _) in clean.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }

        before.saturating_sub(self.entries.len())
    }

    /// Flush on a fixed schedule until shutdown, then flush once more
    pub async fn run_flush_loop(
        self: Arc<Self>,
        flush_interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(
            "Counter flush loop started (every {}ms, sink {})",
            flush_interval.as_millis(),
            self.sink.name()
        );
        let mut timer = interval(flush_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.reset();

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.flush().await {
                        warn!("Counter flush failed, will retry next cycle: {}", e);
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutting down counter flush loop");
                        if let Err(e) = self.flush().await {
                            error!("Final counter flush failed: {}", e);
                        }
                        break;
                    }
                }
            }
        }
    }
}

/// `"{key}:{epoch_secs / interval}"`
pub fn window_key(key: &str, epoch_secs: i64, interval: Duration) -> String {
    let width = interval.as_secs().max(1) as i64;
    format!("{}:{}", key, epoch_secs.div_euclid(width))
}
