use crate::broker::EventBroker;
use crate::error::retry::{with_retry, RetryConfig};
use crate::error::Result;
use crate::kv::{KeyScheme, KeyValueStore};
use crate::models::{LikeEvent, LikeEventKind, ReconciliationDiff};
use crate::store::LikeStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub actors_scanned: usize,
    /// Keys under the prefix that are not relation mirrors
    pub keys_skipped: usize,
    pub corrections_emitted: usize,
    pub failures: usize,
    pub duration: Duration,
}

/// Compares each actor's fast-tier mirror with the authoritative store and
/// re-emits INCR events for likes the store is missing.
///
/// Takes no locks: a like in flight during the sweep is at worst emitted
/// twice, and the processor drops the redundant insert.
pub struct ReconciliationJob {
    kv: Arc<dyn KeyValueStore>,
    store: Arc<dyn LikeStore>,
    broker: Arc<dyn EventBroker>,
    keys: KeyScheme,
    topic: String,
    scan_count: usize,
    retry: RetryConfig,
}

impl ReconciliationJob {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        store: Arc<dyn LikeStore>,
        broker: Arc<dyn EventBroker>,
        keys: KeyScheme,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            kv,
            store,
            broker,
            keys,
            topic: topic.into(),
            scan_count: 1000,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sweep every relation mirror once
    pub async fn run_once(&self) -> Result<ReconciliationReport> {
        let started = Instant::now();
        let mut report = ReconciliationReport::default();

        let keys = self
            .kv
            .scan_keys(&self.keys.relation_pattern(), self.scan_count)
            .await?;
        info!("Reconciliation scanning {} keys", keys.len());

        for key in keys {
            let Some(actor_id) = self.keys.parse_actor_id(&key) else {
                debug!("Skipping non-relation key {}", key);
                report.keys_skipped += 1;
                continue;
            };
            report.actors_scanned += 1;

            match self.reconcile_actor(actor_id, &key).await {
                Ok(emitted) => report.corrections_emitted += emitted,
                Err(e) => {
                    error!("Reconciliation failed for actor {}: {}", actor_id, e);
                    report.failures += 1;
                }
            }
        }

        report.duration = started.elapsed();
        crate::metrics::record_job_duration("reconciliation", report.duration);
        info!(
            "Reconciliation finished in {:?}: {} actors, {} corrections, {} failures",
            report.duration, report.actors_scanned, report.corrections_emitted, report.failures
        );
        Ok(report)
    }

    async fn reconcile_actor(&self, actor_id: i64, key: &str) -> Result<usize> {
        let fast_set: BTreeSet<i64> = self
            .kv
            .hkeys(key)
            .await?
            .into_iter()
            .filter_map(|field| match field.parse::<i64>() {
                Ok(subject_id) if subject_id > 0 => Some(subject_id),
                _ => {
                    warn!("Ignoring invalid subject field {:?} in {}", field, key);
                    None
                }
            })
            .collect();
        if fast_set.is_empty() {
            return Ok(0);
        }

        let authoritative_set = self.store.liked_subjects(actor_id).await?;
        let diff = ReconciliationDiff::compute(actor_id, &fast_set, &authoritative_set);
        if diff.is_empty() {
            return Ok(0);
        }

        info!(
            "Actor {} has {} likes missing from the store: {:?}",
            actor_id,
            diff.missing.len(),
            diff.missing
        );

        let mut emitted = 0;
        for subject_id in &diff.missing {
            let payload = LikeEvent::new(actor_id, *subject_id, LikeEventKind::Incr).encode()?;
            let broker = self.broker.clone();
            let topic = self.topic.clone();
            let published = with_retry(&self.retry, "publish reconciliation event", || {
                let broker = broker.clone();
                let topic = topic.clone();
                let payload = payload.clone();
                async move { broker.publish(&topic, payload).await }
            })
            .await;

            match published {
                Ok(_) => {
                    crate::metrics::record_publish(&self.topic, "success");
                    crate::metrics::record_reconciliation_corrections("emitted", 1);
                    emitted += 1;
                }
                Err(e) => {
                    crate::metrics::record_publish(&self.topic, "failure");
                    crate::metrics::record_reconciliation_corrections("failed", 1);
                    return Err(e);
                }
            }
        }

        Ok(emitted)
    }
}
