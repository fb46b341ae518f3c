use crate::error::Result;
use crate::kv::keys::{parse_ledger_field, time_slice};
use crate::kv::{KeyScheme, KeyValueStore};
use crate::models::LikeBatchPlan;
use crate::store::LikeStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSyncReport {
    pub slices_synced: usize,
    pub slices_failed: usize,
    pub inserted: usize,
    pub removed: usize,
    /// Fields whose like and unlike cancelled out
    pub ignored: usize,
    /// Fields with an unparseable name or a net outside -1..=1
    pub anomalies: usize,
}

/// Moves closed temp ledger slices written by the atomic-script strategy
/// into the authoritative store.
pub struct LedgerSyncJob {
    kv: Arc<dyn KeyValueStore>,
    store: Arc<dyn LikeStore>,
    keys: KeyScheme,
    slice_secs: u64,
    scan_count: usize,
}

impl LedgerSyncJob {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        store: Arc<dyn LikeStore>,
        keys: KeyScheme,
        slice_secs: u64,
    ) -> Self {
        Self {
            kv,
            store,
            keys,
            slice_secs,
            scan_count: 1000,
        }
    }

    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count.max(1);
        self
    }

    pub async fn run_once(&self) -> Result<LedgerSyncReport> {
        self.run_once_at(chrono::Utc::now().timestamp()).await
    }

    /// Sync every slice that closed before the slice containing `now_secs`
    pub async fn run_once_at(&self, now_secs: i64) -> Result<LedgerSyncReport> {
        let started = Instant::now();
        let current = time_slice(now_secs, self.slice_secs);
        let mut report = LedgerSyncReport::default();

        let mut slices: Vec<(i64, String)> = self
            .kv
            .scan_keys(&self.keys.temp_ledger_pattern(), self.scan_count)
            .await?
            .into_iter()
            .filter_map(|key| {
                let slice = self.keys.parse_ledger_slice(&key)?;
                (slice < current).then_some((slice, key))
            })
            .collect();
        slices.sort();

        for (slice, key) in slices {
            match self.sync_slice(&key, &mut report).await {
                Ok(()) => report.slices_synced += 1,
                Err(e) => {
                    warn!("Ledger slice {} not synced, keeping it for the next run: {}", slice, e);
                    report.slices_failed += 1;
                }
            }
        }

        crate::metrics::record_job_duration("ledger_sync", started.elapsed());
        if report.slices_synced > 0 || report.slices_failed > 0 {
            info!(
                "Ledger sync: {} slices synced, {} failed, {} inserted, {} removed",
                report.slices_synced, report.slices_failed, report.inserted, report.removed
            );
        }
        Ok(report)
    }

    async fn sync_slice(&self, key: &str, report: &mut LedgerSyncReport) -> Result<()> {
        let fields = self.kv.hgetall(key).await?;
        let mut plan = LikeBatchPlan::new();
        let mut ignored = 0;
        let mut anomalies = 0;

        for (field, raw) in &fields {
            let Some(relation) = parse_ledger_field(field) else {
                warn!("Anomalous ledger field {:?} in {}", field, key);
                anomalies += 1;
                continue;
            };
            match raw.parse::<i64>() {
                Ok(1) => plan.insert(relation),
                Ok(-1) => plan.remove(relation),
                Ok(0) => ignored += 1,
                _ => {
                    warn!("Anomalous ledger value {:?} for {} in {}", raw, field, key);
                    anomalies += 1;
                }
            }
        }

        let applied = self.store.apply_batch(&plan).await?;
        self.kv.delete(key).await?;

        debug!(
            "Synced ledger {}: {} inserted, {} removed, {} skipped",
            key, applied.inserted, applied.removed, applied.skipped
        );
        report.inserted += applied.inserted;
        report.removed += applied.removed;
        report.ignored += ignored;
        report.anomalies += anomalies;
        crate::metrics::record_ledger_sync_records("inserted", applied.inserted);
        crate::metrics::record_ledger_sync_records("removed", applied.removed);
        crate::metrics::record_ledger_sync_records("ignored", ignored);
        crate::metrics::record_ledger_sync_records("anomalous", anomalies);
        Ok(())
    }
}
