use super::LikeStore;
use crate::error::{LikeBridgeError, Result};
use crate::models::{
    AppliedBatch, CounterDelta, LikeAction, LikeBatchPlan, LikeRelation, RelationKey,
    ToggleOutcome,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct StoreState {
    relations: BTreeMap<RelationKey, LikeRelation>,
    counts: HashMap<i64, i64>,
    next_id: i64,
}

impl StoreState {
    fn apply_deltas(&mut self, deltas: &CounterDelta) {
        for (subject, delta) in deltas {
            let count = self.counts.entry(*subject).or_insert(0);
            *count = (*count + delta).max(0);
        }
    }
}

/// Transactional in-memory store; every operation holds the write lock for
/// its whole duration.
#[derive(Debug, Default)]
pub struct InMemoryLikeStore {
    state: RwLock<StoreState>,
    unavailable: AtomicBool,
}

impl InMemoryLikeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call with a transient error until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LikeBridgeError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    /// Seed a relation and its count without going through a toggle
    pub async fn seed_relation(&self, actor_id: i64, subject_id: i64) {
        let mut state = self.state.write().await;
        let key = RelationKey::new(actor_id, subject_id);
        if state.relations.contains_key(&key) {
            return;
        }
        state.next_id += 1;
        let id = state.next_id;
        state.relations.insert(
            key,
            LikeRelation {
                id,
                actor_id,
                subject_id,
                created_at: Utc::now(),
            },
        );
        *state.counts.entry(subject_id).or_insert(0) += 1;
    }

    pub async fn relation_count(&self) -> usize {
        self.state.read().await.relations.len()
    }
}

#[async_trait]
impl LikeStore for InMemoryLikeStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.check_available()
    }

    async fn toggle(
        &self,
        actor_id: i64,
        subject_id: i64,
        action: LikeAction,
    ) -> Result<ToggleOutcome> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let key = RelationKey::new(actor_id, subject_id);

        match action {
            LikeAction::Like => {
                if state.relations.contains_key(&key) {
                    return Ok(ToggleOutcome::AlreadyInState);
                }
                state.next_id += 1;
                let id = state.next_id;
                state.relations.insert(
                    key,
                    LikeRelation {
                        id,
                        actor_id,
                        subject_id,
                        created_at: Utc::now(),
                    },
                );
                state.apply_deltas(&CounterDelta::from([(subject_id, 1)]));
                Ok(ToggleOutcome::Applied {
                    relation_id: Some(id),
                })
            }
            LikeAction::Unlike => {
                if state.relations.remove(&key).is_none() {
                    return Ok(ToggleOutcome::AlreadyInState);
                }
                state.apply_deltas(&CounterDelta::from([(subject_id, -1)]));
                Ok(ToggleOutcome::Applied { relation_id: None })
            }
        }
    }

    async fn apply_batch(&self, plan: &LikeBatchPlan) -> Result<AppliedBatch> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let mut applied = AppliedBatch::default();
        let now = Utc::now();

        for key in &plan.inserts {
            if state.relations.contains_key(key) {
                applied.skipped += 1;
                continue;
            }
            state.next_id += 1;
            let id = state.next_id;
            state.relations.insert(
                *key,
                LikeRelation {
                    id,
                    actor_id: key.actor_id,
                    subject_id: key.subject_id,
                    created_at: now,
                },
            );
            applied.inserted += 1;
            *applied.deltas.entry(key.subject_id).or_insert(0) += 1;
        }

        for key in &plan.removals {
            if state.relations.remove(key).is_none() {
                applied.skipped += 1;
                continue;
            }
            applied.removed += 1;
            *applied.deltas.entry(key.subject_id).or_insert(0) -= 1;
        }

        applied.deltas.retain(|_, delta| *delta != 0);
        state.apply_deltas(&applied.deltas);
        Ok(applied)
    }

    async fn batch_update_counter(&self, deltas: &CounterDelta) -> Result<()> {
        self.check_available()?;
        self.state.write().await.apply_deltas(deltas);
        Ok(())
    }

    async fn liked_subjects(&self, actor_id: i64) -> Result<BTreeSet<i64>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .relations
            .range(RelationKey::new(actor_id, i64::MIN)..=RelationKey::new(actor_id, i64::MAX))
            .map(|(key, _)| key.subject_id)
            .collect())
    }

    async fn actors_of_subject(&self, subject_id: i64, limit: usize) -> Result<Vec<i64>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut relations: Vec<&LikeRelation> = state
            .relations
            .values()
            .filter(|relation| relation.subject_id == subject_id)
            .collect();
        relations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(relations
            .into_iter()
            .take(limit)
            .map(|relation| relation.actor_id)
            .collect())
    }

    async fn has_relation(&self, actor_id: i64, subject_id: i64) -> Result<bool> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .relations
            .contains_key(&RelationKey::new(actor_id, subject_id)))
    }

    async fn like_count(&self, subject_id: i64) -> Result<i64> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.counts.get(&subject_id).copied().unwrap_or(0))
    }

    async fn is_healthy(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}
