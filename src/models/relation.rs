use super::RelationKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Signed like-count changes per subject, accumulated over one batch
pub type CounterDelta = BTreeMap<i64, i64>;

/// A persisted like relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeRelation {
    pub id: i64,
    pub actor_id: i64,
    pub subject_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LikeAction {
    Like,
    Unlike,
}

impl LikeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeAction::Like => "like",
            LikeAction::Unlike => "unlike",
        }
    }
}

/// Result of a locked toggle against the authoritative store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The relation changed. Carries the relation id for a like.
    Applied { relation_id: Option<i64> },
    /// The relation was already in the requested state
    AlreadyInState,
}

/// Relation changes resolved from a batch, before the store filters them
/// against existing rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LikeBatchPlan {
    pub inserts: BTreeSet<RelationKey>,
    pub removals: BTreeSet<RelationKey>,
}

impl LikeBatchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: RelationKey) {
        self.removals.remove(&key);
        self.inserts.insert(key);
    }

    pub fn remove(&mut self, key: RelationKey) {
        self.inserts.remove(&key);
        self.removals.insert(key);
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.removals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserts.len() + self.removals.len()
    }

    /// Deltas the plan would produce if every change took effect
    pub fn nominal_deltas(&self) -> CounterDelta {
        let mut deltas = CounterDelta::new();
        for key in &self.inserts {
            *deltas.entry(key.subject_id).or_insert(0) += 1;
        }
        for key in &self.removals {
            *deltas.entry(key.subject_id).or_insert(0) -= 1;
        }
        deltas.retain(|_, delta| *delta != 0);
        deltas
    }
}

/// What a batch actually changed after existence filtering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedBatch {
    pub inserted: usize,
    pub removed: usize,
    /// Changes dropped because the relation was already in the target state
    pub skipped: usize,
    pub deltas: CounterDelta,
}

/// Subjects present in the fast-tier mirror of one actor but absent from the
/// authoritative store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationDiff {
    pub actor_id: i64,
    pub missing: BTreeSet<i64>,
}

impl ReconciliationDiff {
    pub fn compute(
        actor_id: i64,
        fast_set: &BTreeSet<i64>,
        authoritative_set: &BTreeSet<i64>,
    ) -> Self {
        Self {
            actor_id,
            missing: fast_set.difference(authoritative_set).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}
