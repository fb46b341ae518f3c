//! Authoritative relational store for like relations and counts.

mod memory;
mod postgres;

pub use memory::InMemoryLikeStore;
pub use postgres::PostgresLikeStore;

use crate::error::Result;
use crate::models::{AppliedBatch, CounterDelta, LikeAction, LikeBatchPlan, ToggleOutcome};
use async_trait::async_trait;
use std::collections::BTreeSet;

#[async_trait]
pub trait LikeStore: Send + Sync {
    /// Create the like tables when missing
    async fn ensure_schema(&self) -> Result<()>;

    /// Apply one like or unlike in a single transaction.
    ///
    /// The relation row is locked while its state is re-checked, so two
    /// concurrent toggles of one relation cannot both apply.
    async fn toggle(&self, actor_id: i64, subject_id: i64, action: LikeAction)
        -> Result<ToggleOutcome>;

    /// Apply a batch plan in one transaction.
    ///
    /// Inserts of existing relations and removals of absent ones are
    /// skipped, and only the changes that took effect move the counters.
    /// Re-applying the same plan is therefore a no-op.
    async fn apply_batch(&self, plan: &LikeBatchPlan) -> Result<AppliedBatch>;

    /// Add signed deltas to like counts, all or none. Counts clamp at zero.
    async fn batch_update_counter(&self, deltas: &CounterDelta) -> Result<()>;

    async fn liked_subjects(&self, actor_id: i64) -> Result<BTreeSet<i64>>;

    /// Actors liking a subject, at most `limit`
    async fn actors_of_subject(&self, subject_id: i64, limit: usize) -> Result<Vec<i64>>;

    async fn has_relation(&self, actor_id: i64, subject_id: i64) -> Result<bool>;

    async fn like_count(&self, subject_id: i64) -> Result<i64>;

    async fn is_healthy(&self) -> bool;
}
