use super::{conflict, record_request, validate_ids, LikeService, ServiceContext};
use crate::config::{LikeStrategy, LockConfig};
use crate::error::Result;
use crate::kv::keys::lock_key;
use crate::kv::{KeyScheme, LeaseLock};
use crate::models::{LikeAction, ToggleOutcome};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

/// Serializes toggles of one relation with a lease lock and applies them in
/// a database transaction, then mirrors the result into the fast tier.
pub struct LockedTransactionLikeService {
    ctx: ServiceContext,
    keys: KeyScheme,
    lock: LeaseLock,
}

impl LockedTransactionLikeService {
    pub fn new(ctx: ServiceContext, keys: KeyScheme, lock: &LockConfig) -> Self {
        let lock = LeaseLock::new(ctx.kv.clone(), lock);
        Self { ctx, keys, lock }
    }

    async fn toggle(&self, actor_id: i64, subject_id: i64, action: LikeAction) -> Result<bool> {
        validate_ids(actor_id, subject_id)?;

        let token = self.lock.acquire(&lock_key(subject_id, actor_id)).await?;
        let result = self.toggle_locked(actor_id, subject_id, action).await;
        if let Err(e) = self.lock.release(token).await {
            warn!("Failed to release like lock: {}", e);
        }
        result
    }

    async fn toggle_locked(&self, actor_id: i64, subject_id: i64, action: LikeAction) -> Result<bool> {
        let relation_id = match self.ctx.store.toggle(actor_id, subject_id, action).await? {
            ToggleOutcome::AlreadyInState => return Err(conflict(action, actor_id, subject_id)),
            ToggleOutcome::Applied { relation_id } => relation_id,
        };

        // The store has committed; a stale mirror is repaired by reconciliation
        let mirror_key = self.keys.relation_key(actor_id);
        let field = subject_id.to_string();
        let mirrored = match action {
            LikeAction::Like => {
                let value = relation_id.map(|id| id.to_string()).unwrap_or_else(super::marker);
                self.ctx.kv.hset(&mirror_key, &field, &value).await
            }
            LikeAction::Unlike => self.ctx.kv.hdel(&mirror_key, &field).await.map(|_| ()),
        };
        if let Err(e) = mirrored {
            warn!(
                "Committed {} of subject {} by actor {} but could not update the mirror: {}",
                action.as_str(),
                subject_id,
                actor_id,
                e
            );
        }

        if let Some(cache) = &self.ctx.relation_cache {
            cache.apply_toggle(actor_id, subject_id, action == LikeAction::Like);
        }

        debug!("Actor {} {}d subject {}", actor_id, action.as_str(), subject_id);
        Ok(true)
    }
}

#[async_trait]
impl LikeService for LockedTransactionLikeService {
    fn strategy(&self) -> LikeStrategy {
        LikeStrategy::LockedTransaction
    }

    async fn like(&self, actor_id: i64, subject_id: i64) -> Result<bool> {
        let started = Instant::now();
        let result = self.toggle(actor_id, subject_id, LikeAction::Like).await;
        record_request(self.strategy(), LikeAction::Like, started, &result);
        result
    }

    async fn unlike(&self, actor_id: i64, subject_id: i64) -> Result<bool> {
        let started = Instant::now();
        let result = self.toggle(actor_id, subject_id, LikeAction::Unlike).await;
        record_request(self.strategy(), LikeAction::Unlike, started, &result);
        result
    }

    async fn has_liked(&self, actor_id: i64, subject_id: i64) -> Result<bool> {
        validate_ids(actor_id, subject_id)?;
        if let Some(cache) = &self.ctx.relation_cache {
            if let Some(liked) = cache.contains(actor_id, subject_id).await? {
                return Ok(liked);
            }
        }
        self.ctx.store.has_relation(actor_id, subject_id).await
    }
}
