//! Like/unlike entry points.
//!
//! Every strategy implements the same two-state machine per (actor, subject):
//! liking a liked subject or unliking an unliked one is a `Conflict`.

mod atomic_script;
mod event_sourced;
mod locked;

pub use atomic_script::AtomicScriptLikeService;
pub use event_sourced::EventSourcedLikeService;
pub use locked::LockedTransactionLikeService;

use crate::broker::EventBroker;
use crate::cache::RelationCache;
use crate::config::{Config, LikeStrategy};
use crate::error::{LikeBridgeError, Result};
use crate::kv::{KeyScheme, KeyValueStore};
use crate::models::LikeAction;
use crate::store::LikeStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

#[async_trait]
pub trait LikeService: Send + Sync {
    fn strategy(&self) -> LikeStrategy;

    /// Returns true when the like took effect, false when nothing happened
    async fn like(&self, actor_id: i64, subject_id: i64) -> Result<bool>;

    async fn unlike(&self, actor_id: i64, subject_id: i64) -> Result<bool>;

    async fn has_liked(&self, actor_id: i64, subject_id: i64) -> Result<bool>;
}

/// Adapters shared by every strategy
#[derive(Clone)]
pub struct ServiceContext {
    pub kv: Arc<dyn KeyValueStore>,
    pub store: Arc<dyn LikeStore>,
    pub broker: Arc<dyn EventBroker>,
    pub relation_cache: Option<Arc<RelationCache>>,
}

pub fn build_like_service(config: &Config, ctx: ServiceContext) -> Arc<dyn LikeService> {
    let keys = KeyScheme::new(config.like_service.relation_key_prefix.clone());
    match config.like_service.strategy {
        LikeStrategy::LockedTransaction => Arc::new(LockedTransactionLikeService::new(
            ctx,
            keys,
            &config.like_service.lock,
        )),
        LikeStrategy::AtomicScript => Arc::new(AtomicScriptLikeService::new(
            ctx.kv,
            keys,
            config.like_service.ledger_slice_secs,
        )),
        LikeStrategy::EventSourced => Arc::new(EventSourcedLikeService::new(
            ctx.kv,
            ctx.broker,
            keys,
            config.broker.like_topic.clone(),
        )),
    }
}

pub fn validate_ids(actor_id: i64, subject_id: i64) -> Result<()> {
    if actor_id <= 0 {
        return Err(LikeBridgeError::InvalidParameter(format!(
            "actor id must be positive, got {}",
            actor_id
        )));
    }
    if subject_id <= 0 {
        return Err(LikeBridgeError::InvalidParameter(format!(
            "subject id must be positive, got {}",
            subject_id
        )));
    }
    Ok(())
}

pub(crate) fn conflict(action: LikeAction, actor_id: i64, subject_id: i64) -> LikeBridgeError {
    let state = match action {
        LikeAction::Like => "already liked",
        LikeAction::Unlike => "not liked",
    };
    LikeBridgeError::Conflict(format!(
        "actor {} has {} subject {}",
        actor_id, state, subject_id
    ))
}

/// Fast-tier mirror marker: creation time in milliseconds
pub(crate) fn marker() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

pub(crate) fn record_request(
    strategy: LikeStrategy,
    action: LikeAction,
    started: Instant,
    result: &Result<bool>,
) {
    let outcome = match result {
        Ok(true) => "success",
        Ok(false) => "not_done",
        Err(LikeBridgeError::InvalidParameter(_)) => "invalid",
        Err(LikeBridgeError::Conflict(_)) => "conflict",
        Err(LikeBridgeError::SystemBusy(_)) => "busy",
        Err(LikeBridgeError::Delivery(_)) => "delivery_failure",
        Err(_) => "error",
    };
    crate::metrics::record_like_request(strategy.as_str(), action.as_str(), outcome, started.elapsed());
}
