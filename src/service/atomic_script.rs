use super::{conflict, marker, record_request, validate_ids, LikeService};
use crate::config::LikeStrategy;
use crate::error::Result;
use crate::kv::keys::time_slice;
use crate::kv::{AtomicScript, KeyScheme, KeyValueStore, ScriptOutcome};
use crate::models::LikeAction;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Checks the mirror and records the change in the current temp ledger slice
/// in one server-side script. The ledger sync job carries slices to the store.
pub struct AtomicScriptLikeService {
    kv: Arc<dyn KeyValueStore>,
    keys: KeyScheme,
    slice_secs: u64,
}

impl AtomicScriptLikeService {
    pub fn new(kv: Arc<dyn KeyValueStore>, keys: KeyScheme, slice_secs: u64) -> Self {
        Self {
            kv,
            keys,
            slice_secs,
        }
    }

    async fn toggle(&self, actor_id: i64, subject_id: i64, action: LikeAction) -> Result<bool> {
        validate_ids(actor_id, subject_id)?;

        let slice = time_slice(chrono::Utc::now().timestamp(), self.slice_secs);
        let keys = [
            self.keys.temp_ledger_key(slice),
            self.keys.relation_key(actor_id),
        ];
        let (script, args) = match action {
            LikeAction::Like => (
                AtomicScript::LikeWithLedger,
                vec![actor_id.to_string(), subject_id.to_string(), marker()],
            ),
            LikeAction::Unlike => (
                AtomicScript::UnlikeWithLedger,
                vec![actor_id.to_string(), subject_id.to_string()],
            ),
        };

        match ScriptOutcome::from(self.kv.eval(script, &keys, &args).await?) {
            ScriptOutcome::AlreadyDone => Err(conflict(action, actor_id, subject_id)),
            ScriptOutcome::Success => Ok(true),
            ScriptOutcome::NotDone => Ok(false),
        }
    }
}

#[async_trait]
impl LikeService for AtomicScriptLikeService {
    fn strategy(&self) -> LikeStrategy {
        LikeStrategy::AtomicScript
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
        self.kv
            .hexists(&self.keys.relation_key(actor_id), &subject_id.to_string())
            .await
    }
}
