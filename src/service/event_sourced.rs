use super::{conflict, marker, record_request, validate_ids, LikeService};
use crate::broker::EventBroker;
use crate::config::LikeStrategy;
use crate::error::{LikeBridgeError, Result};
use crate::kv::{AtomicScript, KeyScheme, KeyValueStore, ScriptOutcome};
use crate::models::{LikeAction, LikeEvent, LikeEventKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Marks the relation in the fast tier, then publishes a like event for the
/// processor to apply. The mark is undone when the event cannot be published.
pub struct EventSourcedLikeService {
    kv: Arc<dyn KeyValueStore>,
    broker: Arc<dyn EventBroker>,
    keys: KeyScheme,
    topic: String,
}

impl EventSourcedLikeService {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        broker: Arc<dyn EventBroker>,
        keys: KeyScheme,
        topic: String,
    ) -> Self {
        Self {
            kv,
            broker,
            keys,
            topic,
        }
    }

    async fn toggle(&self, actor_id: i64, subject_id: i64, action: LikeAction) -> Result<bool> {
        validate_ids(actor_id, subject_id)?;

        let relation_key = self.keys.relation_key(actor_id);
        let field = subject_id.to_string();
        let marked = match action {
            LikeAction::Like => {
                self.kv
                    .eval(
                        AtomicScript::MarkLiked,
                        &[relation_key.clone()],
                        &[field.clone(), marker()],
                    )
                    .await?
            }
            LikeAction::Unlike => {
                self.kv
                    .eval(AtomicScript::UnmarkLiked, &[relation_key.clone()], &[field.clone()])
                    .await?
            }
        };
        match ScriptOutcome::from(marked) {
            ScriptOutcome::AlreadyDone => return Err(conflict(action, actor_id, subject_id)),
            ScriptOutcome::NotDone => return Ok(false),
            ScriptOutcome::Success => {}
        }

        let kind = match action {
            LikeAction::Like => LikeEventKind::Incr,
            LikeAction::Unlike => LikeEventKind::Decr,
        };
        let event = LikeEvent::new(actor_id, subject_id, kind);
        let rollback = Rollback {
            kv: self.kv.clone(),
            relation_key,
            field,
            action,
        };

        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(e) => {
                rollback.run().await;
                return Err(e);
            }
        };

        match self.broker.publish_async(&self.topic, payload).await {
            Ok(pending) => {
                let topic = self.topic.clone();
                tokio::spawn(async move {
                    match pending.wait().await {
                        Ok(_) => crate::metrics::record_publish(&topic, "success"),
                        Err(e) => {
                            crate::metrics::record_publish(&topic, "failure");
                            error!(
                                "Like event for actor {} subject {} was not delivered, rolling back: {}",
                                event.actor_id, event.subject_id, e
                            );
                            rollback.run().await;
                        }
                    }
                });
                Ok(true)
            }
            Err(e) => {
                crate::metrics::record_publish(&self.topic, "failure");
                rollback.run().await;
                Err(LikeBridgeError::Delivery(format!(
                    "failed to publish {} event: {}",
                    kind.as_str(),
                    e
                )))
            }
        }
    }
}

/// Undo of a fast-tier mark whose event never reached the broker
struct Rollback {
    kv: Arc<dyn KeyValueStore>,
    relation_key: String,
    field: String,
    action: LikeAction,
}

impl Rollback {
    async fn run(&self) {
        let undone = match self.action {
            LikeAction::Like => {
                self.kv
                    .eval(
                        AtomicScript::UnmarkLiked,
                        &[self.relation_key.clone()],
                        &[self.field.clone()],
                    )
                    .await
            }
            LikeAction::Unlike => {
                self.kv
                    .eval(
                        AtomicScript::MarkLiked,
                        &[self.relation_key.clone()],
                        &[self.field.clone(), marker()],
                    )
                    .await
            }
        };
        if let Err(e) = undone {
            warn!(
                "Could not roll back {} mark {} in {}: {}",
                self.action.as_str(),
                self.field,
                self.relation_key,
                e
            );
        }
    }
}

#[async_trait]
impl LikeService for EventSourcedLikeService {
    fn strategy(&self) -> LikeStrategy {
        LikeStrategy::EventSourced
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
