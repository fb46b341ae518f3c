use super::LocalCounterCache;
use crate::config::AccessGuardConfig;
use crate::error::Result;
use crate::kv::keys::access_key;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    /// The actor just reached the warning count in this window
    Warn,
    /// The actor went past the ban count in this window
    Ban,
}

impl AccessDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessDecision::Allowed => "allowed",
            AccessDecision::Warn => "warn",
            AccessDecision::Ban => "ban",
        }
    }
}

/// Per-actor access counting on top of the local counter cache
pub struct AccessGuard {
    cache: Arc<LocalCounterCache>,
    config: AccessGuardConfig,
}

impl AccessGuard {
    pub fn new(cache: Arc<LocalCounterCache>, config: AccessGuardConfig) -> Self {
        Self { cache, config }
    }

    pub async fn check(&self, actor_id: i64) -> Result<AccessDecision> {
        if !self.config.enabled {
            return Ok(AccessDecision::Allowed);
        }

        let window = Duration::from_secs(self.config.window_secs);
        let count = self
            .cache
            .increment_with(&access_key(actor_id), window, window)
            .await?;

        let decision = if count > self.config.ban_count {
            AccessDecision::Ban
        } else if count == self.config.warn_count {
            AccessDecision::Warn
        } else {
            AccessDecision::Allowed
        };

        match decision {
            AccessDecision::Ban => warn!("Actor {} exceeded {} accesses, banned", actor_id, self.config.ban_count),
            AccessDecision::Warn => warn!("Actor {} reached {} accesses", actor_id, count),
            AccessDecision::Allowed => {}
        }
        crate::metrics::record_access_decision(decision.as_str());
        Ok(decision)
    }
}
