use crate::models::RelationKey;

/// Key layout of the per-actor relation mirror and the temp ledgers.
///
/// Both share one prefix: `{prefix}:{actorId}` and `{prefix}:temp:{slice}`.
/// Actor ids are numeric, so ledger keys never parse as relation keys.
#[derive(Debug, Clone)]
pub struct KeyScheme {
    prefix: String,
}

impl KeyScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn relation_key(&self, actor_id: i64) -> String {
        format!("{}:{}", self.prefix, actor_id)
    }

    pub fn relation_pattern(&self) -> String {
        format!("{}:*", self.prefix)
    }

    /// Actor id of a relation key, `None` for anything else under the prefix
    pub fn parse_actor_id(&self, key: &str) -> Option<i64> {
        key.strip_prefix(&self.prefix)?
            .strip_prefix(':')?
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
    }

    pub fn temp_ledger_key(&self, slice: i64) -> String {
        format!("{}:temp:{}", self.prefix, slice)
    }

    pub fn temp_ledger_pattern(&self) -> String {
        format!("{}:temp:*", self.prefix)
    }

    pub fn parse_ledger_slice(&self, key: &str) -> Option<i64> {
        key.strip_prefix(&self.prefix)?
            .strip_prefix(":temp:")?
            .parse::<i64>()
            .ok()
    }
}

/// Start of the time slice containing `epoch_secs`
pub fn time_slice(epoch_secs: i64, width_secs: u64) -> i64 {
    let width = width_secs.max(1) as i64;
    epoch_secs.div_euclid(width) * width
}

/// Lease lock guarding one (subject, actor) pair. Like and unlike share it.
pub fn lock_key(subject_id: i64, actor_id: i64) -> String {
    format!("lock:like:{}:{}", subject_id, actor_id)
}

pub fn access_key(actor_id: i64) -> String {
    format!("user:access:{}", actor_id)
}

pub fn relation_cache_key(subject_id: i64) -> String {
    format!("question:thumb:{}", subject_id)
}

/// Temp ledger field for one relation
pub fn ledger_field(actor_id: i64, subject_id: i64) -> String {
    format!("{}:{}", actor_id, subject_id)
}

pub fn parse_ledger_field(field: &str) -> Option<RelationKey> {
    let (actor, subject) = field.split_once(':')?;
    let actor_id = actor.parse::<i64>().ok()?;
    let subject_id = subject.parse::<i64>().ok()?;
    if actor_id <= 0 || subject_id <= 0 {
        return None;
    }
    Some(RelationKey::new(actor_id, subject_id))
}
