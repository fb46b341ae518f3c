use crate::error::{LikeBridgeError, Result};

/// Server-side scripts the engine relies on.
///
/// The in-memory store reproduces each one under a single lock; the Redis
/// store ships the Lua source below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicScript {
    /// KEYS: temp ledger, relation mirror. ARGV: actor, subject, marker.
    LikeWithLedger,
    /// KEYS: temp ledger, relation mirror. ARGV: actor, subject.
    UnlikeWithLedger,
    /// KEYS: relation mirror. ARGV: subject, marker.
    MarkLiked,
    /// KEYS: relation mirror. ARGV: subject.
    UnmarkLiked,
    /// KEYS: counter. ARGV: value, expiry seconds (only applied to new keys).
    SetCounter,
    /// KEYS: lock. ARGV: token.
    ReleaseLock,
}

impl AtomicScript {
    pub const ALL: [AtomicScript; 6] = [
        AtomicScript::LikeWithLedger,
        AtomicScript::UnlikeWithLedger,
        AtomicScript::MarkLiked,
        AtomicScript::UnmarkLiked,
        AtomicScript::SetCounter,
        AtomicScript::ReleaseLock,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AtomicScript::LikeWithLedger => "like_with_ledger",
            AtomicScript::UnlikeWithLedger => "unlike_with_ledger",
            AtomicScript::MarkLiked => "mark_liked",
            AtomicScript::UnmarkLiked => "unmark_liked",
            AtomicScript::SetCounter => "set_counter",
            AtomicScript::ReleaseLock => "release_lock",
        }
    }

    pub fn arity(&self) -> (usize, usize) {
        match self {
            AtomicScript::LikeWithLedger => (2, 3),
            AtomicScript::UnlikeWithLedger => (2, 2),
            AtomicScript::MarkLiked => (1, 2),
            AtomicScript::UnmarkLiked => (1, 1),
            AtomicScript::SetCounter => (1, 2),
            AtomicScript::ReleaseLock => (1, 1),
        }
    }

    pub fn check_arity(&self, keys: &[String], args: &[String]) -> Result<()> {
        let (key_count, arg_count) = self.arity();
        if keys.len() != key_count || args.len() != arg_count {
            return Err(LikeBridgeError::InvalidParameter(format!(
                "script {} expects {} keys and {} args, got {} and {}",
                self.name(),
                key_count,
                arg_count,
                keys.len(),
                args.len()
            )));
        }
        Ok(())
    }

    pub fn source(&self) -> &'static str {
        match self {
            AtomicScript::LikeWithLedger => LIKE_WITH_LEDGER,
            AtomicScript::UnlikeWithLedger => UNLIKE_WITH_LEDGER,
            AtomicScript::MarkLiked => MARK_LIKED,
            AtomicScript::UnmarkLiked => UNMARK_LIKED,
            AtomicScript::SetCounter => SET_COUNTER,
            AtomicScript::ReleaseLock => RELEASE_LOCK,
        }
    }
}

/// Interpretation of a like/unlike script result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// -1: the relation was already in the requested state
    AlreadyDone,
    /// 1: applied
    Success,
    /// Any other value: nothing happened
    NotDone,
}

impl From<i64> for ScriptOutcome {
    fn from(value: i64) -> Self {
        match value {
            -1 => ScriptOutcome::AlreadyDone,
            1 => ScriptOutcome::Success,
            _ => ScriptOutcome::NotDone,
        }
    }
}

const LIKE_WITH_LEDGER: &str = r#"
local ledger = KEYS[1]
local relations = KEYS[2]
if redis.call('HEXISTS', relations, ARGV[2]) == 1 then
    return -1
end
redis.call('HINCRBY', ledger, ARGV[1] .. ':' .. ARGV[2], 1)
redis.call('HSET', relations, ARGV[2], ARGV[3])
return 1
"#;

const UNLIKE_WITH_LEDGER: &str = r#"
local ledger = KEYS[1]
local relations = KEYS[2]
if redis.call('HEXISTS', relations, ARGV[2]) ~= 1 then
    return -1
end
redis.call('HINCRBY', ledger, ARGV[1] .. ':' .. ARGV[2], -1)
redis.call('HDEL', relations, ARGV[2])
return 1
"#;

const MARK_LIKED: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
    return -1
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
return 1
"#;

const UNMARK_LIKED: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
    return -1
end
redis.call('HDEL', KEYS[1], ARGV[1])
return 1
"#;

const SET_COUNTER: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('SET', KEYS[1], ARGV[1], 'KEEPTTL')
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
return 1
"#;

const RELEASE_LOCK: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;
