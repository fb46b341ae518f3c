use super::{AtomicScript, KeyValueStore};
use crate::error::{LikeBridgeError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    strings: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl MemoryState {
    fn purge_expired(&mut self, key: &str) {
        let expired = matches!(
            self.strings.get(key),
            Some((_, Some(deadline))) if *deadline <= Instant::now()
        );
        if expired {
            self.strings.remove(key);
        }
    }

    fn get_string(&mut self, key: &str) -> Option<String> {
        self.purge_expired(key);
        self.strings.get(key).map(|(value, _)| value.clone())
    }

    fn exists(&mut self, key: &str) -> bool {
        self.purge_expired(key);
        self.strings.contains_key(key) || self.hashes.contains_key(key)
    }

    fn hexists(&self, key: &str, field: &str) -> bool {
        self.hashes
            .get(key)
            .map(|hash| hash.contains_key(field))
            .unwrap_or(false)
    }

    fn hset(&mut self, key: &str, field: &str, value: String) {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    fn hdel(&mut self, key: &str, field: &str) -> bool {
        let Some(hash) = self.hashes.get_mut(key) else {
            return false;
        };
        let removed = hash.remove(field).is_some();
        if hash.is_empty() {
            self.hashes.remove(key);
        }
        removed
    }

    fn hincrby(&mut self, key: &str, field: &str, by: i64) -> Result<i64> {
        let hash = self.hashes.entry(key.to_string()).or_default();
        let current = match hash.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                LikeBridgeError::Redis(format!("hash value at {}/{} is not an integer", key, field))
            })?,
            None => 0,
        };
        let next = current + by;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }
}

/// In-process store with the same semantics as [`super::RedisKvStore`].
///
/// Scripts run under the state lock, which gives them the same atomicity a
/// Redis script has.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a transient error until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LikeBridgeError::Redis("store unavailable".to_string()));
        }
        Ok(())
    }

    /// Remaining lifetime of a string key, for tests
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut state = self.state.lock().await;
        state.purge_expired(key);
        state
            .strings
            .get(key)
            .and_then(|(_, deadline)| *deadline)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.state.lock().await.get_string(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.check_available()?;
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.state
            .lock()
            .await
            .strings
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.purge_expired(key);
        let had_string = state.strings.remove(key).is_some();
        let had_hash = state.hashes.remove(key).is_some();
        Ok(had_string || had_hash)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.check_available()?;
        self.state.lock().await.hset(key, field, value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).and_then(|hash| hash.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.state.lock().await.hdel(key, field))
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.state.lock().await.hexists(key, field))
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .hashes
            .get(key)
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn scan_keys(&self, pattern: &str, _count: usize) -> Result<Vec<String>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let string_keys: Vec<String> = state.strings.keys().cloned().collect();
        for key in &string_keys {
            state.purge_expired(key);
        }
        let mut keys: Vec<String> = state
            .strings
            .keys()
            .chain(state.hashes.keys())
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn eval(&self, script: AtomicScript, keys: &[String], args: &[String]) -> Result<i64> {
        self.check_available()?;
        script.check_arity(keys, args)?;
        let mut state = self.state.lock().await;

        match script {
            AtomicScript::LikeWithLedger => {
                if state.hexists(&keys[1], &args[1]) {
                    return Ok(-1);
                }
                let field = format!("{}:{}", args[0], args[1]);
                state.hincrby(&keys[0], &field, 1)?;
                state.hset(&keys[1], &args[1], args[2].clone());
                Ok(1)
            }
            AtomicScript::UnlikeWithLedger => {
                if !state.hexists(&keys[1], &args[1]) {
                    return Ok(-1);
                }
                let field = format!("{}:{}", args[0], args[1]);
                state.hincrby(&keys[0], &field, -1)?;
                state.hdel(&keys[1], &args[1]);
                Ok(1)
            }
            AtomicScript::MarkLiked => {
                if state.hexists(&keys[0], &args[0]) {
                    return Ok(-1);
                }
                state.hset(&keys[0], &args[0], args[1].clone());
                Ok(1)
            }
            AtomicScript::UnmarkLiked => {
                if !state.hexists(&keys[0], &args[0]) {
                    return Ok(-1);
                }
                state.hdel(&keys[0], &args[0]);
                Ok(1)
            }
            AtomicScript::SetCounter => {
                if state.exists(&keys[0]) {
                    if let Some(entry) = state.strings.get_mut(&keys[0]) {
                        entry.0 = args[0].clone();
                    }
                    return Ok(0);
                }
                let secs = args[1].parse::<u64>().map_err(|_| {
                    LikeBridgeError::InvalidParameter(format!("invalid expiry '{}'", args[1]))
                })?;
                let deadline = Instant::now() + Duration::from_secs(secs);
                state
                    .strings
                    .insert(keys[0].clone(), (args[0].clone(), Some(deadline)));
                Ok(1)
            }
            AtomicScript::ReleaseLock => {
                if state.get_string(&keys[0]).as_deref() == Some(args[0].as_str()) {
                    state.strings.remove(&keys[0]);
                    return Ok(1);
                }
                Ok(0)
            }
        }
    }

    async fn try_lock(&self, key: &str, token: &str, lease: Duration) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.exists(key) {
            return Ok(false);
        }
        state.strings.insert(
            key.to_string(),
            (token.to_string(), Some(Instant::now() + lease)),
        );
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

/// Redis-style glob supporting `*` and `?`
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    let (mut p, mut c) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while c < candidate.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == candidate[c]) {
            p += 1;
            c += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, c));
            p += 1;
        } else if let Some((star_p, star_c)) = star {
            p = star_p + 1;
            c = star_c + 1;
            star = Some((star_p, star_c + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
