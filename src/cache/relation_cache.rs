use crate::config::RelationCacheConfig;
use crate::error::Result;
use crate::kv::keys::relation_cache_key;
use crate::store::LikeStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Upper bound on actors loaded for one subject
const MAX_ACTORS_PER_SUBJECT: usize = 10_000;

struct CachedActors {
    actors: HashSet<i64>,
    /// False when the load hit the per-subject bound
    complete: bool,
    loaded_at: Instant,
}

/// Loads of one subject currently reading the store
struct InFlightLoad {
    loaders: usize,
    /// Toggles seen since the first loader started
    toggles: u64,
}

struct HitCounter {
    hits: u64,
    last_decay: Instant,
}

/// Actor sets of hot subjects.
///
/// Lookups count hits per subject; the count is halved every decay period.
/// A subject whose count reaches the threshold has its actors loaded from
/// the authoritative store and answered locally until the TTL runs out.
pub struct RelationCache {
    store: Arc<dyn LikeStore>,
    entries: DashMap<i64, CachedActors>,
    hits: DashMap<i64, HitCounter>,
    loading: DashMap<i64, InFlightLoad>,
    config: RelationCacheConfig,
}

impl RelationCache {
    pub fn new(store: Arc<dyn LikeStore>, config: RelationCacheConfig) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            hits: DashMap::new(),
            loading: DashMap::new(),
            config,
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_secs)
    }

    /// Count a hit and report whether the subject is now hot
    fn record_hit(&self, subject_id: i64) -> bool {
        let now = Instant::now();
        let decay = Duration::from_secs(self.config.decay_secs.max(1));
        let mut counter = self.hits.entry(subject_id).or_insert(HitCounter {
            hits: 0,
            last_decay: now,
        });

        let periods = now.saturating_duration_since(counter.last_decay).as_secs() / decay.as_secs();
        if periods > 0 {
            counter.hits = counter.hits.checked_shr(periods.min(63) as u32).unwrap_or(0);
            counter.last_decay = now;
        }
        counter.hits += 1;
        counter.hits >= self.config.hot_threshold
    }

    /// Whether `actor_id` likes `subject_id` according to the cache.
    ///
    /// `None` means the cache cannot answer and the caller has to look
    /// elsewhere.
    pub async fn contains(&self, actor_id: i64, subject_id: i64) -> Result<Option<bool>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let hot = self.record_hit(subject_id);

        if let Some(answer) = self.lookup(actor_id, subject_id) {
            crate::metrics::record_relation_cache_lookup(true);
            return Ok(Some(answer));
        }
        crate::metrics::record_relation_cache_lookup(false);

        if !hot {
            return Ok(None);
        }

        self.load(subject_id).await?;
        Ok(self.lookup(actor_id, subject_id))
    }

    fn lookup(&self, actor_id: i64, subject_id: i64) -> Option<bool> {
        let cached = self.entries.get(&subject_id)?;
        if cached.loaded_at.elapsed() >= self.ttl() {
            drop(cached);
            self.entries.remove(&subject_id);
            return None;
        }
        if cached.actors.contains(&actor_id) {
            Some(true)
        } else if cached.complete {
            Some(false)
        } else {
            None
        }
    }

    /// Load the actor set of a subject.
    ///
    /// A set read while a toggle of the same subject committed may be stale,
    /// so it is dropped and the next hot lookup loads again.
    async fn load(&self, subject_id: i64) -> Result<()> {
        let started_at = {
            let mut in_flight = self.loading.entry(subject_id).or_insert(InFlightLoad {
                loaders: 0,
                toggles: 0,
            });
            in_flight.loaders += 1;
            in_flight.toggles
        };

        let loaded = self
            .store
            .actors_of_subject(subject_id, MAX_ACTORS_PER_SUBJECT)
            .await;

        // The in-flight guard stays locked until the set is stored so a
        // concurrent toggle either bumps the count or finds the entry
        let Entry::Occupied(mut in_flight) = self.loading.entry(subject_id) else {
            return loaded.map(|_| ());
        };
        let fresh = in_flight.get().toggles == started_at;
        match &loaded {
            Ok(actors) if fresh => self.store_loaded(subject_id, actors),
            Ok(_) => debug!(
                "Discarded actors of subject {} loaded during a toggle",
                relation_cache_key(subject_id)
            ),
            Err(_) => {}
        }
        in_flight.get_mut().loaders -= 1;
        if in_flight.get().loaders == 0 {
            in_flight.remove();
        }
        loaded.map(|_| ())
    }

    fn store_loaded(&self, subject_id: i64, actors: &[i64]) {
        let complete = actors.len() < MAX_ACTORS_PER_SUBJECT;

        if !self.entries.contains_key(&subject_id) && self.entries.len() >= self.config.max_entries {
            self.evict_oldest();
        }

        debug!(
            "Cached {} actors of hot subject {}",
            actors.len(),
            relation_cache_key(subject_id)
        );
        self.entries.insert(
            subject_id,
            CachedActors {
                actors: actors.iter().copied().collect(),
                complete,
                loaded_at: Instant::now(),
            },
        );
    }

    fn evict_oldest(&self) {
        let ttl = self.ttl();
        self.entries.retain(|_, cached| cached.loaded_at.elapsed() < ttl);
        if self.entries.len() < self.config.max_entries {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.loaded_at)
            .map(|entry| *entry.key());
        if let Some(subject_id) = oldest {
            self.entries.remove(&subject_id);
        }
    }

    /// Keep a cached actor set current after a successful toggle
    pub fn apply_toggle(&self, actor_id: i64, subject_id: i64, liked: bool) {
        if let Some(mut in_flight) = self.loading.get_mut(&subject_id) {
            in_flight.toggles += 1;
        }
        if let Some(mut cached) = self.entries.get_mut(&subject_id) {
            if liked {
                cached.actors.insert(actor_id);
            } else {
                cached.actors.remove(&actor_id);
            }
        }
    }

    pub fn invalidate(&self, subject_id: i64) {
        self.entries.remove(&subject_id);
    }

    pub fn is_cached(&self, subject_id: i64) -> bool {
        self.entries.contains_key(&subject_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
