use crate::error::{LikeBridgeError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Direction of a like event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LikeEventKind {
    #[serde(rename = "INCR")]
    Incr,
    #[serde(rename = "DECR")]
    Decr,
    /// Carries no state change and is dropped by consumers
    #[serde(rename = "NONE")]
    Noop,
}

impl LikeEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeEventKind::Incr => "INCR",
            LikeEventKind::Decr => "DECR",
            LikeEventKind::Noop => "NONE",
        }
    }

    /// Signed effect on the subject's like count
    pub fn delta(&self) -> i64 {
        match self {
            LikeEventKind::Incr => 1,
            LikeEventKind::Decr => -1,
            LikeEventKind::Noop => 0,
        }
    }
}

/// A like or unlike that happened in the fast tier and still has to be
/// applied to the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeEvent {
    pub subject_id: i64,
    pub actor_id: i64,
    #[serde(rename = "type")]
    pub kind: LikeEventKind,
    pub event_time: DateTime<Utc>,
}

impl LikeEvent {
    /// Build an event stamped with the process clock.
    pub fn new(actor_id: i64, subject_id: i64, kind: LikeEventKind) -> Self {
        Self {
            subject_id,
            actor_id,
            kind,
            event_time: next_event_time(),
        }
    }

    pub fn with_time(
        actor_id: i64,
        subject_id: i64,
        kind: LikeEventKind,
        event_time: DateTime<Utc>,
    ) -> Self {
        Self {
            subject_id,
            actor_id,
            kind,
            event_time,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and validate a broker payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let event: LikeEvent = serde_json::from_slice(payload)
            .map_err(|e| LikeBridgeError::MalformedEvent(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<()> {
        if self.subject_id <= 0 || self.actor_id <= 0 {
            return Err(LikeBridgeError::MalformedEvent(format!(
                "non-positive id in event (actor {}, subject {})",
                self.actor_id, self.subject_id
            )));
        }
        Ok(())
    }

    /// Dedup key used when folding a batch
    pub fn relation_key(&self) -> RelationKey {
        RelationKey {
            actor_id: self.actor_id,
            subject_id: self.subject_id,
        }
    }
}

/// (actor, subject) pair identifying one like relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationKey {
    pub actor_id: i64,
    pub subject_id: i64,
}

impl RelationKey {
    pub fn new(actor_id: i64, subject_id: i64) -> Self {
        Self {
            actor_id,
            subject_id,
        }
    }
}

static LAST_EVENT_MICROS: AtomicI64 = AtomicI64::new(0);

/// Strictly increasing wall-clock timestamps at microsecond precision.
///
/// Two events produced by this process never share a timestamp, so a like
/// followed by an unlike of the same relation always orders correctly in
/// last-write-wins folding.
pub fn next_event_time() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_EVENT_MICROS.load(Ordering::Relaxed);
    let micros = loop {
        let next = now.max(prev + 1);
        match LAST_EVENT_MICROS.compare_exchange_weak(
            prev,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => break next,
            Err(actual) => prev = actual,
        }
    };

    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos).single().unwrap_or_else(Utc::now)
}
