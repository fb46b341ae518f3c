use crate::models::{LikeBatchPlan, LikeEvent, LikeEventKind, RelationKey};
use std::collections::HashMap;

/// A batch folded down to one state change per relation
#[derive(Debug, Clone, Default)]
pub struct ReducedBatch {
    pub plan: LikeBatchPlan,
    /// NONE events, dropped before folding
    pub dropped: usize,
    /// Events superseded by a later event for the same relation
    pub superseded: usize,
}

/// Fold events by (actor, subject), keeping the latest `event_time`.
///
/// Events are visited in batch order. On equal `event_time` the later event
/// in the batch wins, where a strict newer-than comparison would keep the
/// first one; batch order follows log order, so the last write seen wins.
pub fn reduce<I>(events: I) -> ReducedBatch
where
    I: IntoIterator<Item = LikeEvent>,
{
    let mut latest: HashMap<RelationKey, LikeEvent> = HashMap::new();
    let mut reduced = ReducedBatch::default();

    for event in events {
        if event.kind == LikeEventKind::Noop {
            reduced.dropped += 1;
            continue;
        }
        match latest.get(&event.relation_key()) {
            Some(current) if current.event_time > event.event_time => {
                reduced.superseded += 1;
            }
            Some(_) => {
                reduced.superseded += 1;
                latest.insert(event.relation_key(), event);
            }
            None => {
                latest.insert(event.relation_key(), event);
            }
        }
    }

    for (key, event) in latest {
        match event.kind {
            LikeEventKind::Incr => reduced.plan.insert(key),
            LikeEventKind::Decr => reduced.plan.remove(key),
            LikeEventKind::Noop => {}
        }
    }

    reduced
}
