//! Invalidation plan generation.
//!
//! Merges a batch of cache events into the smallest set of invalidations.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::events::{CacheEvent, EventKind};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Drop every entry; prefixes are then irrelevant.
    pub clear_all: bool,
    /// Key prefixes to drop when `clear_all` is false.
    pub prefixes: BTreeSet<String>,
    /// Chain level after the batch, if any event carried one.
    pub level: Option<i64>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ clear_all: {}, prefixes: {}, level: {:?} }}",
            self.clear_all,
            self.prefixes.len(),
            self.level,
        )
    }
}

impl InvalidationPlan {
    /// Merge events into a plan, ignoring repeated event ids.
    ///
    /// Any block event invalidates everything: new or reverted rows can change
    /// every list, count and the chain head.
    pub fn from_events(events: Vec<CacheEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();
        let mut latest_epoch: Option<u64> = None;

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            match event.kind {
                EventKind::BlockApplied { level } | EventKind::BlockReverted { level } => {
                    plan.clear_all = true;
                    if latest_epoch.is_none_or(|epoch| event.epoch > epoch) {
                        latest_epoch = Some(event.epoch);
                        plan.level = Some(level);
                    }
                }
                EventKind::Flush { prefix: None } => plan.clear_all = true,
                EventKind::Flush {
                    prefix: Some(prefix),
                } => {
                    plan.prefixes.insert(prefix);
                }
            }
        }

        if plan.clear_all {
            plan.prefixes.clear();
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        !self.clear_all && self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, epoch: u64) -> CacheEvent {
        CacheEvent::new(kind, epoch)
    }

    #[test]
    fn prefixes_merge() {
        let plan = InvalidationPlan::from_events(vec![
            event(
                EventKind::Flush {
                    prefix: Some("/v1/accounts".into()),
                },
                0,
            ),
            event(
                EventKind::Flush {
                    prefix: Some("/v1/accounts".into()),
                },
                1,
            ),
        ]);
        assert!(!plan.clear_all);
        assert_eq!(plan.prefixes.len(), 1);
    }

    #[test]
    fn block_events_clear_everything_and_track_latest_level() {
        let plan = InvalidationPlan::from_events(vec![
            event(EventKind::BlockApplied { level: 12 }, 2),
            event(
                EventKind::Flush {
                    prefix: Some("/v1/accounts".into()),
                },
                3,
            ),
            event(EventKind::BlockReverted { level: 10 }, 4),
            event(EventKind::BlockApplied { level: 11 }, 1),
        ]);
        assert!(plan.clear_all);
        assert!(plan.prefixes.is_empty());
        assert_eq!(plan.level, Some(10));
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let flush = event(
            EventKind::Flush {
                prefix: Some("/v1/head".into()),
            },
            0,
        );
        let plan = InvalidationPlan::from_events(vec![flush.clone(), flush]);
        assert_eq!(plan.prefixes.len(), 1);
    }

    #[test]
    fn empty_batch_is_empty_plan() {
        assert!(InvalidationPlan::from_events(Vec::new()).is_empty());
    }
}
