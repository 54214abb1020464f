use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{collision::cache::PairKey, utils::BodyHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContactEventKind {
    /// First step the pair touches.
    Begin,
    /// Still touching since the previous step.
    Continue,
    /// Touched in the previous step, no longer does.
    End,
}

/// Contact state change for one body pair; `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionEvent {
    pub kind: ContactEventKind,
    pub a: BodyHandle,
    pub b: BodyHandle,
}

impl CollisionEvent {
    fn new(kind: ContactEventKind, key: PairKey) -> Self {
        Self {
            kind,
            a: key.low(),
            b: key.high(),
        }
    }
}

/// Remembers which pairs touched in the previous step.
#[derive(Debug, Clone, Default)]
pub(crate) struct ContactTracker {
    touching: BTreeSet<PairKey>,
}

impl ContactTracker {
    /// Diffs `current` against the previous step. Pairs missing from
    /// `current` for which `dormant` holds were not examined this step
    /// (both bodies at rest) and are carried over as continuing.
    pub(crate) fn update(
        &mut self,
        mut current: BTreeSet<PairKey>,
        dormant: impl Fn(&PairKey) -> bool,
    ) -> Vec<CollisionEvent> {
        let mut events = Vec::with_capacity(current.len());
        for key in &self.touching {
            if !current.contains(key) {
                if dormant(key) {
                    current.insert(*key);
                } else {
                    events.push(CollisionEvent::new(ContactEventKind::End, *key));
                }
            }
        }
        for key in &current {
            let kind = if self.touching.contains(key) {
                ContactEventKind::Continue
            } else {
                ContactEventKind::Begin
            };
            events.push(CollisionEvent::new(kind, *key));
        }
        events.sort_by_key(|event| (event.a, event.b));
        self.touching = current;
        events
    }

    pub(crate) fn is_touching(&self, key: &PairKey) -> bool {
        self.touching.contains(key)
    }

    pub(crate) fn forget_body(&mut self, handle: BodyHandle) {
        self.touching.retain(|key| !key.involves(handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(a: u32, b: u32) -> PairKey {
        PairKey::new(BodyHandle::new(a, 0), BodyHandle::new(b, 0))
    }

    #[test]
    fn begin_continue_end_sequence() {
        let mut tracker = ContactTracker::default();
        let events = tracker.update(BTreeSet::from([key(0, 1)]), |_| false);
        assert_eq!(events[0].kind, ContactEventKind::Begin);

        let events = tracker.update(BTreeSet::from([key(0, 1), key(2, 3)]), |_| false);
        let kinds: Vec<_> = events.iter().map(|event| event.kind).collect();
        assert_eq!(kinds, vec![ContactEventKind::Continue, ContactEventKind::Begin]);

        let events = tracker.update(BTreeSet::from([key(2, 3)]), |_| false);
        assert_eq!(events[0].kind, ContactEventKind::End);
        assert_eq!(events[0].a, BodyHandle::new(0, 0));
        assert!(!tracker.is_touching(&key(0, 1)));
    }

    #[test]
    fn dormant_pairs_keep_touching() {
        let mut tracker = ContactTracker::default();
        tracker.update(BTreeSet::from([key(4, 5)]), |_| false);
        let events = tracker.update(BTreeSet::new(), |_| true);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ContactEventKind::Continue);
        assert!(tracker.is_touching(&key(4, 5)));
    }
}
