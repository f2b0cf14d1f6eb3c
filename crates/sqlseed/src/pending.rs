//! The pending-updates ledger.
//!
//! When a reference is encountered whose target has no identity yet, the
//! originating property registers an entry against the target. Once the
//! target is persisted and its identity becomes available, the entries are
//! removed and replayed — removal (not marking) is what guarantees
//! at-most-once re-emission.

use std::collections::BTreeMap;

use sqlseed_core::ColumnExpression;

use crate::graph::{ElementValue, EntityId};

/// Identifies the property that registered a deferred reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PropertyHandle {
    /// Entity type owning the property.
    pub owner_type: String,
    /// Index into the owner type's property list.
    pub index: usize,
}

/// One deferred reference, with everything needed to replay the emission
/// exactly as it would have happened inline.
#[derive(Debug, Clone)]
pub(crate) struct PendingUpdate {
    /// The entity holding the reference.
    pub context: EntityId,
    /// The property that produced the reference.
    pub property: PropertyHandle,
    /// Key/index expression captured at registration time, for plural rows.
    pub key: Option<ColumnExpression>,
    /// The collection element captured at registration time; `None` for
    /// singular references.
    pub element: Option<ElementValue>,
}

/// Pending entries for the targets of one entity type, FIFO per target.
#[derive(Debug, Default)]
pub(crate) struct PendingLedger {
    entries: BTreeMap<EntityId, Vec<PendingUpdate>>,
}

impl PendingLedger {
    fn register(&mut self, target: EntityId, update: PendingUpdate) {
        self.entries.entry(target).or_default().push(update);
    }

    fn take(&mut self, target: EntityId) -> Vec<PendingUpdate> {
        self.entries.remove(&target).unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-type ledgers for one generation run.
///
/// Owned by the driver, so independent runs can never see each other's
/// deferred work.
#[derive(Debug, Default)]
pub(crate) struct Ledgers {
    by_type: BTreeMap<String, PendingLedger>,
}

impl Ledgers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a deferred reference against `target`.
    pub(crate) fn register(&mut self, target_type: &str, target: EntityId, update: PendingUpdate) {
        tracing::debug!(
            target_type,
            target = %target,
            context = %update.context,
            property = %update.property.index,
            "deferring reference until target identity is available"
        );
        self.by_type
            .entry(target_type.to_string())
            .or_default()
            .register(target, update);
    }

    /// Remove and return every entry registered against `target`, in
    /// registration order.
    pub(crate) fn take(&mut self, target_type: &str, target: EntityId) -> Vec<PendingUpdate> {
        self.by_type
            .get_mut(target_type)
            .map(|ledger| ledger.take(target))
            .unwrap_or_default()
    }

    /// Whether any deferred reference remains.
    pub(crate) fn is_empty(&self) -> bool {
        self.by_type.values().all(PendingLedger::is_empty)
    }

    /// Drain everything that was never flushed, in deterministic order.
    pub(crate) fn drain_remaining(&mut self) -> Vec<(EntityId, PendingUpdate)> {
        let mut remaining = Vec::new();
        for ledger in self.by_type.values_mut() {
            for (target, updates) in std::mem::take(&mut ledger.entries) {
                for update in updates {
                    remaining.push((target, update));
                }
            }
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, EntityGraph};

    fn update(context: EntityId, index: usize) -> PendingUpdate {
        PendingUpdate {
            context,
            property: PropertyHandle { owner_type: "Organisation".into(), index },
            key: None,
            element: None,
        }
    }

    fn two_ids() -> (EntityId, EntityId) {
        let mut graph = EntityGraph::new();
        let a = graph.add(Entity::new("Organisation"));
        let b = graph.add(Entity::new("Organisation"));
        (a, b)
    }

    #[test]
    fn test_take_removes_entries() {
        let (a, b) = two_ids();
        let mut ledgers = Ledgers::new();
        ledgers.register("Organisation", b, update(a, 0));
        let first = ledgers.take("Organisation", b);
        assert_eq!(first.len(), 1);
        // A second take finds nothing: flushed entries are gone.
        assert!(ledgers.take("Organisation", b).is_empty());
        assert!(ledgers.is_empty());
    }

    #[test]
    fn test_fifo_per_target() {
        let (a, b) = two_ids();
        let mut ledgers = Ledgers::new();
        ledgers.register("Organisation", b, update(a, 2));
        ledgers.register("Organisation", b, update(a, 0));
        ledgers.register("Organisation", b, update(a, 1));
        let taken = ledgers.take("Organisation", b);
        let order: Vec<usize> = taken.iter().map(|u| u.property.index).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_drain_remaining_reports_unflushed() {
        let (a, b) = two_ids();
        let mut ledgers = Ledgers::new();
        ledgers.register("Organisation", a, update(b, 0));
        ledgers.register("Organisation", b, update(a, 1));
        let remaining = ledgers.drain_remaining();
        assert_eq!(remaining.len(), 2);
        assert!(ledgers.is_empty());
    }
}
