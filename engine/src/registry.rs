//! In-memory registries owned by the change tracker.
//!
//! Mutators are crate-private; everything outside the engine reads through
//! [`ChangeTracker`](crate::ChangeTracker).

use crate::change::{ChangePatch, ChangeRecord};
use crate::conflict::{Conflict, EntityKey};
use crate::{ChangeId, ConflictId};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct Slot {
    /// Arrival sequence, used to keep per-entity reads in arrival order
    seq: u64,
    record: ChangeRecord,
}

/// Live, in-flight changes keyed by change id.
#[derive(Debug, Clone, Default)]
pub struct ChangeRegistry {
    slots: HashMap<ChangeId, Slot>,
    next_seq: u64,
}

impl ChangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any record with the same id.
    ///
    /// A replaced record keeps its original arrival position.
    pub(crate) fn insert(&mut self, record: ChangeRecord) {
        if let Some(slot) = self.slots.get_mut(&record.id) {
            slot.record = record;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(record.id.clone(), Slot { seq, record });
    }

    /// Merge a patch into an existing record. Returns false for unknown ids.
    pub(crate) fn patch(&mut self, id: &str, patch: ChangePatch) -> bool {
        match self.slots.get_mut(id) {
            Some(slot) => {
                slot.record.apply_patch(patch);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<ChangeRecord> {
        self.slots.remove(id).map(|slot| slot.record)
    }

    pub fn get(&self, id: &str) -> Option<&ChangeRecord> {
        self.slots.get(id).map(|slot| &slot.record)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Records for one entity, in arrival order.
    pub fn for_entity(&self, key: &EntityKey) -> Vec<&ChangeRecord> {
        let mut slots: Vec<&Slot> = self
            .slots
            .values()
            .filter(|slot| slot.record.targets(key))
            .collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| &slot.record).collect()
    }

    /// Whether any in-flight record targets this entity.
    pub fn has_entity(&self, key: &EntityKey) -> bool {
        self.slots.values().any(|slot| slot.record.targets(key))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Open conflicts keyed by entity, each list in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ConflictRegistry {
    by_entity: HashMap<EntityKey, Vec<Conflict>>,
}

impl ConflictRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a conflict and return the accumulated list for the entity.
    pub(crate) fn append(&mut self, key: EntityKey, conflict: Conflict) -> &[Conflict] {
        let list = self.by_entity.entry(key).or_default();
        list.push(conflict);
        list
    }

    pub fn for_entity(&self, key: &EntityKey) -> &[Conflict] {
        self.by_entity.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop every conflict for the entity. Returns how many were removed.
    pub(crate) fn clear(&mut self, key: &EntityKey) -> usize {
        self.by_entity.remove(key).map_or(0, |list| list.len())
    }

    /// Drop the listed conflicts for the entity; the key disappears when
    /// nothing remains. Conflicts that arrived later are kept.
    pub(crate) fn remove(&mut self, key: &EntityKey, ids: &HashSet<ConflictId>) -> usize {
        let Some(list) = self.by_entity.get_mut(key) else {
            return 0;
        };
        let before = list.len();
        list.retain(|conflict| !ids.contains(&conflict.id));
        let removed = before - list.len();
        if list.is_empty() {
            self.by_entity.remove(key);
        }
        removed
    }

    /// Entities with at least one open conflict.
    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.by_entity.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeLevel, ConflictType};

    fn record(id: &str, entity_id: &str) -> ChangeRecord {
        ChangeRecord::new(id, "tag", entity_id, ChangeLevel::Optimistic)
    }

    #[test]
    fn for_entity_keeps_arrival_order() {
        let mut registry = ChangeRegistry::new();
        for id in ["z", "a", "m"] {
            registry.insert(record(id, "t1"));
        }
        registry.insert(record("other", "t2"));

        let ids: Vec<_> = registry
            .for_entity(&EntityKey::new("tag", "t1"))
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn reinsert_keeps_position() {
        let mut registry = ChangeRegistry::new();
        registry.insert(record("first", "t1"));
        registry.insert(record("second", "t1"));
        registry.insert(record("first", "t1").with_status(crate::ChangeStatus::Approved));

        let records = registry.for_entity(&EntityKey::new("tag", "t1"));
        assert_eq!(records[0].id, "first");
        assert_eq!(records[0].status, crate::ChangeStatus::Approved);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unknown_ids_are_noops() {
        let mut registry = ChangeRegistry::new();
        registry.insert(record("c1", "t1"));

        assert!(!registry.patch("missing", ChangePatch::default()));
        assert!(registry.remove("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn conflicts_accumulate_and_remove() {
        let mut registry = ConflictRegistry::new();
        let key = EntityKey::new("tag", "t1");

        registry.append(key.clone(), Conflict::new("k1", ConflictType::ConcurrentEdit));
        let all = registry.append(key.clone(), Conflict::new("k2", ConflictType::StaleData));
        assert_eq!(all.len(), 2);

        let resolved: HashSet<ConflictId> = ["k1".to_string()].into_iter().collect();
        assert_eq!(registry.remove(&key, &resolved), 1);
        assert_eq!(registry.for_entity(&key).len(), 1);
        assert_eq!(registry.for_entity(&key)[0].id, "k2");

        let resolved: HashSet<ConflictId> = ["k2".to_string()].into_iter().collect();
        assert_eq!(registry.remove(&key, &resolved), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.clear(&key), 0);
    }
}
