//! The per-transaction read/write set and GC-set: nested maps from
//! tile-group id to slot offset, matching the tile-group header's own
//! addressing scheme so installation and rollback can walk them directly.

use std::collections::HashMap;

use tessera_core::{BlockId, ItemPointer};

use crate::access::AccessType;

/// Every slot a transaction has touched, and how.
#[derive(Default)]
pub struct ReadWriteSet {
    groups: HashMap<BlockId, HashMap<u32, AccessType>>,
}

impl ReadWriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, loc: ItemPointer) -> Option<AccessType> {
        self.groups.get(&loc.block)?.get(&loc.offset).copied()
    }

    fn set(&mut self, loc: ItemPointer, access: AccessType) {
        self.groups
            .entry(loc.block)
            .or_default()
            .insert(loc.offset, access);
    }

    /// Record a read, but only if this slot has no entry yet: a prior
    /// `Update`/`Delete`/`Insert` tag must not be downgraded to `Read`.
    pub fn record_read(&mut self, loc: ItemPointer) {
        self.groups
            .entry(loc.block)
            .or_default()
            .entry(loc.offset)
            .or_insert(AccessType::Read);
    }

    pub fn record_read_own(&mut self, loc: ItemPointer) {
        self.set(loc, AccessType::ReadOwn);
    }

    pub fn record_update(&mut self, loc: ItemPointer) {
        self.set(loc, AccessType::Update);
    }

    pub fn record_insert(&mut self, loc: ItemPointer) {
        self.set(loc, AccessType::Insert);
    }

    /// Record a delete of `loc`. If `loc` was this same transaction's own
    /// fresh insert, the pair collapses to `InsDel` and `true` is returned
    /// so the caller can skip any commit-time dependency work for it.
    pub fn record_delete(&mut self, loc: ItemPointer) -> bool {
        if self.get(loc) == Some(AccessType::Insert) {
            self.set(loc, AccessType::InsDel);
            true
        } else {
            self.set(loc, AccessType::Delete);
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(|m| m.is_empty())
    }

    /// Whether any entry is a write of some kind, as opposed to a plain
    /// read — used to decide whether a read-only-declared transaction
    /// actually has anything to install.
    pub fn has_writes(&self) -> bool {
        self.entries()
            .iter()
            .any(|(_, a)| !matches!(a, AccessType::Read | AccessType::ReadOwn))
    }

    /// A stable snapshot of every entry, for commit/abort traversal without
    /// holding this set's own lock during installation.
    pub fn entries(&self) -> Vec<(ItemPointer, AccessType)> {
        let mut out = Vec::new();
        for (&block, slots) in &self.groups {
            for (&offset, &access) in slots {
                out.push((ItemPointer::new(block, offset), access));
            }
        }
        out
    }
}

/// Slots released by a finishing transaction, each tagged with whether its
/// index entry must also be removed.
#[derive(Default)]
pub struct GcSet {
    groups: HashMap<BlockId, HashMap<u32, bool>>,
}

impl GcSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, loc: ItemPointer, delete_from_index: bool) {
        self.groups
            .entry(loc.block)
            .or_default()
            .insert(loc.offset, delete_from_index);
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(|m| m.is_empty())
    }

    pub fn entries(&self) -> Vec<(ItemPointer, bool)> {
        let mut out = Vec::new();
        for (&block, slots) in &self.groups {
            for (&offset, &delete_from_index) in slots {
                out.push((ItemPointer::new(block, offset), delete_from_index));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::BlockId;

    fn ptr(offset: u32) -> ItemPointer {
        ItemPointer::new(BlockId(1), offset)
    }

    #[test]
    fn read_does_not_overwrite_existing_entry() {
        let mut rw = ReadWriteSet::new();
        rw.record_insert(ptr(1));
        rw.record_read(ptr(1));
        assert_eq!(rw.get(ptr(1)), Some(AccessType::Insert));
    }

    #[test]
    fn delete_of_own_insert_collapses_to_ins_del() {
        let mut rw = ReadWriteSet::new();
        rw.record_insert(ptr(1));
        assert!(rw.record_delete(ptr(1)));
        assert_eq!(rw.get(ptr(1)), Some(AccessType::InsDel));
    }

    #[test]
    fn delete_of_foreign_version_is_plain_delete() {
        let mut rw = ReadWriteSet::new();
        assert!(!rw.record_delete(ptr(2)));
        assert_eq!(rw.get(ptr(2)), Some(AccessType::Delete));
    }

    #[test]
    fn has_writes_ignores_plain_reads() {
        let mut rw = ReadWriteSet::new();
        rw.record_read(ptr(1));
        assert!(!rw.has_writes());
        rw.record_update(ptr(1));
        assert!(rw.has_writes());
    }

    #[test]
    fn gc_set_round_trips_entries() {
        let mut gc = GcSet::new();
        gc.insert(ptr(3), true);
        assert_eq!(gc.entries(), vec![(ptr(3), true)]);
    }

    proptest::proptest! {
        /// `record_read` must never downgrade an existing write marker back
        /// to `Read`, no matter which write tag got there first.
        #[test]
        fn read_never_downgrades_a_prior_write(which in 0u8..4) {
            let mut rw = ReadWriteSet::new();
            let loc = ptr(9);
            let tag = match which {
                0 => { rw.record_insert(loc); AccessType::Insert }
                1 => { rw.record_update(loc); AccessType::Update }
                2 => { rw.record_read_own(loc); AccessType::ReadOwn }
                _ => { rw.record_delete(loc); AccessType::Delete }
            };
            rw.record_read(loc);
            proptest::prop_assert_eq!(rw.get(loc), Some(tag));
        }
    }
}
