//! The tile group: a fixed-capacity block of version slots, and the
//! catalog that resolves a [`BlockId`] to one.
//!
//! Real tile-group allocation (growth, compaction, column layout) is an
//! external collaborator's concern; this crate only needs something that
//! hands back a [`VersionSlot`] by offset, so the catalog here is a minimal
//! in-memory stand-in that keeps the certifier crate self-testable.

use std::sync::Arc;

use dashmap::DashMap;

use tessera_core::{BlockId, ItemPointer};

use crate::slot::VersionSlot;

/// A contiguous run of version slots sharing one `BlockId`.
pub struct TileGroup<C> {
    id: BlockId,
    slots: Vec<VersionSlot<C>>,
}

impl<C> TileGroup<C> {
    pub fn new(id: BlockId, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, VersionSlot::empty);
        Self { id, slots }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The slot at `offset`, or `None` if the tile group was not sized to
    /// hold it.
    pub fn slot(&self, offset: u32) -> Option<&VersionSlot<C>> {
        self.slots.get(offset as usize)
    }

    pub fn slot_at(&self, ptr: ItemPointer) -> Option<&VersionSlot<C>> {
        debug_assert_eq!(ptr.block, self.id);
        self.slot(ptr.offset)
    }

    /// Find the first empty slot, claim nothing, just report its offset.
    /// Real allocation would track a free list; a linear scan is adequate
    /// for the bounded tile groups this crate creates in tests.
    pub fn first_empty_offset(&self) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| !s.txn_id().is_valid())
            .map(|i| i as u32)
    }
}

/// Resolves tile groups by id. Mirrors the single collaborator method this
/// crate actually needs from a real storage-allocation subsystem.
pub trait TileGroupCatalog<C> {
    fn get(&self, id: BlockId) -> Option<Arc<TileGroup<C>>>;
}

/// An in-memory catalog sufficient for tests and for embedding this crate
/// without a real storage-allocation layer.
#[derive(Default)]
pub struct InMemoryCatalog<C> {
    groups: DashMap<BlockId, Arc<TileGroup<C>>>,
}

impl<C> InMemoryCatalog<C> {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    pub fn create(&self, id: BlockId, capacity: usize) -> Arc<TileGroup<C>> {
        let group = Arc::new(TileGroup::new(id, capacity));
        self.groups.insert(id, Arc::clone(&group));
        tracing::trace!(?id, capacity, "tile group created");
        group
    }
}

impl<C> TileGroupCatalog<C> for InMemoryCatalog<C> {
    fn get(&self, id: BlockId) -> Option<Arc<TileGroup<C>>> {
        self.groups.get(&id).map(|e| Arc::clone(e.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(PartialEq)]
    struct Dummy;

    #[test]
    fn catalog_create_then_get_round_trips() {
        let catalog: InMemoryCatalog<Dummy> = InMemoryCatalog::new();
        let created = catalog.create(BlockId(1), 4);
        let fetched = catalog.get(BlockId(1)).expect("group present");
        assert_eq!(fetched.id(), created.id());
        assert_eq!(fetched.capacity(), 4);
    }

    #[test]
    fn missing_group_is_none() {
        let catalog: InMemoryCatalog<Dummy> = InMemoryCatalog::new();
        assert!(catalog.get(BlockId(42)).is_none());
    }

    #[test]
    fn first_empty_offset_finds_unclaimed_slot() {
        let group: TileGroup<Dummy> = TileGroup::new(BlockId(1), 3);
        assert_eq!(group.first_empty_offset(), Some(0));
        group
            .slot(0)
            .unwrap()
            .set_txn_id(tessera_core::TxnId(5));
        assert_eq!(group.first_empty_offset(), Some(1));
    }
}
