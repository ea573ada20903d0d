//! The version slot: a fixed-position record inside a tile group.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tessera_core::{CommitId, ItemPointer, TxnId, INVALID_CID, INVALID_TXN_ID, MAX_CID};

use crate::indirection::IndirectionCell;
use crate::reserved::ReservedArea;

/// One version of one logical tuple.
///
/// Fields that participate in the publication protocol (`txn_id`,
/// `begin_cid`, `end_cid`) are plain atomics so a writer can publish them
/// with a release store and a reader can observe them with an acquire load,
/// per the publication order that links a version into its chain. `prev`,
/// `next` and the optional `indirection` pointer change less often and are
/// held behind a short lock rather than hand-rolled atomics.
pub struct VersionSlot<C> {
    txn_id: AtomicU64,
    begin_cid: AtomicU64,
    end_cid: AtomicU64,
    prev: Mutex<Option<ItemPointer>>,
    next: Mutex<Option<ItemPointer>>,
    /// Set only on the head version of a chain; `None` for every other
    /// version, matching the source system's `indirection_ptr` usage.
    indirection: Mutex<Option<Arc<IndirectionCell>>>,
    pub reserved: ReservedArea<C>,
}

impl<C> VersionSlot<C> {
    /// An empty, unoccupied slot: `txn_id = INVALID`, `begin = end = MAX_CID`.
    pub fn empty() -> Self {
        Self {
            txn_id: AtomicU64::new(INVALID_TXN_ID.0),
            begin_cid: AtomicU64::new(MAX_CID.0),
            end_cid: AtomicU64::new(MAX_CID.0),
            prev: Mutex::new(None),
            next: Mutex::new(None),
            indirection: Mutex::new(None),
            reserved: ReservedArea::new(0),
        }
    }

    pub fn txn_id(&self) -> TxnId {
        TxnId(self.txn_id.load(Ordering::Acquire))
    }

    pub fn set_txn_id(&self, value: TxnId) {
        self.txn_id.store(value.0, Ordering::Release);
    }

    /// Claim this (committed, unowned) slot for `new_owner`. Fails if
    /// another writer already holds or has claimed it.
    pub fn cas_txn_id(&self, expected: TxnId, new_owner: TxnId) -> bool {
        self.txn_id
            .compare_exchange(expected.0, new_owner.0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn begin_cid(&self) -> CommitId {
        CommitId(self.begin_cid.load(Ordering::Acquire))
    }

    pub fn set_begin_cid(&self, value: CommitId) {
        self.begin_cid.store(value.0, Ordering::Release);
    }

    pub fn end_cid(&self) -> CommitId {
        CommitId(self.end_cid.load(Ordering::Acquire))
    }

    pub fn set_end_cid(&self, value: CommitId) {
        self.end_cid.store(value.0, Ordering::Release);
    }

    pub fn prev(&self) -> Option<ItemPointer> {
        *self.prev.lock()
    }

    pub fn set_prev(&self, value: Option<ItemPointer>) {
        *self.prev.lock() = value;
    }

    pub fn next(&self) -> Option<ItemPointer> {
        *self.next.lock()
    }

    pub fn set_next(&self, value: Option<ItemPointer>) {
        *self.next.lock() = value;
    }

    pub fn indirection(&self) -> Option<Arc<IndirectionCell>> {
        self.indirection.lock().clone()
    }

    pub fn set_indirection(&self, cell: Option<Arc<IndirectionCell>>) {
        *self.indirection.lock() = cell;
    }

    /// Reset this slot to the empty sentinel state, used by both abort
    /// rollback of an insert and GC recycling.
    pub fn reset_to_empty(&self) {
        self.set_begin_cid(MAX_CID);
        self.set_end_cid(MAX_CID);
        self.set_prev(None);
        self.set_next(None);
        self.set_indirection(None);
        // Release ordering: any thread that subsequently observes the
        // INVALID sentinel also observes the sentinel begin/end above.
        self.txn_id.store(INVALID_TXN_ID.0, Ordering::Release);
    }

    /// Mark this slot's current value as a pending (uncommitted) delete:
    /// `end_cid = INVALID_CID` distinguishes it from "not yet superseded".
    pub fn mark_pending_delete(&self) {
        self.set_end_cid(INVALID_CID);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::INITIAL_TXN_ID;

    #[derive(PartialEq)]
    struct Dummy;

    #[test]
    fn empty_slot_has_sentinels() {
        let s: VersionSlot<Dummy> = VersionSlot::empty();
        assert_eq!(s.txn_id(), INVALID_TXN_ID);
        assert_eq!(s.begin_cid(), MAX_CID);
        assert_eq!(s.end_cid(), MAX_CID);
        assert!(s.prev().is_none());
        assert!(s.indirection().is_none());
    }

    #[test]
    fn cas_txn_id_only_succeeds_against_expected() {
        let s: VersionSlot<Dummy> = VersionSlot::empty();
        s.set_txn_id(INITIAL_TXN_ID);
        assert!(!s.cas_txn_id(TxnId(999), TxnId(5)));
        assert!(s.cas_txn_id(INITIAL_TXN_ID, TxnId(5)));
        assert_eq!(s.txn_id(), TxnId(5));
    }

    #[test]
    fn mark_pending_delete_sets_tombstone() {
        let s: VersionSlot<Dummy> = VersionSlot::empty();
        s.mark_pending_delete();
        assert_eq!(s.end_cid(), INVALID_CID);
    }

    #[test]
    fn reset_to_empty_restores_sentinels() {
        let s: VersionSlot<Dummy> = VersionSlot::empty();
        s.set_txn_id(TxnId(7));
        s.set_begin_cid(CommitId(3));
        s.set_end_cid(CommitId(4));
        s.reset_to_empty();
        assert_eq!(s.txn_id(), INVALID_TXN_ID);
        assert_eq!(s.begin_cid(), MAX_CID);
        assert_eq!(s.end_cid(), MAX_CID);
    }
}
