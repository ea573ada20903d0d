//! The transaction object: identity, snapshot window, and the read/write
//! and GC sets accumulated as it runs.
//!
//! A `Transaction` is thread-local for its whole lifetime — it is created
//! and driven to completion by a single OS thread, identified by
//! `thread_id` — but its `end_cid` is read by *other* threads while this
//! one is still live (visibility checks, dependency tracking against a
//! concurrent committer), so that one field is a plain atomic rather than
//! something behind this struct's own locks.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use tessera_core::{CommitId, ItemPointer, TransactionResult, TxnId, MAX_CID};

use crate::access::AccessType;
use crate::rwset::{GcSet, ReadWriteSet};

/// Per-transaction state shared by both certifier protocols.
pub struct Transaction {
    txn_id: TxnId,
    thread_id: u64,
    begin_cid: CommitId,
    end_cid: AtomicU64,
    declared_read_only: bool,
    epoch_id: AtomicU64,
    result: Mutex<TransactionResult>,
    rw_set: Mutex<ReadWriteSet>,
    gc_set: Mutex<GcSet>,
}

impl Transaction {
    pub fn new(txn_id: TxnId, begin_cid: CommitId, thread_id: u64, declared_read_only: bool) -> Self {
        Self {
            txn_id,
            thread_id,
            begin_cid,
            end_cid: AtomicU64::new(MAX_CID.0),
            declared_read_only,
            epoch_id: AtomicU64::new(0),
            result: Mutex::new(TransactionResult::Success),
            rw_set: Mutex::new(ReadWriteSet::new()),
            gc_set: Mutex::new(GcSet::new()),
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn begin_cid(&self) -> CommitId {
        self.begin_cid
    }

    pub fn end_cid(&self) -> CommitId {
        CommitId(self.end_cid.load(Ordering::Acquire))
    }

    pub fn set_end_cid(&self, cid: CommitId) {
        self.end_cid.store(cid.0, Ordering::Release);
    }

    pub fn declared_read_only(&self) -> bool {
        self.declared_read_only
    }

    pub fn epoch_id(&self) -> u64 {
        self.epoch_id.load(Ordering::Acquire)
    }

    pub fn set_epoch_id(&self, eid: u64) {
        self.epoch_id.store(eid, Ordering::Release);
    }

    pub fn result(&self) -> TransactionResult {
        *self.result.lock()
    }

    pub fn set_result(&self, result: TransactionResult) {
        *self.result.lock() = result;
    }

    pub fn access_type(&self, loc: ItemPointer) -> Option<AccessType> {
        self.rw_set.lock().get(loc)
    }

    pub fn record_read(&self, loc: ItemPointer) {
        self.rw_set.lock().record_read(loc);
    }

    pub fn record_read_own(&self, loc: ItemPointer) {
        self.rw_set.lock().record_read_own(loc);
    }

    pub fn record_update(&self, loc: ItemPointer) {
        self.rw_set.lock().record_update(loc);
    }

    pub fn record_insert(&self, loc: ItemPointer) {
        self.rw_set.lock().record_insert(loc);
    }

    pub fn record_delete(&self, loc: ItemPointer) -> bool {
        self.rw_set.lock().record_delete(loc)
    }

    /// A stable snapshot of the read/write set for commit/abort traversal.
    pub fn rw_set_entries(&self) -> Vec<(ItemPointer, AccessType)> {
        self.rw_set.lock().entries()
    }

    pub fn has_writes(&self) -> bool {
        self.rw_set.lock().has_writes()
    }

    pub fn record_gc(&self, loc: ItemPointer, delete_from_index: bool) {
        self.gc_set.lock().insert(loc, delete_from_index);
    }

    pub fn gc_set_entries(&self) -> Vec<(ItemPointer, bool)> {
        self.gc_set.lock().entries()
    }

    pub fn gc_set_is_empty(&self) -> bool {
        self.gc_set.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::BlockId;

    fn ptr(offset: u32) -> ItemPointer {
        ItemPointer::new(BlockId(7), offset)
    }

    #[test]
    fn fresh_transaction_has_max_end_cid_and_success_result() {
        let t = Transaction::new(TxnId(5), CommitId(4), 1, false);
        assert_eq!(t.end_cid(), MAX_CID);
        assert_eq!(t.result(), TransactionResult::Success);
        assert!(!t.declared_read_only());
    }

    #[test]
    fn rw_set_and_gc_set_accumulate_through_the_handle() {
        let t = Transaction::new(TxnId(5), CommitId(4), 1, false);
        t.record_insert(ptr(1));
        assert_eq!(t.access_type(ptr(1)), Some(AccessType::Insert));
        assert!(t.record_delete(ptr(1)));
        assert_eq!(t.access_type(ptr(1)), Some(AccessType::InsDel));
        t.record_gc(ptr(1), true);
        assert_eq!(t.gc_set_entries(), vec![(ptr(1), true)]);
    }

    #[test]
    fn set_end_cid_is_visible_without_external_locking() {
        let t = Transaction::new(TxnId(5), CommitId(4), 1, false);
        t.set_end_cid(CommitId(99));
        assert_eq!(t.end_cid(), CommitId(99));
    }
}
