//! Identifiers and sentinel values shared across the multi-version substrate.
//!
//! Transaction ids and commit ids share a representation (`u64`) but are kept
//! as distinct newtypes so the two id spaces can never be mixed up at a call
//! site. Sentinel values follow the source system's conventions: the top of
//! the `u64` range means "not yet decided" (`MAX_CID` / uncommitted), and the
//! bottom two values are reserved for "empty slot" and "committed, unowned".

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction identifier. `0` and `1` are reserved sentinels (see
/// [`INVALID_TXN_ID`] and [`INITIAL_TXN_ID`]); real transactions start at `2`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

/// Commit identifier. Shares its numeric space with [`TxnId`] in the source
/// system; kept as a distinct type here so the two are never interchanged.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(pub u64);

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxnId({})", self.0)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.0)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Slot has never been occupied, or was occupied and then rolled back.
pub const INVALID_TXN_ID: TxnId = TxnId(0);
/// Slot holds a committed, currently unowned version.
pub const INITIAL_TXN_ID: TxnId = TxnId(1);
/// First id a real transaction may be assigned.
pub const FIRST_TXN_ID: TxnId = TxnId(2);

/// No commit id has been assigned yet (uncommitted version, or an SSN
/// watermark that has not been lowered/raised from its initial value).
pub const MAX_CID: CommitId = CommitId(u64::MAX);
/// Tombstone marker: this version's `end_cid` field holds this value while a
/// delete is in flight, distinguishing it from `MAX_CID` ("not yet superseded").
pub const INVALID_CID: CommitId = CommitId(u64::MAX - 1);
/// First id a real commit may be assigned.
pub const FIRST_CID: CommitId = CommitId(0);

impl TxnId {
    pub fn is_valid(self) -> bool {
        self != INVALID_TXN_ID
    }
}

impl CommitId {
    pub fn is_decided(self) -> bool {
        self != MAX_CID && self != INVALID_CID
    }
}

/// A tile group's identity, as handed out by the (external) storage
/// allocator. Opaque beyond equality and ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlockId(pub u64);

/// Address of a version slot: which tile group, and which offset within it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ItemPointer {
    pub block: BlockId,
    pub offset: u32,
}

impl ItemPointer {
    pub fn new(block: BlockId, offset: u32) -> Self {
        Self { block, offset }
    }
}

/// Dispenses [`TxnId`]s and [`CommitId`]s while preserving the invariant that
/// a larger transaction id is always paired with a larger begin commit id
/// (I4 in the data model): two independent atomics would let a thread observe
/// them out of order, so both are drawn while holding a short serializing
/// lock.
pub struct IdAllocator {
    next_txn_id: AtomicU64,
    next_cid: AtomicU64,
    order_lock: parking_lot::Mutex<()>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU64::new(FIRST_TXN_ID.0),
            next_cid: AtomicU64::new(FIRST_CID.0),
            order_lock: parking_lot::Mutex::new(()),
        }
    }

    /// Allocate a (txn_id, begin_cid) pair such that I4 holds against every
    /// pair allocated before or after it.
    pub fn allocate_txn(&self) -> (TxnId, CommitId) {
        let _guard = self.order_lock.lock();
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let begin_cid = self.next_cid.fetch_add(1, Ordering::SeqCst);
        (TxnId(txn_id), CommitId(begin_cid))
    }

    /// Allocate a commit id alone, e.g. at commit entry or for SSN's cstamp.
    pub fn allocate_cid(&self) -> CommitId {
        CommitId(self.next_cid.fetch_add(1, Ordering::SeqCst))
    }

    /// Allocate a txn id alone, used by SSN to draw `cstamp` from the same
    /// counter space as transaction ids (per the source system).
    pub fn allocate_txn_id(&self) -> TxnId {
        TxnId(self.next_txn_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_distinct() {
        assert_ne!(INVALID_TXN_ID, INITIAL_TXN_ID);
        assert_ne!(MAX_CID, INVALID_CID);
        assert!(!INVALID_TXN_ID.is_valid());
        assert!(INITIAL_TXN_ID.is_valid());
        assert!(!MAX_CID.is_decided());
        assert!(!INVALID_CID.is_decided());
    }

    #[test]
    fn allocator_monotone_pairs_preserve_i4() {
        let alloc = IdAllocator::new();
        let (t1, b1) = alloc.allocate_txn();
        let (t2, b2) = alloc.allocate_txn();
        assert!(t2 > t1);
        assert!(b2 > b1);
    }

    #[test]
    fn allocator_concurrent_preserves_i4() {
        use std::sync::Arc;
        let alloc = Arc::new(IdAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let alloc = Arc::clone(&alloc);
            handles.push(std::thread::spawn(move || {
                (0..200).map(|_| alloc.allocate_txn()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<(TxnId, CommitId)> =
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_by_key(|(t, _)| *t);
        for w in all.windows(2) {
            assert!(w[1].0 > w[0].0);
            assert!(w[1].1 > w[0].1, "I4 violated: {:?} then {:?}", w[0], w[1]);
        }
    }

    proptest::proptest! {
        /// I4 for any run length: whatever order a single-threaded sequence
        /// of `allocate_txn` calls happens in, txn id order and begin_cid
        /// order agree pairwise.
        #[test]
        fn sequential_allocations_preserve_i4(n in 1usize..200) {
            let alloc = IdAllocator::new();
            let draws: Vec<(TxnId, CommitId)> = (0..n).map(|_| alloc.allocate_txn()).collect();
            for w in draws.windows(2) {
                proptest::prop_assert!(w[1].0 > w[0].0);
                proptest::prop_assert!(w[1].1 > w[0].1);
            }
        }
    }
}
