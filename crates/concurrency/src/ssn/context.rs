//! SSN's per-transaction context: the π/η watermarks and the
//! committing/finished state machine bits layered over the shared
//! [`Transaction`] object.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use tessera_core::{CommitId, MAX_CID};

use crate::transaction::Transaction;

/// Bound to one transaction for its whole lifetime. `pstamp` (π) is the
/// high watermark of this transaction's committed predecessors; `sstamp`
/// (η) is the low watermark of its committed successors. A transaction may
/// commit only while `pstamp < sstamp`.
pub struct SsnContext {
    pub transaction: Transaction,
    pstamp: AtomicU64,
    sstamp: AtomicU64,
    /// Commit timestamp, assigned at the start of pre-commit. `0` until
    /// then — a real cstamp is never `0` since [`tessera_core::FIRST_TXN_ID`]
    /// starts at `2`.
    cstamp: AtomicU64,
    is_abort: AtomicBool,
    is_finish: AtomicBool,
    is_committing: AtomicBool,
    /// Guards the pre-commit read-modify-write sequence (set committing,
    /// draw cstamp, lower sstamp) against a concurrent peer reading this
    /// context's watermarks mid-update.
    ctx_lock: Mutex<()>,
}

impl SsnContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            pstamp: AtomicU64::new(0),
            sstamp: AtomicU64::new(MAX_CID.0),
            cstamp: AtomicU64::new(0),
            is_abort: AtomicBool::new(false),
            is_finish: AtomicBool::new(false),
            is_committing: AtomicBool::new(false),
            ctx_lock: Mutex::new(()),
        }
    }

    pub fn pstamp(&self) -> CommitId {
        CommitId(self.pstamp.load(Ordering::SeqCst))
    }

    /// π only ever rises.
    pub fn bump_pstamp(&self, candidate: CommitId) {
        self.pstamp.fetch_max(candidate.0, Ordering::SeqCst);
    }

    pub fn sstamp(&self) -> CommitId {
        CommitId(self.sstamp.load(Ordering::SeqCst))
    }

    /// η only ever falls.
    pub fn lower_sstamp(&self, candidate: CommitId) {
        self.sstamp.fetch_min(candidate.0, Ordering::SeqCst);
    }

    pub fn cstamp(&self) -> CommitId {
        CommitId(self.cstamp.load(Ordering::SeqCst))
    }

    pub fn set_cstamp(&self, cid: CommitId) {
        self.cstamp.store(cid.0, Ordering::SeqCst);
    }

    pub fn is_abort(&self) -> bool {
        self.is_abort.load(Ordering::SeqCst)
    }

    pub fn set_abort(&self) {
        self.is_abort.store(true, Ordering::SeqCst);
    }

    pub fn is_finish(&self) -> bool {
        self.is_finish.load(Ordering::SeqCst)
    }

    pub fn set_finish(&self) {
        self.is_finish.store(true, Ordering::SeqCst);
    }

    pub fn is_committing(&self) -> bool {
        self.is_committing.load(Ordering::SeqCst)
    }

    pub fn set_committing(&self) {
        self.is_committing.store(true, Ordering::SeqCst);
    }

    /// SSN has no rw-antidependency flags to OR in; aborted-like collapses
    /// to the explicit flag.
    pub fn is_aborted_like(&self) -> bool {
        self.is_abort()
    }

    /// The watermark law: `π(T) >= η(T)` means T is non-serializable.
    pub fn would_abort(&self) -> bool {
        self.pstamp() >= self.sstamp()
    }

    pub fn lock(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.ctx_lock.lock()
    }
}

impl PartialEq for SsnContext {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::TxnId;

    fn ctx() -> SsnContext {
        SsnContext::new(Transaction::new(TxnId(2), CommitId(1), 0, false))
    }

    #[test]
    fn fresh_context_has_zero_pstamp_and_max_sstamp() {
        let c = ctx();
        assert_eq!(c.pstamp(), CommitId(0));
        assert_eq!(c.sstamp(), MAX_CID);
        assert!(!c.would_abort());
    }

    #[test]
    fn pstamp_only_rises() {
        let c = ctx();
        c.bump_pstamp(CommitId(10));
        assert_eq!(c.pstamp(), CommitId(10));
        c.bump_pstamp(CommitId(5));
        assert_eq!(c.pstamp(), CommitId(10));
        c.bump_pstamp(CommitId(20));
        assert_eq!(c.pstamp(), CommitId(20));
    }

    #[test]
    fn sstamp_only_falls() {
        let c = ctx();
        c.lower_sstamp(CommitId(50));
        assert_eq!(c.sstamp(), CommitId(50));
        c.lower_sstamp(CommitId(100));
        assert_eq!(c.sstamp(), CommitId(50));
        c.lower_sstamp(CommitId(10));
        assert_eq!(c.sstamp(), CommitId(10));
    }

    #[test]
    fn would_abort_once_pstamp_reaches_sstamp() {
        let c = ctx();
        c.lower_sstamp(CommitId(10));
        c.bump_pstamp(CommitId(9));
        assert!(!c.would_abort());
        c.bump_pstamp(CommitId(10));
        assert!(c.would_abort());
    }

    #[test]
    fn abort_flag_is_the_aborted_like_signal() {
        let c = ctx();
        assert!(!c.is_aborted_like());
        c.set_abort();
        assert!(c.is_aborted_like());
    }
}
