//! SSI's per-transaction context: the rw-antidependency encoding (two
//! conflict bits) layered over the shared [`Transaction`] object.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::transaction::Transaction;

/// Bound to one transaction for its whole lifetime. `in_conflict` records
/// that some other transaction's write precedes a read of this one's;
/// `out_conflict` records that this transaction's read precedes some other
/// transaction's write — the compact encoding of the rw-antidependency
/// graph described in the design notes.
pub struct SsiContext {
    pub transaction: Transaction,
    in_conflict: AtomicBool,
    out_conflict: AtomicBool,
    is_abort: AtomicBool,
    is_finish: AtomicBool,
    /// Guards read-modify-write sequences on the flags above against a
    /// concurrent peer doing the same (e.g. commit validation racing a
    /// remote `AcquireOwnership`'s dependency phase).
    ctx_lock: Mutex<()>,
}

impl SsiContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            in_conflict: AtomicBool::new(false),
            out_conflict: AtomicBool::new(false),
            is_abort: AtomicBool::new(false),
            is_finish: AtomicBool::new(false),
            ctx_lock: Mutex::new(()),
        }
    }

    pub fn in_conflict(&self) -> bool {
        self.in_conflict.load(Ordering::SeqCst)
    }

    pub fn set_in_conflict(&self) {
        self.in_conflict.store(true, Ordering::SeqCst);
    }

    pub fn out_conflict(&self) -> bool {
        self.out_conflict.load(Ordering::SeqCst)
    }

    pub fn set_out_conflict(&self) {
        self.out_conflict.store(true, Ordering::SeqCst);
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

    /// Racy-but-safe fast read used at entry points: a false `true` cannot
    /// occur (each underlying flag is monotonic, set-once), a false `false`
    /// only leads to spurious extra conflict registration.
    pub fn is_aborted_like(&self) -> bool {
        self.is_abort() || (self.in_conflict() && self.out_conflict())
    }

    /// Hold this context's per-context lock for the duration of a
    /// read-modify-write sequence on its flags.
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.ctx_lock.lock()
    }
}

impl PartialEq for SsiContext {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{CommitId, TxnId};

    fn ctx() -> SsiContext {
        SsiContext::new(Transaction::new(TxnId(2), CommitId(1), 0, false))
    }

    #[test]
    fn fresh_context_is_not_aborted_like() {
        let c = ctx();
        assert!(!c.is_aborted_like());
    }

    #[test]
    fn both_conflict_flags_required_for_aborted_like() {
        let c = ctx();
        c.set_in_conflict();
        assert!(!c.is_aborted_like());
        c.set_out_conflict();
        assert!(c.is_aborted_like());
    }

    #[test]
    fn explicit_abort_flag_short_circuits() {
        let c = ctx();
        c.set_abort();
        assert!(c.is_aborted_like());
    }
}
