//! Collaborator interfaces this core consumes but does not implement:
//! epoch-based reclamation and garbage collection. Both are out of scope
//! (§1); a transaction only needs to call into them at the right moments.

use tessera_core::{CommitId, ItemPointer};

/// Epoch boundary hooks tied to a transaction's lifetime.
pub trait EpochManager: Send + Sync {
    /// Called from `BeginTransaction`. Returns the epoch id the caller must
    /// present back to `ExitEpoch`.
    fn enter_epoch(&self, thread_id: u64) -> u64;

    /// Called from `BeginReadonlyTransaction`.
    fn enter_epoch_ro(&self, thread_id: u64) -> u64 {
        self.enter_epoch(thread_id)
    }

    /// Called from `EndTransaction` / `EndReadonlyTransaction`.
    fn exit_epoch(&self, thread_id: u64, epoch_id: u64);
}

/// An epoch manager that performs no reclamation bookkeeping at all —
/// sufficient for tests and for embedding this crate without a real
/// epoch subsystem.
#[derive(Default)]
pub struct NoopEpochManager;

impl EpochManager for NoopEpochManager {
    fn enter_epoch(&self, _thread_id: u64) -> u64 {
        0
    }

    fn exit_epoch(&self, _thread_id: u64, _epoch_id: u64) {}
}

/// Consumes a finishing transaction's GC-set once it is safe to reclaim
/// (after epoch exit).
pub trait GcManager: Send + Sync {
    fn recycle_transaction(&self, cid: CommitId, entries: &[(ItemPointer, bool)]);
}

/// A GC manager that does no reclamation, only logs what it was handed —
/// the default used wherever a real recycler is not wired in.
#[derive(Default)]
pub struct TracingGcManager;

impl GcManager for TracingGcManager {
    fn recycle_transaction(&self, cid: CommitId, entries: &[(ItemPointer, bool)]) {
        tracing::debug!(commit_id = %cid, slots = entries.len(), "publishing gc-set");
        for (loc, delete_from_index) in entries {
            tracing::trace!(?loc, delete_from_index, "slot released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_epoch_manager_round_trips() {
        let m = NoopEpochManager;
        let eid = m.enter_epoch(1);
        m.exit_epoch(1, eid);
    }

    #[test]
    fn tracing_gc_manager_accepts_empty_set() {
        let m = TracingGcManager;
        m.recycle_transaction(CommitId(1), &[]);
    }
}
