//! The tagged-variant `TransactionManager` facade: one entry point for the
//! executor that dispatches every operation to whichever certifier (SSI or
//! SSN) this instance was built with.
//!
//! The source this crate is modeled on derives its SSI and SSN managers
//! from a common abstract base selected through a factory. A tagged enum
//! gets the same single entry point without virtual dispatch on the hot
//! path: each call is one match on a two-variant enum, not an indirect call
//! through a vtable.

use std::sync::Arc;

use tessera_core::{Error, ItemPointer, Result, TransactionResult};
use tessera_storage::{IndirectionCell, TileGroupCatalog, Visibility};

use crate::epoch::{EpochManager, GcManager};
use crate::ssi::{SsiContext, SsiManager};
use crate::ssn::{SsnContext, SsnManager};

// Every context type is handed across threads as an `Arc` the moment a
// concurrent committer's dependency check looks it up by txn id or cstamp;
// if either context ever grew a field that broke `Send`/`Sync` this should
// fail to compile rather than deadlock or data-race at runtime.
static_assertions::assert_impl_all!(SsiContext: Send, Sync);
static_assertions::assert_impl_all!(SsnContext: Send, Sync);
static_assertions::assert_impl_all!(TransactionManager: Send, Sync);

/// A running transaction, tagged by which certifier produced it. Every
/// operation below requires the handle to match the manager it is passed
/// to; a mismatch is a caller bug surfaced as `Error::InvalidState` rather
/// than a panic.
pub enum TransactionHandle {
    Ssi(Arc<SsiContext>),
    Ssn(Arc<SsnContext>),
}

impl TransactionHandle {
    /// The result recorded on this handle's underlying transaction, valid
    /// to inspect after `CommitTransaction`/`AbortTransaction` returns.
    pub fn result(&self) -> TransactionResult {
        match self {
            TransactionHandle::Ssi(ctx) => ctx.transaction.result(),
            TransactionHandle::Ssn(ctx) => ctx.transaction.result(),
        }
    }

    /// Let the executor flag this transaction for a caller-driven abort
    /// (the `UserAbort` path); the next `CommitTransaction` call will roll
    /// it back instead of installing.
    pub fn mark_failure(&self) {
        match self {
            TransactionHandle::Ssi(ctx) => ctx.transaction.set_result(TransactionResult::Failure),
            TransactionHandle::Ssn(ctx) => ctx.transaction.set_result(TransactionResult::Failure),
        }
    }
}

/// Owns one certifier's worth of shared state and dispatches every
/// executor-facing operation to it.
pub enum TransactionManager {
    Ssi(SsiManager),
    Ssn(SsnManager),
}

impl TransactionManager {
    pub fn new_ssi(
        catalog: Arc<dyn TileGroupCatalog<SsiContext> + Send + Sync>,
        epoch: Arc<dyn EpochManager>,
        gc: Arc<dyn GcManager>,
    ) -> Self {
        TransactionManager::Ssi(SsiManager::new(catalog, epoch, gc))
    }

    pub fn new_ssn(
        catalog: Arc<dyn TileGroupCatalog<SsnContext> + Send + Sync>,
        epoch: Arc<dyn EpochManager>,
        gc: Arc<dyn GcManager>,
    ) -> Self {
        TransactionManager::Ssn(SsnManager::new(catalog, epoch, gc))
    }

    fn mismatch() -> Error {
        Error::invalid_state("transaction handle does not match this manager's certifier")
    }

    pub fn begin_transaction(&self, thread_id: u64) -> TransactionHandle {
        match self {
            TransactionManager::Ssi(m) => TransactionHandle::Ssi(m.begin_transaction(thread_id)),
            TransactionManager::Ssn(m) => TransactionHandle::Ssn(m.begin_transaction(thread_id)),
        }
    }

    pub fn begin_readonly_transaction(&self, thread_id: u64) -> TransactionHandle {
        match self {
            TransactionManager::Ssi(m) => TransactionHandle::Ssi(m.begin_readonly_transaction(thread_id)),
            TransactionManager::Ssn(m) => TransactionHandle::Ssn(m.begin_readonly_transaction(thread_id)),
        }
    }

    pub fn end_transaction(&self, handle: &TransactionHandle) -> Result<()> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => {
                m.end_transaction(ctx);
                Ok(())
            }
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => {
                m.end_transaction(ctx);
                Ok(())
            }
            _ => Err(Self::mismatch()),
        }
    }

    pub fn end_readonly_transaction(&self, handle: &TransactionHandle) -> Result<()> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => {
                m.end_readonly_transaction(ctx);
                Ok(())
            }
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => {
                m.end_readonly_transaction(ctx);
                Ok(())
            }
            _ => Err(Self::mismatch()),
        }
    }

    pub fn is_visible(&self, handle: &TransactionHandle, loc: ItemPointer) -> Result<Visibility> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.is_visible(ctx, loc),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.is_visible(ctx, loc),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn is_occupied(&self, handle: &TransactionHandle, loc: ItemPointer) -> Result<bool> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.is_occupied(ctx, loc),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.is_occupied(ctx, loc),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn is_owner(&self, handle: &TransactionHandle, loc: ItemPointer) -> Result<bool> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.is_owner(ctx, loc),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.is_owner(ctx, loc),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn is_ownable(&self, loc: ItemPointer) -> Result<bool> {
        match self {
            TransactionManager::Ssi(m) => m.is_ownable(loc),
            TransactionManager::Ssn(m) => m.is_ownable(loc),
        }
    }

    pub fn yield_ownership(&self, handle: &TransactionHandle, loc: ItemPointer) -> Result<()> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => {
                m.yield_ownership(ctx, loc);
                Ok(())
            }
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => {
                m.yield_ownership(ctx, loc);
                Ok(())
            }
            _ => Err(Self::mismatch()),
        }
    }

    pub fn acquire_ownership(&self, handle: &TransactionHandle, loc: ItemPointer) -> Result<bool> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.acquire_ownership(ctx, loc),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.acquire_ownership(ctx, loc),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn perform_read(&self, handle: &TransactionHandle, loc: ItemPointer) -> Result<bool> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.perform_read(ctx, loc),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.perform_read(ctx, loc),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn perform_insert(
        &self,
        handle: &TransactionHandle,
        loc: ItemPointer,
        index_ptr: Arc<IndirectionCell>,
    ) -> Result<()> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.perform_insert(ctx, loc, index_ptr),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.perform_insert(ctx, loc, index_ptr),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn perform_update(
        &self,
        handle: &TransactionHandle,
        old_loc: ItemPointer,
        new_loc: ItemPointer,
    ) -> Result<()> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.perform_update(ctx, old_loc, new_loc),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.perform_update(ctx, old_loc, new_loc),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn perform_update_in_place(&self, handle: &TransactionHandle, loc: ItemPointer) -> Result<()> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.perform_update_in_place(ctx, loc),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.perform_update_in_place(ctx, loc),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn perform_delete(
        &self,
        handle: &TransactionHandle,
        old_loc: ItemPointer,
        new_loc: ItemPointer,
    ) -> Result<()> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.perform_delete(ctx, old_loc, new_loc),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.perform_delete(ctx, old_loc, new_loc),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn perform_delete_in_place(&self, handle: &TransactionHandle, loc: ItemPointer) -> Result<()> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.perform_delete_in_place(ctx, loc),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.perform_delete_in_place(ctx, loc),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn commit_transaction(&self, handle: &TransactionHandle) -> Result<TransactionResult> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.commit_transaction(ctx),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.commit_transaction(ctx),
            _ => Err(Self::mismatch()),
        }
    }

    pub fn abort_transaction(&self, handle: &TransactionHandle) -> Result<TransactionResult> {
        match (self, handle) {
            (TransactionManager::Ssi(m), TransactionHandle::Ssi(ctx)) => m.abort_transaction(ctx),
            (TransactionManager::Ssn(m), TransactionHandle::Ssn(ctx)) => m.abort_transaction(ctx),
            _ => Err(Self::mismatch()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::{NoopEpochManager, TracingGcManager};
    use tessera_core::BlockId;
    use tessera_storage::InMemoryCatalog;

    fn ssi_manager() -> TransactionManager {
        let catalog: Arc<InMemoryCatalog<SsiContext>> = Arc::new(InMemoryCatalog::new());
        catalog.create(BlockId(1), 8);
        TransactionManager::new_ssi(catalog, Arc::new(NoopEpochManager), Arc::new(TracingGcManager))
    }

    fn ssn_manager() -> TransactionManager {
        let catalog: Arc<InMemoryCatalog<SsnContext>> = Arc::new(InMemoryCatalog::new());
        catalog.create(BlockId(1), 8);
        TransactionManager::new_ssn(catalog, Arc::new(NoopEpochManager), Arc::new(TracingGcManager))
    }

    #[test]
    fn ssi_facade_round_trips_insert_and_commit() {
        let mgr = ssi_manager();
        let t = mgr.begin_transaction(1);
        let loc = ItemPointer::new(BlockId(1), 0);
        let cell = Arc::new(IndirectionCell::new(loc));
        mgr.perform_insert(&t, loc, cell).unwrap();
        assert_eq!(mgr.commit_transaction(&t).unwrap(), TransactionResult::Success);
        mgr.end_transaction(&t).unwrap();
    }

    #[test]
    fn ssn_facade_round_trips_insert_and_commit() {
        let mgr = ssn_manager();
        let t = mgr.begin_transaction(1);
        let loc = ItemPointer::new(BlockId(1), 0);
        let cell = Arc::new(IndirectionCell::new(loc));
        mgr.perform_insert(&t, loc, cell).unwrap();
        assert_eq!(mgr.commit_transaction(&t).unwrap(), TransactionResult::Success);
        mgr.end_transaction(&t).unwrap();
    }

    #[test]
    fn mismatched_handle_is_rejected_not_panicking() {
        let ssi = ssi_manager();
        let ssn = ssn_manager();
        let ssn_handle = ssn.begin_transaction(1);
        let err = ssi.commit_transaction(&ssn_handle).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
