//! The SSI transaction manager: dangerous-structure detection over the
//! rw-antidependency graph, encoded as two conflict bits per transaction
//! context and checked at `AcquireOwnership`, `PerformRead`, and commit.

use std::sync::Arc;

use tessera_core::{
    CommitId, Error, IdAllocator, ItemPointer, Result, TransactionResult, INITIAL_TXN_ID,
    INVALID_TXN_ID, MAX_CID,
};
use tessera_storage::{is_occupied, is_visible, IndirectionCell, TileGroup, TileGroupCatalog, Visibility};

use crate::access::AccessType;
use crate::epoch::{EpochManager, GcManager};
use crate::registry::TxnRegistry;
use crate::ssi::context::SsiContext;
use crate::transaction::Transaction;

/// Owns every piece of shared state an SSI-certified database needs:
/// the tile-group catalog, id allocator, epoch/GC collaborators, and the
/// live/finished transaction registries.
pub struct SsiManager {
    catalog: Arc<dyn TileGroupCatalog<SsiContext> + Send + Sync>,
    ids: IdAllocator,
    epoch: Arc<dyn EpochManager>,
    gc: Arc<dyn GcManager>,
    registry: TxnRegistry<SsiContext>,
}

impl SsiManager {
    pub fn new(
        catalog: Arc<dyn TileGroupCatalog<SsiContext> + Send + Sync>,
        epoch: Arc<dyn EpochManager>,
        gc: Arc<dyn GcManager>,
    ) -> Self {
        Self {
            catalog,
            ids: IdAllocator::new(),
            epoch,
            gc,
            registry: TxnRegistry::new(),
        }
    }

    fn tile_group(&self, block: tessera_core::BlockId) -> Result<Arc<TileGroup<SsiContext>>> {
        self.catalog
            .get(block)
            .ok_or_else(|| Error::not_found(format!("tile group {:?}", block)))
    }

    // -- lifecycle ---------------------------------------------------

    pub fn begin_transaction(&self, thread_id: u64) -> Arc<SsiContext> {
        let (txn_id, begin_cid) = self.ids.allocate_txn();
        let eid = self.epoch.enter_epoch(thread_id);
        let txn = Transaction::new(txn_id, begin_cid, thread_id, false);
        txn.set_epoch_id(eid);
        let ctx = Arc::new(SsiContext::new(txn));
        self.registry.register_live(txn_id, Arc::clone(&ctx));
        tracing::debug!(%txn_id, %begin_cid, "ssi begin transaction");
        ctx
    }

    pub fn begin_readonly_transaction(&self, thread_id: u64) -> Arc<SsiContext> {
        let (txn_id, begin_cid) = self.ids.allocate_txn();
        let eid = self.epoch.enter_epoch_ro(thread_id);
        let txn = Transaction::new(txn_id, begin_cid, thread_id, true);
        txn.set_epoch_id(eid);
        let ctx = Arc::new(SsiContext::new(txn));
        self.registry.register_live(txn_id, Arc::clone(&ctx));
        tracing::debug!(%txn_id, %begin_cid, "ssi begin readonly transaction");
        ctx
    }

    pub fn end_transaction(&self, ctx: &Arc<SsiContext>) {
        self.epoch
            .exit_epoch(ctx.transaction.thread_id(), ctx.transaction.epoch_id());
        let gc = ctx.transaction.gc_set_entries();
        if !gc.is_empty() {
            self.gc.recycle_transaction(ctx.transaction.end_cid(), &gc);
        }
        self.registry.remove_live(ctx.transaction.txn_id());
    }

    pub fn end_readonly_transaction(&self, ctx: &Arc<SsiContext>) {
        self.end_transaction(ctx)
    }

    // -- visibility / ownership ---------------------------------------

    pub fn is_visible(&self, ctx: &SsiContext, loc: ItemPointer) -> Result<Visibility> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        Ok(is_visible(slot, ctx.transaction.txn_id(), ctx.transaction.begin_cid()))
    }

    pub fn is_occupied(&self, ctx: &SsiContext, loc: ItemPointer) -> Result<bool> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        let read_own = matches!(ctx.transaction.access_type(loc), Some(AccessType::ReadOwn));
        Ok(is_occupied(slot, ctx.transaction.txn_id(), read_own))
    }

    pub fn is_owner(&self, ctx: &SsiContext, loc: ItemPointer) -> Result<bool> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        Ok(slot.txn_id() == ctx.transaction.txn_id())
    }

    pub fn is_ownable(&self, loc: ItemPointer) -> Result<bool> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        Ok(slot.txn_id() == INITIAL_TXN_ID && slot.end_cid() == MAX_CID)
    }

    /// No-op: ownership of an unused acquisition is released implicitly at
    /// commit/abort installation.
    pub fn yield_ownership(&self, _ctx: &SsiContext, _loc: ItemPointer) {}

    pub fn acquire_ownership(&self, ctx: &Arc<SsiContext>, loc: ItemPointer) -> Result<bool> {
        if ctx.is_aborted_like() {
            return Ok(false);
        }
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        if !slot.cas_txn_id(INITIAL_TXN_ID, ctx.transaction.txn_id()) {
            return Ok(false);
        }
        if !self.acquire_dependency(ctx, slot) {
            slot.set_txn_id(INITIAL_TXN_ID);
            return Ok(false);
        }
        Ok(true)
    }

    fn acquire_dependency(&self, ctx: &SsiContext, slot: &tessera_storage::VersionSlot<SsiContext>) -> bool {
        for r in slot.reserved.live_readers() {
            if std::ptr::eq(r.as_ref(), ctx) || r.is_aborted_like() {
                continue;
            }
            let _guard = r.lock();
            if r.transaction.end_cid() == MAX_CID {
                ctx.set_in_conflict();
                r.set_out_conflict();
            } else if r.transaction.end_cid() > ctx.transaction.begin_cid()
                && r.in_conflict()
                && !r.is_abort()
            {
                return false;
            }
        }
        true
    }

    // -- reads / writes -------------------------------------------------

    pub fn perform_read(&self, ctx: &Arc<SsiContext>, loc: ItemPointer) -> Result<bool> {
        if ctx.is_aborted_like() {
            return Ok(false);
        }
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;

        if ctx.transaction.access_type(loc).is_none() {
            slot.reserved.add_reader(ctx);
            let owner = slot.txn_id();
            if owner != ctx.transaction.txn_id() && owner != INVALID_TXN_ID && owner != INITIAL_TXN_ID {
                if let Some(w) = self.registry.live(owner) {
                    if !w.is_abort() {
                        w.set_in_conflict();
                        ctx.set_out_conflict();
                    }
                }
            }
        }
        ctx.transaction.record_read(loc);

        let mut cur = slot.next();
        while let Some(next_loc) = cur {
            let next_group = self.tile_group(next_loc.block)?;
            let next_slot = next_group
                .slot_at(next_loc)
                .ok_or_else(|| Error::not_found(format!("slot {:?}", next_loc)))?;
            let creator = next_slot.reserved.creator_txn_id();
            if creator == ctx.transaction.txn_id() {
                cur = next_slot.next();
                continue;
            }
            if let Some(c_ctx) = self.registry.live(creator) {
                if c_ctx.transaction.end_cid() < ctx.transaction.begin_cid() {
                    cur = next_slot.next();
                    continue;
                }
                let _g = c_ctx.lock();
                if c_ctx.transaction.end_cid() != MAX_CID && c_ctx.out_conflict() && !c_ctx.is_abort() {
                    return Ok(false);
                }
                c_ctx.set_in_conflict();
                ctx.set_out_conflict();
            }
            cur = next_slot.next();
        }
        Ok(true)
    }

    pub fn perform_insert(
        &self,
        ctx: &Arc<SsiContext>,
        loc: ItemPointer,
        index_ptr: Arc<IndirectionCell>,
    ) -> Result<()> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        slot.reserved.set_creator_raw(ctx.transaction.txn_id().0);
        slot.set_indirection(Some(index_ptr));
        slot.set_txn_id(ctx.transaction.txn_id());
        ctx.transaction.record_insert(loc);
        Ok(())
    }

    pub fn perform_update(&self, ctx: &Arc<SsiContext>, old_loc: ItemPointer, new_loc: ItemPointer) -> Result<()> {
        let old_group = self.tile_group(old_loc.block)?;
        let old = old_group
            .slot_at(old_loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", old_loc)))?;
        let new_group = self.tile_group(new_loc.block)?;
        let new = new_group
            .slot_at(new_loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", new_loc)))?;

        new.set_prev(Some(old_loc));
        new.reserved.set_creator_raw(ctx.transaction.txn_id().0);
        new.set_begin_cid(MAX_CID);
        new.set_end_cid(MAX_CID);
        new.set_txn_id(ctx.transaction.txn_id());

        let indirection = old.indirection();
        old.set_next(Some(new_loc));
        if let Some(ind) = indirection {
            ind.compare_and_swap(old_loc, new_loc);
            new.set_indirection(Some(ind));
            old.set_indirection(None);
        }

        ctx.transaction.record_update(old_loc);
        Ok(())
    }

    /// Single-location variant: `loc` is a version this transaction already
    /// owns (e.g. re-updating its own fresh insert in place).
    pub fn perform_update_in_place(&self, ctx: &Arc<SsiContext>, loc: ItemPointer) -> Result<()> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        if let Some(prev) = slot.prev() {
            ctx.transaction.record_update(prev);
        }
        Ok(())
    }

    pub fn perform_delete(&self, ctx: &Arc<SsiContext>, old_loc: ItemPointer, new_loc: ItemPointer) -> Result<()> {
        let old_group = self.tile_group(old_loc.block)?;
        let old = old_group
            .slot_at(old_loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", old_loc)))?;
        let new_group = self.tile_group(new_loc.block)?;
        let new = new_group
            .slot_at(new_loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", new_loc)))?;

        new.set_prev(Some(old_loc));
        new.reserved.set_creator_raw(ctx.transaction.txn_id().0);
        new.set_begin_cid(MAX_CID);
        new.mark_pending_delete();
        new.set_txn_id(ctx.transaction.txn_id());

        let indirection = old.indirection();
        old.set_next(Some(new_loc));
        if let Some(ind) = indirection {
            ind.compare_and_swap(old_loc, new_loc);
            new.set_indirection(Some(ind));
            old.set_indirection(None);
        }

        ctx.transaction.record_delete(old_loc);
        Ok(())
    }

    pub fn perform_delete_in_place(&self, ctx: &Arc<SsiContext>, loc: ItemPointer) -> Result<()> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        let target = slot.prev().unwrap_or(loc);
        ctx.transaction.record_delete(target);
        Ok(())
    }

    // -- commit / abort -------------------------------------------------

    pub fn commit_transaction(&self, ctx: &Arc<SsiContext>) -> Result<TransactionResult> {
        if ctx.transaction.result() == TransactionResult::Failure {
            return self.finish_abort(ctx);
        }
        let dangerous = {
            let _g = ctx.lock();
            ctx.in_conflict() && ctx.out_conflict()
        };
        if dangerous {
            tracing::warn!(txn_id = %ctx.transaction.txn_id(), "ssi certifier abort");
            return self.finish_abort(ctx);
        }

        let end_cid = self.ids.allocate_cid();
        ctx.transaction.set_end_cid(end_cid);
        self.install(ctx, end_cid)?;
        ctx.set_finish();
        ctx.transaction.set_result(TransactionResult::Success);
        self.registry.publish_finished(end_cid, Arc::clone(ctx));
        tracing::debug!(txn_id = %ctx.transaction.txn_id(), %end_cid, "ssi commit");
        Ok(TransactionResult::Success)
    }

    pub fn abort_transaction(&self, ctx: &Arc<SsiContext>) -> Result<TransactionResult> {
        self.finish_abort(ctx)
    }

    fn install(&self, ctx: &Arc<SsiContext>, end_cid: CommitId) -> Result<()> {
        for (loc, access) in ctx.transaction.rw_set_entries() {
            match access {
                AccessType::Update => {
                    let old_group = self.tile_group(loc.block)?;
                    let old = old_group
                        .slot_at(loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
                    let new_loc = old
                        .next()
                        .ok_or_else(|| Error::invalid_state("update missing successor version"))?;
                    let new_group = self.tile_group(new_loc.block)?;
                    let new = new_group
                        .slot_at(new_loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", new_loc)))?;
                    old.set_end_cid(end_cid);
                    new.set_begin_cid(end_cid);
                    new.set_end_cid(MAX_CID);
                    new.set_txn_id(INITIAL_TXN_ID);
                    old.set_txn_id(INITIAL_TXN_ID);
                    ctx.transaction.record_gc(loc, false);
                }
                AccessType::Delete => {
                    let old_group = self.tile_group(loc.block)?;
                    let old = old_group
                        .slot_at(loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
                    let new_loc = old
                        .next()
                        .ok_or_else(|| Error::invalid_state("delete missing successor version"))?;
                    let new_group = self.tile_group(new_loc.block)?;
                    let new = new_group
                        .slot_at(new_loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", new_loc)))?;
                    old.set_end_cid(end_cid);
                    new.set_begin_cid(end_cid);
                    new.set_end_cid(MAX_CID);
                    new.set_txn_id(INVALID_TXN_ID);
                    old.set_txn_id(INITIAL_TXN_ID);
                    ctx.transaction.record_gc(loc, true);
                    ctx.transaction.record_gc(new_loc, false);
                }
                AccessType::Insert => {
                    let group = self.tile_group(loc.block)?;
                    let v = group
                        .slot_at(loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
                    v.set_begin_cid(end_cid);
                    v.set_end_cid(MAX_CID);
                    v.set_txn_id(INITIAL_TXN_ID);
                }
                AccessType::InsDel => {
                    let group = self.tile_group(loc.block)?;
                    let v = group
                        .slot_at(loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
                    v.set_begin_cid(MAX_CID);
                    v.set_end_cid(MAX_CID);
                    v.set_txn_id(INVALID_TXN_ID);
                    ctx.transaction.record_gc(loc, true);
                }
                AccessType::Read | AccessType::ReadOwn => {}
            }
        }
        Ok(())
    }

    fn finish_abort(&self, ctx: &Arc<SsiContext>) -> Result<TransactionResult> {
        if ctx.is_finish() {
            return Ok(ctx.transaction.result());
        }
        for (loc, access) in ctx.transaction.rw_set_entries() {
            match access {
                AccessType::Update | AccessType::Delete => {
                    let group = self.tile_group(loc.block)?;
                    let old = group
                        .slot_at(loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
                    old.set_end_cid(MAX_CID);
                    old.set_txn_id(INITIAL_TXN_ID);
                    if let Some(new_loc) = old.next() {
                        let new_group = self.tile_group(new_loc.block)?;
                        let new = new_group
                            .slot_at(new_loc)
                            .ok_or_else(|| Error::not_found(format!("slot {:?}", new_loc)))?;
                        if let Some(ind) = new.indirection() {
                            ind.compare_and_swap(new_loc, loc);
                            old.set_indirection(Some(ind));
                            new.set_indirection(None);
                        }
                        new.set_begin_cid(MAX_CID);
                        new.set_end_cid(MAX_CID);
                        new.set_prev(None);
                        new.set_txn_id(INVALID_TXN_ID);
                        ctx.transaction.record_gc(new_loc, false);
                    }
                    old.set_next(None);
                    ctx.transaction.record_gc(loc, false);
                }
                AccessType::Insert | AccessType::InsDel => {
                    let group = self.tile_group(loc.block)?;
                    let v = group
                        .slot_at(loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
                    v.set_begin_cid(MAX_CID);
                    v.set_end_cid(MAX_CID);
                    v.set_txn_id(INVALID_TXN_ID);
                    ctx.transaction.record_gc(loc, false);
                }
                AccessType::Read | AccessType::ReadOwn => {}
            }
        }

        ctx.set_abort();
        ctx.transaction.set_result(TransactionResult::Aborted);
        let end_cid = self.ids.allocate_cid();
        ctx.transaction.set_end_cid(end_cid);
        ctx.set_finish();
        self.registry.publish_finished(end_cid, Arc::clone(ctx));
        tracing::debug!(txn_id = %ctx.transaction.txn_id(), "ssi abort");
        Ok(TransactionResult::Aborted)
    }

}
