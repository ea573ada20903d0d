//! The SSN transaction manager: predecessor/successor watermark tracking
//! (pi/eta) with a certifier abort whenever `pstamp >= sstamp`.

use std::sync::Arc;

use tessera_core::{
    CommitId, Error, IdAllocator, ItemPointer, Result, TransactionResult, INITIAL_TXN_ID,
    INVALID_TXN_ID, MAX_CID,
};
use tessera_storage::{is_occupied, is_visible, IndirectionCell, TileGroup, TileGroupCatalog, Visibility};

use crate::access::AccessType;
use crate::epoch::{EpochManager, GcManager};
use crate::registry::TxnRegistry;
use crate::ssn::context::SsnContext;
use crate::transaction::Transaction;

/// Caps the busy-wait in pre-commit so a stuck peer cannot hang this
/// transaction forever; the peer's own commit phase is bounded, so in
/// practice this limit is never reached.
const PEER_WAIT_SPIN_LIMIT: u32 = 1_000;

fn is_write_access(access: AccessType) -> bool {
    matches!(
        access,
        AccessType::Update | AccessType::Delete | AccessType::Insert | AccessType::InsDel
    )
}

/// Owns every piece of shared state an SSN-certified database needs:
/// the tile-group catalog, id allocator, epoch/GC collaborators, and the
/// live/finished transaction registries.
pub struct SsnManager {
    catalog: Arc<dyn TileGroupCatalog<SsnContext> + Send + Sync>,
    ids: IdAllocator,
    epoch: Arc<dyn EpochManager>,
    gc: Arc<dyn GcManager>,
    registry: TxnRegistry<SsnContext>,
}

impl SsnManager {
    pub fn new(
        catalog: Arc<dyn TileGroupCatalog<SsnContext> + Send + Sync>,
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

    fn tile_group(&self, block: tessera_core::BlockId) -> Result<Arc<TileGroup<SsnContext>>> {
        self.catalog
            .get(block)
            .ok_or_else(|| Error::not_found(format!("tile group {:?}", block)))
    }

    // -- lifecycle ---------------------------------------------------

    pub fn begin_transaction(&self, thread_id: u64) -> Arc<SsnContext> {
        let (txn_id, begin_cid) = self.ids.allocate_txn();
        let eid = self.epoch.enter_epoch(thread_id);
        let txn = Transaction::new(txn_id, begin_cid, thread_id, false);
        txn.set_epoch_id(eid);
        let ctx = Arc::new(SsnContext::new(txn));
        self.registry.register_live(txn_id, Arc::clone(&ctx));
        tracing::debug!(%txn_id, %begin_cid, "ssn begin transaction");
        ctx
    }

    pub fn begin_readonly_transaction(&self, thread_id: u64) -> Arc<SsnContext> {
        let (txn_id, begin_cid) = self.ids.allocate_txn();
        let eid = self.epoch.enter_epoch_ro(thread_id);
        let txn = Transaction::new(txn_id, begin_cid, thread_id, true);
        txn.set_epoch_id(eid);
        let ctx = Arc::new(SsnContext::new(txn));
        self.registry.register_live(txn_id, Arc::clone(&ctx));
        tracing::debug!(%txn_id, %begin_cid, "ssn begin readonly transaction");
        ctx
    }

    pub fn end_transaction(&self, ctx: &Arc<SsnContext>) {
        self.epoch
            .exit_epoch(ctx.transaction.thread_id(), ctx.transaction.epoch_id());
        let gc = ctx.transaction.gc_set_entries();
        if !gc.is_empty() {
            self.gc.recycle_transaction(ctx.transaction.end_cid(), &gc);
        }
        self.registry.remove_live(ctx.transaction.txn_id());
    }

    pub fn end_readonly_transaction(&self, ctx: &Arc<SsnContext>) {
        self.end_transaction(ctx)
    }

    // -- visibility / ownership ---------------------------------------

    pub fn is_visible(&self, ctx: &SsnContext, loc: ItemPointer) -> Result<Visibility> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        Ok(is_visible(slot, ctx.transaction.txn_id(), ctx.transaction.begin_cid()))
    }

    pub fn is_occupied(&self, ctx: &SsnContext, loc: ItemPointer) -> Result<bool> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        let read_own = matches!(ctx.transaction.access_type(loc), Some(AccessType::ReadOwn));
        Ok(is_occupied(slot, ctx.transaction.txn_id(), read_own))
    }

    pub fn is_owner(&self, ctx: &SsnContext, loc: ItemPointer) -> Result<bool> {
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
    pub fn yield_ownership(&self, _ctx: &SsnContext, _loc: ItemPointer) {}

    pub fn acquire_ownership(&self, ctx: &Arc<SsnContext>, loc: ItemPointer) -> Result<bool> {
        if ctx.is_aborted_like() {
            return Ok(false);
        }
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;

        // Bump pi from the old version's vpstamp before attempting the CAS;
        // if that alone would put us past eta, abandon without touching
        // txn_id at all.
        ctx.bump_pstamp(slot.reserved.vpstamp());
        if ctx.would_abort() {
            return Ok(false);
        }
        if !slot.cas_txn_id(INITIAL_TXN_ID, ctx.transaction.txn_id()) {
            return Ok(false);
        }
        Ok(true)
    }

    // -- reads / writes -------------------------------------------------

    pub fn perform_read(&self, ctx: &Arc<SsnContext>, loc: ItemPointer) -> Result<bool> {
        if ctx.is_aborted_like() {
            return Ok(false);
        }
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;

        let first_touch = ctx.transaction.access_type(loc).is_none();
        if first_touch {
            slot.reserved.add_reader(ctx);
        }

        let already_written = ctx
            .transaction
            .access_type(loc)
            .map(is_write_access)
            .unwrap_or(false);
        ctx.transaction.record_read(loc);
        if already_written {
            return Ok(true);
        }

        let v_cstamp = slot.reserved.creator_cstamp();
        ctx.bump_pstamp(v_cstamp);

        let v_sstamp = slot.end_cid();
        if v_sstamp != MAX_CID {
            ctx.lower_sstamp(v_sstamp);
        }

        Ok(!ctx.would_abort())
    }

    pub fn perform_insert(
        &self,
        ctx: &Arc<SsnContext>,
        loc: ItemPointer,
        index_ptr: Arc<IndirectionCell>,
    ) -> Result<()> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        // The reserved-area creator stamp is a cstamp under SSN, which does
        // not exist until this transaction reaches pre-commit; `install`
        // fills it in once `cstamp(T)` is known (per the post-commit phase
        // of the dependency protocol).
        slot.set_indirection(Some(index_ptr));
        slot.set_txn_id(ctx.transaction.txn_id());
        ctx.transaction.record_insert(loc);
        Ok(())
    }

    pub fn perform_update(&self, ctx: &Arc<SsnContext>, old_loc: ItemPointer, new_loc: ItemPointer) -> Result<()> {
        let old_group = self.tile_group(old_loc.block)?;
        let old = old_group
            .slot_at(old_loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", old_loc)))?;
        let new_group = self.tile_group(new_loc.block)?;
        let new = new_group
            .slot_at(new_loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", new_loc)))?;

        ctx.bump_pstamp(old.reserved.vpstamp());

        new.set_prev(Some(old_loc));
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
    pub fn perform_update_in_place(&self, ctx: &Arc<SsnContext>, loc: ItemPointer) -> Result<()> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        if let Some(prev) = slot.prev() {
            ctx.transaction.record_update(prev);
        }
        Ok(())
    }

    pub fn perform_delete(&self, ctx: &Arc<SsnContext>, old_loc: ItemPointer, new_loc: ItemPointer) -> Result<()> {
        let old_group = self.tile_group(old_loc.block)?;
        let old = old_group
            .slot_at(old_loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", old_loc)))?;
        let new_group = self.tile_group(new_loc.block)?;
        let new = new_group
            .slot_at(new_loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", new_loc)))?;

        ctx.bump_pstamp(old.reserved.vpstamp());

        new.set_prev(Some(old_loc));
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

    pub fn perform_delete_in_place(&self, ctx: &Arc<SsnContext>, loc: ItemPointer) -> Result<()> {
        let group = self.tile_group(loc.block)?;
        let slot = group
            .slot_at(loc)
            .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
        let target = slot.prev().unwrap_or(loc);
        ctx.transaction.record_delete(target);
        Ok(())
    }

    // -- commit / abort -------------------------------------------------

    pub fn commit_transaction(&self, ctx: &Arc<SsnContext>) -> Result<TransactionResult> {
        if ctx.transaction.result() == TransactionResult::Failure {
            return self.finish_abort(ctx);
        }
        if !self.pre_commit(ctx)? {
            tracing::warn!(txn_id = %ctx.transaction.txn_id(), "ssn certifier abort");
            return self.finish_abort(ctx);
        }

        let end_cid = ctx.cstamp();
        ctx.transaction.set_end_cid(end_cid);
        self.install(ctx, end_cid)?;
        ctx.set_finish();
        ctx.transaction.set_result(TransactionResult::Success);
        tracing::debug!(txn_id = %ctx.transaction.txn_id(), %end_cid, "ssn commit");
        Ok(TransactionResult::Success)
    }

    pub fn abort_transaction(&self, ctx: &Arc<SsnContext>) -> Result<TransactionResult> {
        self.finish_abort(ctx)
    }

    /// Steps 1-6 of the pre-commit phase: draw cstamp, fold in peer
    /// watermarks, decide pass/fail. Publishes to the finished registry
    /// under the drawn cstamp immediately so concurrent committers waiting
    /// on this transaction (step 3's READ case) can find it by cstamp —
    /// the registry's "finished" table is repurposed here as the lookup a
    /// peer busy-waits against, not only as a post-commit inspection table.
    fn pre_commit(&self, ctx: &Arc<SsnContext>) -> Result<bool> {
        {
            let _g = ctx.lock();
            ctx.set_committing();
            let cstamp = CommitId(self.ids.allocate_txn_id().0);
            ctx.set_cstamp(cstamp);
            ctx.lower_sstamp(cstamp);
            self.registry.publish_finished(cstamp, Arc::clone(ctx));
        }

        let mut max_pi = ctx.pstamp();

        for (loc, access) in ctx.transaction.rw_set_entries() {
            match access {
                AccessType::Read | AccessType::ReadOwn => {
                    let group = self.tile_group(loc.block)?;
                    let slot = group
                        .slot_at(loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
                    // `slot.end_cid()` is only the eta this T read stamped onto
                    // the version it overwrote, not the writer's identity; the
                    // successor version's reserved creator holds the
                    // overwriting writer's cstamp.
                    if slot.end_cid() != MAX_CID {
                        if let Some(new_loc) = slot.next() {
                            let new_group = self.tile_group(new_loc.block)?;
                            let new = new_group
                                .slot_at(new_loc)
                                .ok_or_else(|| Error::not_found(format!("slot {:?}", new_loc)))?;
                            let writer_cstamp = new.reserved.creator_cstamp();
                            if writer_cstamp < ctx.cstamp() {
                                if let Some(w) = self.wait_for_peer_commit(writer_cstamp) {
                                    ctx.lower_sstamp(w.sstamp());
                                }
                            }
                        }
                    }
                }
                AccessType::Update | AccessType::Delete => {
                    let group = self.tile_group(loc.block)?;
                    let old = group
                        .slot_at(loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
                    if old.reserved.vpstamp() > max_pi {
                        max_pi = old.reserved.vpstamp();
                    }
                    for r in old.reserved.live_readers() {
                        if std::ptr::eq(r.as_ref(), ctx.as_ref()) || r.is_abort() {
                            continue;
                        }
                        if r.cstamp() < ctx.cstamp() && r.is_finish() && r.cstamp() > max_pi {
                            max_pi = r.cstamp();
                        }
                    }
                }
                AccessType::Insert | AccessType::InsDel => {}
            }
        }

        ctx.bump_pstamp(max_pi);
        if ctx.would_abort() {
            return Ok(false);
        }
        ctx.set_finish();
        Ok(true)
    }

    /// Busy-wait for the peer committing transaction found at `w_cstamp` to
    /// finish, bounded by `PEER_WAIT_SPIN_LIMIT` spins. The peer's own
    /// commit phase is itself bounded, so this always terminates in
    /// practice; the cap exists purely as a defensive backstop.
    fn wait_for_peer_commit(&self, w_cstamp: CommitId) -> Option<Arc<SsnContext>> {
        let w = self.registry.finished(w_cstamp)?;
        let mut spins = 0u32;
        while !w.is_finish() && !w.is_abort() {
            if spins < PEER_WAIT_SPIN_LIMIT {
                std::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
        Some(w)
    }

    fn install(&self, ctx: &Arc<SsnContext>, end_commit_id: CommitId) -> Result<()> {
        let eta = ctx.sstamp();
        let cstamp = ctx.cstamp();
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
                    old.set_end_cid(eta);
                    new.reserved.set_creator_raw(cstamp.0);
                    new.set_begin_cid(end_commit_id);
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
                    old.set_end_cid(eta);
                    new.reserved.set_creator_raw(cstamp.0);
                    new.set_begin_cid(end_commit_id);
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
                    v.reserved.set_creator_raw(cstamp.0);
                    v.set_begin_cid(end_commit_id);
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
                AccessType::Read | AccessType::ReadOwn => {
                    let group = self.tile_group(loc.block)?;
                    let v = group
                        .slot_at(loc)
                        .ok_or_else(|| Error::not_found(format!("slot {:?}", loc)))?;
                    v.reserved.bump_vpstamp(cstamp);
                }
            }
        }
        Ok(())
    }

    fn finish_abort(&self, ctx: &Arc<SsnContext>) -> Result<TransactionResult> {
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
        let end_cid = if ctx.is_committing() {
            ctx.cstamp()
        } else {
            self.ids.allocate_cid()
        };
        ctx.transaction.set_end_cid(end_cid);
        ctx.set_finish();
        if !ctx.is_committing() {
            self.registry.publish_finished(end_cid, Arc::clone(ctx));
        }
        tracing::debug!(txn_id = %ctx.transaction.txn_id(), "ssn abort");
        Ok(TransactionResult::Aborted)
    }
}
