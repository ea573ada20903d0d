//! End-to-end concurrency scenarios exercising both certifiers against a
//! shared in-memory tile group, including real multi-threaded contention.
//!
//! These mirror the canonical hazards a serializable multi-version engine
//! must reject or tolerate: write skew, CAS ownership races under real
//! threads, and indirection-cell rollback on abort.

use std::sync::Arc;
use std::thread;

use tessera_concurrency::epoch::{NoopEpochManager, TracingGcManager};
use tessera_concurrency::ssi::SsiManager;
use tessera_concurrency::ssn::SsnManager;
use tessera_core::{BlockId, ItemPointer, TransactionResult};
use tessera_storage::{IndirectionCell, InMemoryCatalog, Visibility};

fn ssi() -> SsiManager {
    let catalog: Arc<InMemoryCatalog<tessera_concurrency::SsiContext>> =
        Arc::new(InMemoryCatalog::new());
    catalog.create(BlockId(1), 16);
    SsiManager::new(catalog, Arc::new(NoopEpochManager), Arc::new(TracingGcManager))
}

fn ssn() -> SsnManager {
    let catalog: Arc<InMemoryCatalog<tessera_concurrency::SsnContext>> =
        Arc::new(InMemoryCatalog::new());
    catalog.create(BlockId(1), 16);
    SsnManager::new(catalog, Arc::new(NoopEpochManager), Arc::new(TracingGcManager))
}

fn insert_committed(mgr: &SsiManager, offset: u32) -> ItemPointer {
    let loc = ItemPointer::new(BlockId(1), offset);
    let setup = mgr.begin_transaction(0);
    mgr.perform_insert(&setup, loc, Arc::new(IndirectionCell::new(loc)))
        .unwrap();
    assert_eq!(
        mgr.commit_transaction(&setup).unwrap(),
        TransactionResult::Success
    );
    mgr.end_transaction(&setup);
    loc
}

/// Scenario 1: the classic write-skew schedule over rows x and y, both
/// already committed. T1 reads x and y then writes y; T2 reads x and y then
/// writes x. Neither transaction's own write set overlaps the other's reads
/// in a way a plain write-write checker would catch, but the rw-antidependency
/// cycle through both rows is dangerous and SSI must reject at least one side.
#[test]
fn write_skew_is_rejected_by_ssi() {
    let mgr = ssi();
    let x = insert_committed(&mgr, 0);
    let y = insert_committed(&mgr, 1);

    let t1 = mgr.begin_transaction(1);
    let t2 = mgr.begin_transaction(2);

    assert!(mgr.perform_read(&t1, x).unwrap());
    assert!(mgr.perform_read(&t2, x).unwrap());
    assert!(mgr.perform_read(&t1, y).unwrap());
    assert!(mgr.perform_read(&t2, y).unwrap());

    assert!(mgr.acquire_ownership(&t1, y).unwrap());
    let y2 = ItemPointer::new(BlockId(1), 2);
    mgr.perform_update(&t1, y, y2).unwrap();

    assert!(mgr.acquire_ownership(&t2, x).unwrap());
    let x2 = ItemPointer::new(BlockId(1), 3);
    mgr.perform_update(&t2, x, x2).unwrap();

    let r1 = mgr.commit_transaction(&t1).unwrap();
    let r2 = mgr.commit_transaction(&t2).unwrap();

    assert!(
        r1 == TransactionResult::Aborted || r2 == TransactionResult::Aborted,
        "write skew must abort at least one of the two transactions"
    );
    mgr.end_transaction(&t1);
    mgr.end_transaction(&t2);
}

/// Scenario 6: an update that swings the indirection cell to a new head,
/// then aborts, must restore the cell to the prior head and leave the new
/// version as an empty, unreachable slot.
#[test]
fn abort_after_update_restores_indirection_to_prior_head() {
    let mgr = ssi();
    let h = insert_committed(&mgr, 4);

    let writer = mgr.begin_transaction(1);
    assert!(mgr.acquire_ownership(&writer, h).unwrap());
    let n = ItemPointer::new(BlockId(1), 5);
    mgr.perform_update(&writer, h, n).unwrap();

    assert_eq!(
        mgr.abort_transaction(&writer).unwrap(),
        TransactionResult::Aborted
    );
    mgr.end_transaction(&writer);

    // A fresh reader resolves the logical tuple through the indirection
    // cell (conceptually) and must still see the original head as visible;
    // the rolled-back new version must look empty to everyone.
    let reader = mgr.begin_transaction(2);
    assert_eq!(mgr.is_visible(&reader, h).unwrap(), Visibility::Ok);
    assert_eq!(mgr.is_visible(&reader, n).unwrap(), Visibility::Invisible);
}

/// Scenario 5 under real threads: two transactions race `AcquireOwnership`
/// on the same committed version from different OS threads. The CAS must
/// hand exactly one of them ownership, with no torn or duplicated state.
#[test]
fn concurrent_acquire_ownership_has_exactly_one_winner_ssi() {
    let mgr = Arc::new(ssi());
    let loc = insert_committed(&mgr, 6);

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|i| {
            let mgr = Arc::clone(&mgr);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let t = mgr.begin_transaction(i);
                barrier.wait();
                let won = mgr.acquire_ownership(&t, loc).unwrap();
                (t, won)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|(_, won)| *won).count();
    assert_eq!(winners, 1, "exactly one concurrent CAS must succeed");

    for (t, _) in &results {
        mgr.end_transaction(t);
    }
}

/// Same race under SSN: pstamp bookkeeping happens before the CAS, but the
/// CAS itself still arbitrates a single winner.
#[test]
fn concurrent_acquire_ownership_has_exactly_one_winner_ssn() {
    let mgr = Arc::new(ssn());
    let loc = {
        let setup = mgr.begin_transaction(0);
        let l = ItemPointer::new(BlockId(1), 0);
        mgr.perform_insert(&setup, l, Arc::new(IndirectionCell::new(l)))
            .unwrap();
        mgr.commit_transaction(&setup).unwrap();
        mgr.end_transaction(&setup);
        l
    };

    let barrier = Arc::new(std::sync::Barrier::new(3));
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let mgr = Arc::clone(&mgr);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let t = mgr.begin_transaction(i);
                barrier.wait();
                let won = mgr.acquire_ownership(&t, loc).unwrap();
                (t, won)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|(_, won)| *won).count();
    assert_eq!(winners, 1, "exactly one concurrent CAS must succeed");

    for (t, _) in &results {
        mgr.end_transaction(t);
    }
}
