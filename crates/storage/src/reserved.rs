//! The reserved area: per-version metadata consumed by whichever certifier
//! (SSI or SSN) is active. One physical layout serves both protocols (see
//! the design notes on reserved-area aliasing); SSI simply never touches
//! `vpstamp`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use parking_lot::Mutex;

use tessera_core::{CommitId, TxnId};

/// Reader-list and version-pstamp, guarded together by one lock since both
/// are mutated only while holding the version's `vlock` in the source
/// system.
struct Guarded<C> {
    vpstamp: u64,
    readers: Vec<Weak<C>>,
}

/// Per-version metadata: who created this version, and who has read it.
///
/// `C` is the certifier's transaction-context type (`Arc<TxnContext>` lives
/// in `tessera-concurrency`); this crate never needs to know its shape, only
/// that it can be weakly referenced.
pub struct ReservedArea<C> {
    creator: AtomicU64,
    guarded: Mutex<Guarded<C>>,
}

impl<C> ReservedArea<C> {
    /// A fresh reserved area for a version created by `creator` at `t_cstamp`
    /// (the transaction's own id for SSI, its cstamp for SSN).
    pub fn new(t_cstamp: u64) -> Self {
        Self {
            creator: AtomicU64::new(t_cstamp),
            guarded: Mutex::new(Guarded {
                vpstamp: t_cstamp,
                readers: Vec::new(),
            }),
        }
    }

    pub fn creator_raw(&self) -> u64 {
        self.creator.load(Ordering::Acquire)
    }

    pub fn set_creator_raw(&self, value: u64) {
        self.creator.store(value, Ordering::Release);
    }

    pub fn creator_txn_id(&self) -> TxnId {
        TxnId(self.creator_raw())
    }

    pub fn creator_cstamp(&self) -> CommitId {
        CommitId(self.creator_raw())
    }

    /// Version pstamp (SSN only): highest cstamp of a committed reader.
    pub fn vpstamp(&self) -> CommitId {
        CommitId(self.guarded.lock().vpstamp)
    }

    pub fn bump_vpstamp(&self, candidate: CommitId) {
        let mut g = self.guarded.lock();
        if candidate.0 > g.vpstamp {
            g.vpstamp = candidate.0;
        }
    }

    /// Add `reader` to this version's SIREAD list unless it is already
    /// present. Pruning of dead `Weak`s happens opportunistically here so
    /// the list cannot grow unboundedly across long-running workloads.
    pub fn add_reader(&self, reader: &std::sync::Arc<C>)
    where
        C: PartialEq,
    {
        let mut g = self.guarded.lock();
        let already = g
            .readers
            .iter()
            .filter_map(|w| w.upgrade())
            .any(|r| std::sync::Arc::ptr_eq(&r, reader));
        if already {
            return;
        }
        g.readers.retain(|w| Weak::strong_count(w) > 0);
        g.readers.push(std::sync::Arc::downgrade(reader));
    }

    /// Snapshot of currently-live readers. Dead entries are dropped as a
    /// side effect.
    pub fn live_readers(&self) -> Vec<std::sync::Arc<C>> {
        let mut g = self.guarded.lock();
        let live: Vec<std::sync::Arc<C>> = g.readers.iter().filter_map(|w| w.upgrade()).collect();
        g.readers.retain(|w| Weak::strong_count(w) > 0);
        live
    }
}
