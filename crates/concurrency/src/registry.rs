//! The two global registries every certifier needs: live transactions by
//! id, and recently-finished transactions by end commit id (consulted by a
//! concurrent committer's dependency checks after this one has finished).

use std::sync::Arc;

use dashmap::DashMap;

use tessera_core::{CommitId, TxnId};

/// Concurrent-safe home for transaction contexts, keyed two ways.
pub struct TxnRegistry<C> {
    live: DashMap<TxnId, Arc<C>>,
    finished: DashMap<CommitId, Arc<C>>,
}

impl<C> Default for TxnRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> TxnRegistry<C> {
    pub fn new() -> Self {
        Self {
            live: DashMap::new(),
            finished: DashMap::new(),
        }
    }

    pub fn register_live(&self, txn_id: TxnId, ctx: Arc<C>) {
        self.live.insert(txn_id, ctx);
    }

    pub fn live(&self, txn_id: TxnId) -> Option<Arc<C>> {
        self.live.get(&txn_id).map(|e| Arc::clone(e.value()))
    }

    pub fn remove_live(&self, txn_id: TxnId) -> Option<Arc<C>> {
        self.live.remove(&txn_id).map(|(_, ctx)| ctx)
    }

    pub fn publish_finished(&self, end_cid: CommitId, ctx: Arc<C>) {
        self.finished.insert(end_cid, ctx);
    }

    pub fn finished(&self, end_cid: CommitId) -> Option<Arc<C>> {
        self.finished.get(&end_cid).map(|e| Arc::clone(e.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Dummy;

    #[test]
    fn live_registry_round_trips() {
        let reg: TxnRegistry<Dummy> = TxnRegistry::new();
        reg.register_live(TxnId(5), Arc::new(Dummy));
        assert!(reg.live(TxnId(5)).is_some());
        assert!(reg.remove_live(TxnId(5)).is_some());
        assert!(reg.live(TxnId(5)).is_none());
    }

    #[test]
    fn finished_registry_round_trips() {
        let reg: TxnRegistry<Dummy> = TxnRegistry::new();
        reg.publish_finished(CommitId(9), Arc::new(Dummy));
        assert!(reg.finished(CommitId(9)).is_some());
        assert!(reg.finished(CommitId(42)).is_none());
    }
}
