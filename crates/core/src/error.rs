//! Error taxonomy for the concurrency core.
//!
//! A single `thiserror`-derived enum covers every way a transaction-manager
//! operation can fail, mirroring the error layering used elsewhere in this
//! workspace: one flat enum with classification helpers, rather than a tree
//! of nested error types.

use thiserror::Error;

use crate::ids::{CommitId, ItemPointer, TxnId};

/// Every failure mode a [`crate`] consumer needs to distinguish.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The SSI certifier found a dangerous structure, or the SSN certifier
    /// found `pstamp >= sstamp`, at commit time.
    #[error("transaction {txn_id} failed certification at commit")]
    CertifierAbort { txn_id: TxnId },

    /// A compare-and-swap on a version's owning transaction id lost a race
    /// to a concurrent writer.
    #[error("ownership race on {location:?}: expected owner not present")]
    OwnershipRace { location: ItemPointer },

    /// `PerformRead` observed a committed writer it cannot safely read past.
    #[error("read conflict on {location:?} for transaction {txn_id}")]
    ReadConflict {
        txn_id: TxnId,
        location: ItemPointer,
    },

    /// The caller (executor) requested an abort for a reason of its own,
    /// e.g. a constraint violation discovered above this layer.
    #[error("transaction {txn_id} aborted by caller: {reason}")]
    UserAbort { txn_id: TxnId, reason: String },

    /// An operation was attempted against a transaction or context that is
    /// not in a state that allows it (e.g. `PerformRead` after commit).
    #[error("invalid transaction state: {0}")]
    InvalidState(String),

    /// Lookup of a tile group, version, or transaction context failed.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn user_abort(txn_id: TxnId, reason: impl Into<String>) -> Self {
        Error::UserAbort {
            txn_id,
            reason: reason.into(),
        }
    }

    pub fn certifier_abort(txn_id: TxnId) -> Self {
        Error::CertifierAbort { txn_id }
    }

    pub fn ownership_race(location: ItemPointer) -> Self {
        Error::OwnershipRace { location }
    }

    pub fn read_conflict(txn_id: TxnId, location: ItemPointer) -> Self {
        Error::ReadConflict { txn_id, location }
    }

    /// True for any error that means "this transaction must abort," as
    /// opposed to a programming error (`InvalidState`) or a lookup failure.
    pub fn is_abort_required(&self) -> bool {
        matches!(
            self,
            Error::CertifierAbort { .. }
                | Error::OwnershipRace { .. }
                | Error::ReadConflict { .. }
                | Error::UserAbort { .. }
        )
    }

    /// True for errors rooted in a concurrent conflict, as opposed to a
    /// caller-driven abort or a state/lookup bug.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::CertifierAbort { .. } | Error::OwnershipRace { .. } | Error::ReadConflict { .. }
        )
    }

    /// Conflicts in this layer are always resolved by retrying the whole
    /// transaction from scratch; there is no partial-retry path.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }
}

/// Outcome of `CommitTransaction` / `AbortTransaction`, returned alongside
/// (not instead of) the `Result` plumbing so callers can match on intent
/// without inspecting error internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionResult {
    Success,
    Aborted,
    /// Reserved for a caller-set abort reason; the core itself never
    /// produces this variant.
    Failure,
}

/// Commit id reached at the moment of abort/commit, threaded through for
/// bookkeeping by the end-commit-id registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finalized {
    pub result: TransactionResult,
    pub commit_id: CommitId,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::BlockId;

    fn loc() -> ItemPointer {
        ItemPointer::new(BlockId(1), 2)
    }

    #[test]
    fn certifier_abort_is_conflict_and_retryable() {
        let e = Error::certifier_abort(TxnId(5));
        assert!(e.is_conflict());
        assert!(e.is_retryable());
        assert!(e.is_abort_required());
    }

    #[test]
    fn invalid_state_is_not_a_conflict() {
        let e = Error::invalid_state("already committed");
        assert!(!e.is_conflict());
        assert!(!e.is_abort_required());
        assert!(!e.is_retryable());
    }

    #[test]
    fn user_abort_requires_abort_but_is_not_a_conflict() {
        let e = Error::user_abort(TxnId(1), "constraint violated");
        assert!(e.is_abort_required());
        assert!(!e.is_conflict());
    }

    #[test]
    fn ownership_race_and_read_conflict_carry_location() {
        let e1 = Error::ownership_race(loc());
        let e2 = Error::read_conflict(TxnId(9), loc());
        assert!(e1.is_conflict());
        assert!(e2.is_conflict());
    }

    #[test]
    fn messages_are_human_readable() {
        let e = Error::not_found("transaction 42");
        assert_eq!(e.to_string(), "not found: transaction 42");
    }
}
