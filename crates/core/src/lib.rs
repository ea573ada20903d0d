//! Identifiers, sentinels and the error taxonomy shared by every crate in
//! the Tessera concurrency-control workspace.
//!
//! This crate has no notion of storage, versions, or transactions on its
//! own; it exists so that `tessera-storage` and `tessera-concurrency` agree
//! on what a transaction id, a commit id, and a failure look like.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ids;

pub use error::{Error, Finalized, Result, TransactionResult};
pub use ids::{
    BlockId, CommitId, IdAllocator, ItemPointer, TxnId, FIRST_CID, FIRST_TXN_ID, INITIAL_TXN_ID,
    INVALID_CID, INVALID_TXN_ID, MAX_CID,
};
