//! SSI and SSN transaction managers over the multi-version tuple substrate.
//!
//! This crate implements two serializable isolation protocols as a single
//! tagged-variant `TransactionManager`:
//! - SSI: Serializable Snapshot Isolation via rw-antidependency conflict
//!   flags and dangerous-structure detection at commit.
//! - SSN: Serial Safety Net, a certifier that stamps every transaction with
//!   predecessor/successor watermarks (pi/eta) and aborts when pi >= eta.
//!
//! Both protocols share the same transaction object, read/write set, epoch
//! and GC collaborator interfaces, and live/finished transaction registries;
//! only the dependency-tracking and commit-validation logic differs, in
//! `ssi` and `ssn` respectively.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod access;
pub mod epoch;
pub mod manager;
pub mod registry;
pub mod rwset;
pub mod ssi;
pub mod ssn;
pub mod transaction;

pub use access::AccessType;
pub use epoch::{EpochManager, GcManager, NoopEpochManager, TracingGcManager};
pub use manager::{TransactionHandle, TransactionManager};
pub use registry::TxnRegistry;
pub use rwset::{GcSet, ReadWriteSet};
pub use ssi::{SsiContext, SsiManager};
pub use ssn::{SsnContext, SsnManager};
pub use transaction::Transaction;
