//! Serializable Snapshot Isolation: dangerous-structure detection over the
//! rw-antidependency graph, encoded as two conflict bits per context.

pub mod context;
pub mod manager;

pub use context::SsiContext;
pub use manager::SsiManager;
