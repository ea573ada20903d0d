//! The multi-version tuple substrate: version slots, their reserved
//! metadata, the tile groups that hold them, and the indirection table that
//! names logical tuples.
//!
//! Nothing in this crate knows about transactions, SSI, or SSN; it only
//! knows how to store and address versions and how to decide, given a
//! viewer's identity and snapshot, whether one is visible. The certifier
//! protocols live one layer up in `tessera-concurrency`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod indirection;
pub mod reserved;
pub mod slot;
pub mod tile_group;
pub mod visibility;

pub use indirection::IndirectionCell;
pub use reserved::ReservedArea;
pub use slot::VersionSlot;
pub use tile_group::{InMemoryCatalog, TileGroup, TileGroupCatalog};
pub use visibility::{is_occupied, is_visible, Visibility};
