//! The visibility function: whether a version is visible to a given viewer,
//! and the related `IsOccupied` rule used by index probes.

use tessera_core::{CommitId, TxnId, INITIAL_TXN_ID, INVALID_CID, INVALID_TXN_ID, MAX_CID};

use crate::slot::VersionSlot;

/// Result of checking a version against a viewing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The viewer may read this version's value.
    Ok,
    /// This version carries no information for the viewer.
    Invisible,
    /// The viewer's own pending delete: readable as "gone" but still
    /// occupying the slot.
    Deleted,
}

/// Is `slot` visible to a transaction `viewer_txn` whose snapshot begins at
/// `viewer_begin_cid`?
pub fn is_visible<C>(
    slot: &VersionSlot<C>,
    viewer_txn: TxnId,
    viewer_begin_cid: CommitId,
) -> Visibility {
    let txn_id = slot.txn_id();
    if txn_id == INVALID_TXN_ID {
        return Visibility::Invisible;
    }

    let begin = slot.begin_cid();
    let end = slot.end_cid();
    let own = txn_id == viewer_txn;

    if own {
        if begin == MAX_CID && end != INVALID_CID {
            return Visibility::Ok;
        }
        if end == INVALID_CID {
            return Visibility::Deleted;
        }
        return Visibility::Invisible;
    }

    let activated = viewer_begin_cid >= begin;
    let invalidated = viewer_begin_cid >= end;

    if txn_id != INITIAL_TXN_ID {
        // Owned by another live writer: never let a reader see an
        // uncommitted version, even if the commit-id arithmetic would
        // otherwise say it is "activated".
        if begin == MAX_CID {
            return Visibility::Invisible;
        }
    }

    if activated && !invalidated {
        Visibility::Ok
    } else {
        Visibility::Invisible
    }
}

/// The `IsOccupied` rule consumed by index uniqueness checks and probes.
/// `read_own` is true iff the viewer's own read/write set has marked this
/// slot `READ_OWN` (i.e. it is revisiting a version it already owns).
pub fn is_occupied<C>(
    slot: &VersionSlot<C>,
    viewer_txn: TxnId,
    read_own: bool,
) -> bool {
    let txn_id = slot.txn_id();
    if txn_id == INVALID_TXN_ID {
        return false;
    }

    let own = txn_id == viewer_txn;
    let end = slot.end_cid();

    if own {
        if end == INVALID_CID {
            return false;
        }
        return read_own;
    }

    if txn_id != INITIAL_TXN_ID {
        return end != INVALID_CID;
    }

    // Committed, unowned: the slot holds a real value regardless of the
    // prober's own snapshot window, so it counts as occupied.
    true
}
