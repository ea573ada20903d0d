//! The indirection table: the stable identity of a logical tuple.
//!
//! Each logical tuple is addressed indirectly through a cell naming its
//! current head version. Updates swing the cell to the new head; aborted
//! updates swing it back. Readers and index probes always resolve a tuple
//! through this cell rather than by holding a version's `ItemPointer`
//! directly, so a concurrent update cannot invalidate an in-flight lookup.

use parking_lot::Mutex;

use tessera_core::ItemPointer;

/// A pointer-sized cell naming the current head version of one logical
/// tuple. The source system CASes a machine word; an `ItemPointer` here
/// carries more than one word; a short lock gives the same compare-and-swap
/// semantics in safe Rust without a hand-packed atomic.
pub struct IndirectionCell {
    current: Mutex<ItemPointer>,
}

impl IndirectionCell {
    pub fn new(initial: ItemPointer) -> Self {
        Self {
            current: Mutex::new(initial),
        }
    }

    pub fn load(&self) -> ItemPointer {
        *self.current.lock()
    }

    /// Swing the cell to `new` iff it currently holds `expected`. Returns
    /// whether the swing happened.
    pub fn compare_and_swap(&self, expected: ItemPointer, new: ItemPointer) -> bool {
        let mut g = self.current.lock();
        if *g == expected {
            *g = new;
            true
        } else {
            false
        }
    }

    /// Unconditional swing, used only during abort rollback where the
    /// caller already knows the cell must hold the version being undone.
    pub fn store(&self, new: ItemPointer) {
        *self.current.lock() = new;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::BlockId;

    fn ptr(offset: u32) -> ItemPointer {
        ItemPointer::new(BlockId(1), offset)
    }

    #[test]
    fn cas_swings_only_on_match() {
        let cell = IndirectionCell::new(ptr(1));
        assert!(!cell.compare_and_swap(ptr(2), ptr(3)));
        assert_eq!(cell.load(), ptr(1));
        assert!(cell.compare_and_swap(ptr(1), ptr(2)));
        assert_eq!(cell.load(), ptr(2));
    }

    #[test]
    fn rollback_restores_prior_head() {
        let cell = IndirectionCell::new(ptr(1));
        assert!(cell.compare_and_swap(ptr(1), ptr(2)));
        cell.store(ptr(1));
        assert_eq!(cell.load(), ptr(1));
    }
}
