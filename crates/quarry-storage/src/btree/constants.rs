//! Derived size constants for B+Tree nodes.

use quarry_common::page::PAGE_SIZE;
use quarry_common::RecordId;

/// Bytes taken by the node level discriminator.
pub(crate) const LEVEL_SIZE: usize = 4;

/// Bytes taken by a page number on disk.
pub(crate) const PAGE_NO_SIZE: usize = 4;

/// Bytes taken by an integer key on disk.
pub(crate) const KEY_SIZE: usize = 4;

/// Number of (key, record id) slots in a leaf node.
///
/// A leaf holds the level discriminator, the sibling pointer, and as many
/// key/rid pairs as fit in the remainder of the page.
pub const LEAF_CAPACITY: usize =
    (PAGE_SIZE - LEVEL_SIZE - PAGE_NO_SIZE) / (KEY_SIZE + RecordId::SIZE);

/// Number of separator keys in an internal node (which holds one more
/// child pointer than keys).
pub const INTERNAL_CAPACITY: usize =
    (PAGE_SIZE - LEVEL_SIZE - PAGE_NO_SIZE) / (KEY_SIZE + PAGE_NO_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_layout_fits_in_page() {
        let used = LEVEL_SIZE + LEAF_CAPACITY * (KEY_SIZE + RecordId::SIZE) + PAGE_NO_SIZE;
        assert!(used <= PAGE_SIZE);
        // One more slot must not fit
        assert!(used + KEY_SIZE + RecordId::SIZE > PAGE_SIZE);
    }

    #[test]
    fn test_internal_layout_fits_in_page() {
        let used = LEVEL_SIZE + INTERNAL_CAPACITY * KEY_SIZE + (INTERNAL_CAPACITY + 1) * PAGE_NO_SIZE;
        assert!(used <= PAGE_SIZE);
        assert!(used + KEY_SIZE + PAGE_NO_SIZE > PAGE_SIZE);
    }

    #[test]
    fn test_capacities_are_useful() {
        // Splits take the middle slot, so both halves must be non-empty.
        assert!(LEAF_CAPACITY >= 4);
        assert!(INTERNAL_CAPACITY >= 4);
    }
}
