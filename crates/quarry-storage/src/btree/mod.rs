//! B+Tree secondary index over an integer attribute of a heap relation.
//!
//! Node layout (one node per page, all fields little-endian):
//!
//! Leaf node:
//! ```text
//! +------------------------------+ 0
//! | level: i32 (always -1)       |
//! +------------------------------+ 4
//! | key[LEAF_CAPACITY]: i32      |
//! +------------------------------+ 4 + 4*L
//! | rid[LEAF_CAPACITY]: 8 bytes  |
//! +------------------------------+ 4 + 12*L
//! | right_sibling: u32           |
//! +------------------------------+
//! ```
//!
//! Internal node:
//! ```text
//! +----------------------------------+ 0
//! | level: i32 (1 above leaves)      |
//! +----------------------------------+ 4
//! | key[INTERNAL_CAPACITY]: i32      |
//! +----------------------------------+ 4 + 4*M
//! | child[INTERNAL_CAPACITY+1]: u32  |
//! +----------------------------------+
//! ```
//!
//! A leaf slot is occupied iff its rid's page number is nonzero; an
//! internal slot i is occupied iff child i+1 is nonzero. Occupied slots
//! are left-compacted (there is no delete path). The level field at
//! offset 0 is the only discriminator between node kinds.

mod constants;
mod index;
mod meta;
pub mod node;

pub use constants::{INTERNAL_CAPACITY, LEAF_CAPACITY};
pub use index::BTreeIndex;
pub use meta::IndexMeta;
pub use node::{InternalNode, LeafNode};

/// Comparison operators accepted by [`BTreeIndex::start_scan`].
///
/// The low bound takes `Gt` or `Gte`; the high bound takes `Lt` or `Lte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOp {
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than or equal.
    Gte,
    /// Strictly greater than.
    Gt,
}
