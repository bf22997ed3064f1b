//! Storage engine for QuarryDB.
//!
//! This crate provides:
//! - File manager for page-level I/O over named blob files
//! - Buffer manager tying the frame pool to file I/O with a pin/unpin contract
//! - Heap files for record storage with a sequential scanner
//! - B+Tree secondary index over an integer attribute of a heap relation

mod btree;
mod bufmgr;
mod file;
mod heap;

pub use btree::{
    node, BTreeIndex, IndexMeta, InternalNode, LeafNode, ScanOp, INTERNAL_CAPACITY, LEAF_CAPACITY,
};
pub use bufmgr::BufferManager;
pub use file::{FileManager, FileManagerConfig};
pub use heap::{HeapFile, HeapPage, HeapScan};
