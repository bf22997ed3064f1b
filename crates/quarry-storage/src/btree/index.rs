//! Page-based B+Tree index: lifecycle, insertion, and range scans.

use super::meta::IndexMeta;
use super::node::{self, InternalNode, LeafNode};
use super::ScanOp;
use crate::bufmgr::BufferManager;
use crate::heap::HeapFile;
use quarry_common::page::{PageNo, INVALID_PAGE_NO};
use quarry_common::{AttrType, QuarryError, RecordId, Result};
use std::sync::Arc;

/// Page number of the metadata page in every index file.
const HEADER_PAGE_NO: PageNo = 1;

/// State of the single active range scan.
///
/// `page_no` is the currently pinned leaf; once the scan runs past its
/// last matching record the pin is released and `page_no` drops to the
/// invalid sentinel, so further `scan_next` calls keep failing without
/// touching pages.
struct ScanState {
    /// Lower bound; only consulted while positioning.
    #[allow(dead_code)]
    low: i32,
    high: i32,
    #[allow(dead_code)]
    low_op: ScanOp,
    high_op: ScanOp,
    page_no: PageNo,
    next_entry: usize,
}

/// B+Tree index over one integer attribute of a heap relation.
///
/// The index file is named `"{relation}.{attr_byte_offset}"`. Opening an
/// existing file verifies the persisted metadata against the constructor
/// parameters; creating a fresh one bulk-loads every record of the base
/// relation. At most one range scan is active at a time.
pub struct BTreeIndex {
    /// Buffer manager shared with the rest of the engine.
    buf: Arc<BufferManager>,
    /// File ID of the index file.
    file_id: u32,
    /// Index file name.
    index_name: String,
    /// Page number of the current root node.
    root_page_no: PageNo,
    /// Byte offset of the indexed attribute inside records.
    attr_byte_offset: u32,
    /// Type of the indexed attribute.
    attr_type: AttrType,
    /// Active scan, if any.
    scan: Option<ScanState>,
}

/// Reads the indexed key out of a record.
fn extract_key(record: &[u8], offset: u32) -> Result<i32> {
    let offset = offset as usize;
    let bytes = record
        .get(offset..offset + 4)
        .ok_or(QuarryError::RecordTooShort { offset })?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl BTreeIndex {
    /// Opens the index for `relation_name` over the attribute at
    /// `attr_byte_offset`, creating and bulk-loading it if the index file
    /// does not exist yet.
    pub fn open_or_create(
        relation_name: &str,
        buf: Arc<BufferManager>,
        attr_byte_offset: u32,
        attr_type: AttrType,
    ) -> Result<Self> {
        let index_name = format!("{relation_name}.{attr_byte_offset}");

        if buf.files().exists(&index_name) {
            Self::open(relation_name, index_name, buf, attr_byte_offset, attr_type)
        } else {
            Self::create(relation_name, index_name, buf, attr_byte_offset, attr_type)
        }
    }

    fn open(
        relation_name: &str,
        index_name: String,
        buf: Arc<BufferManager>,
        attr_byte_offset: u32,
        attr_type: AttrType,
    ) -> Result<Self> {
        let file_id = buf.files().open(&index_name, false)?;

        let frame = buf.read_page(file_id, HEADER_PAGE_NO)?;
        let meta = {
            let data = frame.read_data();
            IndexMeta::from_bytes(&data[..])
        };
        buf.unpin_page(file_id, HEADER_PAGE_NO, false);
        let meta = meta?;

        if !meta.matches(relation_name, attr_byte_offset, attr_type) {
            return Err(QuarryError::BadIndexInfo(format!(
                "index file {index_name} was built for ({}, offset {}, {}), \
                 requested ({relation_name}, offset {attr_byte_offset}, {attr_type})",
                meta.relation_name, meta.attr_byte_offset, meta.attr_type
            )));
        }

        tracing::debug!(index = %index_name, root = meta.root_page_no, "opened index");

        Ok(Self {
            buf,
            file_id,
            index_name,
            root_page_no: meta.root_page_no,
            attr_byte_offset,
            attr_type,
            scan: None,
        })
    }

    fn create(
        relation_name: &str,
        index_name: String,
        buf: Arc<BufferManager>,
        attr_byte_offset: u32,
        attr_type: AttrType,
    ) -> Result<Self> {
        let file_id = buf.files().open(&index_name, true)?;

        // Metadata page lands on page 1, the initial root leaf on page 2.
        let (header_page_no, _) = buf.alloc_page(file_id)?;
        debug_assert_eq!(header_page_no, HEADER_PAGE_NO);
        buf.unpin_page(file_id, header_page_no, true);

        let (root_page_no, root_frame) = buf.alloc_page(file_id)?;
        {
            let mut data = root_frame.write_data();
            LeafNode::init(&mut data[..]);
        }
        buf.unpin_page(file_id, root_page_no, true);

        let meta = IndexMeta::new(relation_name, attr_byte_offset, attr_type, root_page_no);
        let frame = buf.read_page(file_id, header_page_no)?;
        {
            let mut data = frame.write_data();
            data[..IndexMeta::SIZE].copy_from_slice(&meta.to_bytes());
        }
        buf.unpin_page(file_id, header_page_no, true);

        tracing::debug!(index = %index_name, root = root_page_no, "created index");

        let mut index = Self {
            buf,
            file_id,
            index_name,
            root_page_no,
            attr_byte_offset,
            attr_type,
            scan: None,
        };
        index.bulk_load(relation_name)?;
        Ok(index)
    }

    /// Inserts every record of the base relation into the fresh index,
    /// then flushes the index file.
    fn bulk_load(&mut self, relation_name: &str) -> Result<()> {
        let relation = HeapFile::open(relation_name, self.buf.clone())?;
        let mut loaded = 0usize;

        for entry in relation.scan()? {
            let (rid, record) = entry?;
            let key = extract_key(&record, self.attr_byte_offset)?;
            self.insert_entry(key, rid)?;
            loaded += 1;
        }

        self.buf.flush_file(self.file_id)?;
        tracing::debug!(index = %self.index_name, records = loaded, "bulk load complete");
        Ok(())
    }

    /// Returns the index file name (`"{relation}.{attr_byte_offset}"`).
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the index file ID.
    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Returns the current root page number.
    pub fn root_page_no(&self) -> PageNo {
        self.root_page_no
    }

    /// Returns the attribute type the index was built over.
    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Inserts a (key, record id) pair.
    ///
    /// Descends to the proper leaf; splits propagate back up the descent,
    /// and a split of the root grows the tree by one level.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        let root = self.root_page_no;
        let root_was_leaf = {
            let frame = self.buf.read_page(self.file_id, root)?;
            let leaf = node::is_leaf(&frame.read_data()[..]);
            self.buf.unpin_page(self.file_id, root, false);
            leaf
        };

        if let Some((mid_key, new_page_no)) = self.insert_node(root, key, rid)? {
            self.grow_root(root_was_leaf, root, mid_key, new_page_no)?;
        }
        Ok(())
    }

    /// Recursive descent step. Returns the promoted (key, new right page)
    /// pair when the node at `page_no` split, None otherwise.
    fn insert_node(
        &self,
        page_no: PageNo,
        key: i32,
        rid: RecordId,
    ) -> Result<Option<(i32, PageNo)>> {
        let frame = self.buf.read_page(self.file_id, page_no)?;
        let (leaf, child) = {
            let data = frame.read_data();
            if node::is_leaf(&data[..]) {
                (true, INVALID_PAGE_NO)
            } else {
                let idx = InternalNode::child_index(&data[..], key);
                (false, InternalNode::child(&data[..], idx))
            }
        };

        if leaf {
            self.buf.unpin_page(self.file_id, page_no, false);
            return self.insert_into_leaf(page_no, key, rid);
        }

        // Unpinned conservatively dirty: this node may receive a promoted
        // entry when the child splits.
        self.buf.unpin_page(self.file_id, page_no, true);

        match self.insert_node(child, key, rid)? {
            Some((mid_key, new_child)) => self.insert_into_internal(page_no, mid_key, new_child),
            None => Ok(None),
        }
    }

    /// Places (key, rid) into the leaf at `page_no`, splitting if full.
    fn insert_into_leaf(
        &self,
        page_no: PageNo,
        key: i32,
        rid: RecordId,
    ) -> Result<Option<(i32, PageNo)>> {
        let frame = self.buf.read_page(self.file_id, page_no)?;
        let full = { LeafNode::is_full(&frame.read_data()[..]) };

        if !full {
            {
                let mut data = frame.write_data();
                LeafNode::insert(&mut data[..], key, rid);
            }
            self.buf.unpin_page(self.file_id, page_no, true);
            return Ok(None);
        }

        let (new_page_no, new_frame) = self.buf.alloc_page(self.file_id)?;
        let mid_key = {
            let mut left = frame.write_data();
            let mut right = new_frame.write_data();
            LeafNode::init(&mut right[..]);
            LeafNode::split(&mut left[..], &mut right[..], new_page_no, key, rid)
        };
        self.buf.unpin_page(self.file_id, new_page_no, true);
        self.buf.unpin_page(self.file_id, page_no, true);

        Ok(Some((mid_key, new_page_no)))
    }

    /// Places a promoted (separator, child) pair into the internal node at
    /// `page_no`, splitting if full.
    fn insert_into_internal(
        &self,
        page_no: PageNo,
        key: i32,
        child: PageNo,
    ) -> Result<Option<(i32, PageNo)>> {
        let frame = self.buf.read_page(self.file_id, page_no)?;
        let full = { InternalNode::is_full(&frame.read_data()[..]) };

        if !full {
            {
                let mut data = frame.write_data();
                InternalNode::insert(&mut data[..], key, child);
            }
            self.buf.unpin_page(self.file_id, page_no, true);
            return Ok(None);
        }

        let (new_page_no, new_frame) = self.buf.alloc_page(self.file_id)?;
        let mid_key = {
            let mut left = frame.write_data();
            let mut right = new_frame.write_data();
            InternalNode::init(&mut right[..], node::level(&left[..]));
            InternalNode::split(&mut left[..], &mut right[..], key, child)
        };
        self.buf.unpin_page(self.file_id, new_page_no, true);
        self.buf.unpin_page(self.file_id, page_no, true);

        Ok(Some((mid_key, new_page_no)))
    }

    /// Grows a new root above a split old root and persists the change.
    fn grow_root(
        &mut self,
        old_root_was_leaf: bool,
        old_root: PageNo,
        mid_key: i32,
        new_child: PageNo,
    ) -> Result<()> {
        let (new_root, frame) = self.buf.alloc_page(self.file_id)?;
        {
            let mut data = frame.write_data();
            // The level only discriminates leaf from internal; 1 marks
            // "children are leaves", anything else gets 0.
            InternalNode::init(&mut data[..], if old_root_was_leaf { 1 } else { 0 });
            InternalNode::set_child(&mut data[..], 0, old_root);
            InternalNode::insert(&mut data[..], mid_key, new_child);
        }
        self.buf.unpin_page(self.file_id, new_root, true);

        self.root_page_no = new_root;
        self.persist_root_page_no()?;

        tracing::debug!(
            index = %self.index_name,
            old_root,
            new_root,
            "root split, tree grew one level"
        );
        Ok(())
    }

    /// Rewrites the metadata page with the current root page number.
    fn persist_root_page_no(&self) -> Result<()> {
        let frame = self.buf.read_page(self.file_id, HEADER_PAGE_NO)?;
        let result = {
            let mut data = frame.write_data();
            IndexMeta::from_bytes(&data[..]).map(|mut meta| {
                meta.root_page_no = self.root_page_no;
                data[..IndexMeta::SIZE].copy_from_slice(&meta.to_bytes());
            })
        };
        self.buf.unpin_page(self.file_id, HEADER_PAGE_NO, true);
        result
    }

    // =========================================================================
    // Range scan
    // =========================================================================

    /// Runs a closure against a pinned page's data, taking and releasing a
    /// transient pin. Any long-lived pin on the page is unaffected.
    fn with_page<R>(&self, page_no: PageNo, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let frame = self.buf.read_page(self.file_id, page_no)?;
        let out = f(&frame.read_data()[..]);
        self.buf.unpin_page(self.file_id, page_no, false);
        Ok(out)
    }

    /// Begins a range scan over keys in (low, high) under the given
    /// operators, positioning on the first qualifying entry.
    ///
    /// The leaf holding that entry stays pinned until the scan moves past
    /// it, completes, or is ended.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: ScanOp,
        high: i32,
        high_op: ScanOp,
    ) -> Result<()> {
        if !matches!(low_op, ScanOp::Gt | ScanOp::Gte)
            || !matches!(high_op, ScanOp::Lt | ScanOp::Lte)
        {
            return Err(QuarryError::BadOpcodes);
        }
        if low > high {
            return Err(QuarryError::BadScanRange);
        }

        if self.scan.is_some() {
            self.end_scan()?;
        }

        // Descend toward the leaf that would hold the lower bound.
        let mut page_no = self.root_page_no;
        loop {
            let frame = self.buf.read_page(self.file_id, page_no)?;
            let next = {
                let data = frame.read_data();
                if node::is_leaf(&data[..]) {
                    None
                } else {
                    let idx = InternalNode::child_index(&data[..], low);
                    Some(InternalNode::child(&data[..], idx))
                }
            };
            match next {
                None => break, // leaf reached, left pinned
                Some(child) => {
                    self.buf.unpin_page(self.file_id, page_no, false);
                    page_no = child;
                }
            }
        }

        // Position on the first entry satisfying the low bound, walking the
        // sibling chain if the bound falls past the end of a leaf.
        enum Position {
            Found(usize),
            Hop(PageNo),
            Exhausted,
        }

        loop {
            let position = self.with_page(page_no, |data| {
                for slot in 0..super::LEAF_CAPACITY {
                    if !LeafNode::slot_used(data, slot) {
                        break;
                    }
                    let key = LeafNode::key(data, slot);
                    let low_ok = match low_op {
                        ScanOp::Gt => key > low,
                        _ => key >= low,
                    };
                    if low_ok {
                        return Position::Found(slot);
                    }
                    let past_high = match high_op {
                        ScanOp::Lt => key > high,
                        _ => key >= high,
                    };
                    if past_high {
                        return Position::Exhausted;
                    }
                }
                match LeafNode::right_sibling(data) {
                    INVALID_PAGE_NO => Position::Exhausted,
                    sibling => Position::Hop(sibling),
                }
            })?;

            match position {
                Position::Found(slot) => {
                    self.scan = Some(ScanState {
                        low,
                        high,
                        low_op,
                        high_op,
                        page_no,
                        next_entry: slot,
                    });
                    return Ok(());
                }
                Position::Hop(sibling) => {
                    self.buf.unpin_page(self.file_id, page_no, false);
                    let _ = self.buf.read_page(self.file_id, sibling)?;
                    page_no = sibling;
                }
                Position::Exhausted => {
                    self.buf.unpin_page(self.file_id, page_no, false);
                    return Err(QuarryError::NoSuchKeyFound);
                }
            }
        }
    }

    /// Returns the record id of the next entry matching the scan.
    ///
    /// A record id is yielded iff its key satisfies both bounds; once the
    /// range is exhausted every call fails with `IndexScanCompleted` until
    /// the scan is ended.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let (mut page_no, mut next_entry, high, high_op) = match &self.scan {
            None => return Err(QuarryError::ScanNotInitialized),
            Some(scan) if scan.page_no == INVALID_PAGE_NO => {
                return Err(QuarryError::IndexScanCompleted)
            }
            Some(scan) => (scan.page_no, scan.next_entry, scan.high, scan.high_op),
        };

        enum Step {
            Yield(i32, RecordId),
            Hop(PageNo),
            ChainEnd,
        }

        loop {
            let step = self.with_page(page_no, |data| {
                if next_entry >= super::LEAF_CAPACITY || !LeafNode::slot_used(data, next_entry) {
                    return match LeafNode::right_sibling(data) {
                        INVALID_PAGE_NO => Step::ChainEnd,
                        sibling => Step::Hop(sibling),
                    };
                }
                Step::Yield(
                    LeafNode::key(data, next_entry),
                    LeafNode::rid(data, next_entry),
                )
            })?;

            match step {
                Step::Yield(key, rid) => {
                    if key > high || (key == high && high_op == ScanOp::Lt) {
                        self.finish_scan(page_no);
                        return Err(QuarryError::IndexScanCompleted);
                    }
                    if let Some(scan) = self.scan.as_mut() {
                        scan.page_no = page_no;
                        scan.next_entry = next_entry + 1;
                    }
                    return Ok(rid);
                }
                Step::Hop(sibling) => {
                    self.buf.unpin_page(self.file_id, page_no, false);
                    let _ = self.buf.read_page(self.file_id, sibling)?;
                    page_no = sibling;
                    next_entry = 0;
                }
                Step::ChainEnd => {
                    self.finish_scan(page_no);
                    return Err(QuarryError::IndexScanCompleted);
                }
            }
        }
    }

    /// Releases the scan's pin and marks it completed (still active until
    /// `end_scan`, but holding no page).
    fn finish_scan(&mut self, page_no: PageNo) {
        self.buf.unpin_page(self.file_id, page_no, false);
        if let Some(scan) = self.scan.as_mut() {
            scan.page_no = INVALID_PAGE_NO;
        }
    }

    /// Terminates the current scan, releasing its pinned leaf.
    pub fn end_scan(&mut self) -> Result<()> {
        let scan = self.scan.take().ok_or(QuarryError::ScanNotInitialized)?;
        if scan.page_no != INVALID_PAGE_NO {
            self.buf.unpin_page(self.file_id, scan.page_no, false);
        }
        Ok(())
    }
}

impl Drop for BTreeIndex {
    /// Teardown never raises: any active scan is released and the index
    /// file flushed, with failures logged and swallowed.
    fn drop(&mut self) {
        if let Some(scan) = self.scan.take() {
            if scan.page_no != INVALID_PAGE_NO {
                self.buf.unpin_page(self.file_id, scan.page_no, false);
            }
        }
        if let Err(err) = self.buf.flush_file(self.file_id) {
            tracing::warn!(index = %self.index_name, %err, "flush on close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_key() {
        let mut record = [0u8; 12];
        record[4..8].copy_from_slice(&(-77i32).to_le_bytes());

        assert_eq!(extract_key(&record, 4).unwrap(), -77);
        assert_eq!(extract_key(&record, 0).unwrap(), 0);
    }

    #[test]
    fn test_extract_key_too_short() {
        let record = [0u8; 6];
        assert!(matches!(
            extract_key(&record, 4),
            Err(QuarryError::RecordTooShort { offset: 4 })
        ));
        assert!(matches!(
            extract_key(&record, 100),
            Err(QuarryError::RecordTooShort { .. })
        ));
    }
}
