//! Heap file: record storage over buffer-managed pages.

use crate::bufmgr::BufferManager;
use crate::heap::page::HeapPage;
use bytes::Bytes;
use quarry_common::page::PageNo;
use quarry_common::{QuarryError, RecordId, Result};
use std::collections::VecDeque;
use std::sync::Arc;

/// A heap relation: an append-only sequence of slotted record pages.
///
/// All page access goes through the buffer manager; pages are pinned for
/// the duration of a single insert or scan step and released before
/// returning.
pub struct HeapFile {
    /// Buffer manager for page access.
    buf: Arc<BufferManager>,
    /// File ID of the heap file.
    file_id: u32,
    /// Relation name (file name within the data directory).
    name: String,
}

impl HeapFile {
    /// Creates a heap file, or opens it if it already exists.
    pub fn create(name: &str, buf: Arc<BufferManager>) -> Result<Self> {
        let file_id = buf.files().open(name, true)?;
        Ok(Self {
            buf,
            file_id,
            name: name.to_string(),
        })
    }

    /// Opens an existing heap file.
    pub fn open(name: &str, buf: Arc<BufferManager>) -> Result<Self> {
        let file_id = buf.files().open(name, false)?;
        Ok(Self {
            buf,
            file_id,
            name: name.to_string(),
        })
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file ID.
    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Inserts a record, returning its record id.
    ///
    /// Records go into the last page; a fresh page is allocated when it is
    /// full (or when the file is empty).
    pub fn insert(&self, record: &[u8]) -> Result<RecordId> {
        if record.len() > HeapPage::MAX_RECORD_SIZE {
            return Err(QuarryError::RecordTooLarge {
                size: record.len(),
                max: HeapPage::MAX_RECORD_SIZE,
            });
        }

        let num_pages = self.buf.files().num_pages(self.file_id)?;
        if num_pages > 0 {
            let page_no = num_pages;
            let frame = self.buf.read_page(self.file_id, page_no)?;
            let inserted = {
                let mut data = frame.write_data();
                HeapPage::insert(&mut data[..], record)
            };
            match inserted {
                Ok(slot_no) => {
                    self.buf.unpin_page(self.file_id, page_no, true);
                    return Ok(RecordId::new(page_no, slot_no));
                }
                Err(QuarryError::PageFull) => {
                    self.buf.unpin_page(self.file_id, page_no, false);
                }
                Err(e) => {
                    self.buf.unpin_page(self.file_id, page_no, false);
                    return Err(e);
                }
            }
        }

        let (page_no, frame) = self.buf.alloc_page(self.file_id)?;
        let inserted = {
            let mut data = frame.write_data();
            HeapPage::init(&mut data[..]);
            HeapPage::insert(&mut data[..], record)
        };
        self.buf.unpin_page(self.file_id, page_no, true);
        let slot_no = inserted?;

        Ok(RecordId::new(page_no, slot_no))
    }

    /// Starts a sequential scan over every record in the relation.
    pub fn scan(&self) -> Result<HeapScan> {
        let num_pages = self.buf.files().num_pages(self.file_id)?;
        Ok(HeapScan {
            buf: self.buf.clone(),
            file_id: self.file_id,
            num_pages,
            next_page: 1,
            pending: VecDeque::new(),
        })
    }
}

/// Sequential scanner over a heap file.
///
/// Yields `(record_id, record_bytes)` in (page, slot) order. One page is
/// pinned at a time; its records are copied out before the pin is released,
/// so no pin outlives a call to `next`.
pub struct HeapScan {
    buf: Arc<BufferManager>,
    file_id: u32,
    num_pages: u32,
    next_page: PageNo,
    pending: VecDeque<(RecordId, Bytes)>,
}

impl HeapScan {
    fn load_page(&mut self, page_no: PageNo) -> Result<()> {
        let frame = self.buf.read_page(self.file_id, page_no)?;
        {
            let data = frame.read_data();
            for slot_no in 0..HeapPage::num_slots(&data[..]) {
                if let Some(record) = HeapPage::record(&data[..], slot_no) {
                    self.pending
                        .push_back((RecordId::new(page_no, slot_no), Bytes::copy_from_slice(record)));
                }
            }
        }
        self.buf.unpin_page(self.file_id, page_no, false);
        Ok(())
    }
}

impl Iterator for HeapScan {
    type Item = Result<(RecordId, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }
            if self.next_page > self.num_pages {
                return None;
            }
            let page_no = self.next_page;
            self.next_page += 1;
            if let Err(e) = self.load_page(page_no) {
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileManager, FileManagerConfig};
    use quarry_buffer::BufferPoolConfig;
    use tempfile::tempdir;

    fn create_test_bufmgr() -> (Arc<BufferManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let files = Arc::new(
            FileManager::new(FileManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: false,
            })
            .unwrap(),
        );
        let buf = Arc::new(BufferManager::new(
            files,
            BufferPoolConfig { num_frames: 16 },
        ));
        (buf, dir)
    }

    #[test]
    fn test_heap_file_insert_assigns_record_ids() {
        let (buf, _dir) = create_test_bufmgr();
        let heap = HeapFile::create("rel", buf).unwrap();

        let r1 = heap.insert(b"first").unwrap();
        let r2 = heap.insert(b"second").unwrap();

        assert_eq!(r1, RecordId::new(1, 0));
        assert_eq!(r2, RecordId::new(1, 1));
    }

    #[test]
    fn test_heap_file_insert_spills_to_new_page() {
        let (buf, _dir) = create_test_bufmgr();
        let heap = HeapFile::create("rel", buf.clone()).unwrap();

        // Each record occupies 2048 + 4 bytes, so a page holds 7 of them.
        let record = [0u8; 2048];
        let per_page = (quarry_common::page::PAGE_SIZE - HeapPage::HEADER_SIZE) / (2048 + 4);

        for _ in 0..per_page {
            let rid = heap.insert(&record).unwrap();
            assert_eq!(rid.page_no, 1);
        }

        let rid = heap.insert(&record).unwrap();
        assert_eq!(rid.page_no, 2);
        assert_eq!(rid.slot_no, 0);
    }

    #[test]
    fn test_heap_file_scan_order_and_contents() {
        let (buf, _dir) = create_test_bufmgr();
        let heap = HeapFile::create("rel", buf.clone()).unwrap();

        let mut expected = Vec::new();
        for i in 0u32..500 {
            let mut record = [0u8; 64];
            record[..4].copy_from_slice(&i.to_le_bytes());
            let rid = heap.insert(&record).unwrap();
            expected.push((rid, i));
        }

        let scanned: Vec<_> = heap
            .scan()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(scanned.len(), expected.len());
        for ((rid, record), (expected_rid, i)) in scanned.iter().zip(&expected) {
            assert_eq!(rid, expected_rid);
            assert_eq!(u32::from_le_bytes([record[0], record[1], record[2], record[3]]), *i);
        }

        // No pins survive the scan
        assert_eq!(buf.pinned_page_count(), 0);
    }

    #[test]
    fn test_heap_file_scan_empty() {
        let (buf, _dir) = create_test_bufmgr();
        let heap = HeapFile::create("rel", buf).unwrap();

        assert_eq!(heap.scan().unwrap().count(), 0);
    }

    #[test]
    fn test_heap_file_open_missing_fails() {
        let (buf, _dir) = create_test_bufmgr();
        assert!(HeapFile::open("missing", buf).is_err());
    }

    #[test]
    fn test_heap_file_record_too_large() {
        let (buf, _dir) = create_test_bufmgr();
        let heap = HeapFile::create("rel", buf).unwrap();

        let record = vec![0u8; HeapPage::MAX_RECORD_SIZE + 1];
        assert!(matches!(
            heap.insert(&record),
            Err(QuarryError::RecordTooLarge { .. })
        ));
    }
}
