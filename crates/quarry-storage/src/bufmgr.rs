//! Buffer manager: the pin/unpin page access facade over pool and files.
//!
//! All page access in the storage engine goes through this type. Pages come
//! back pinned from `alloc_page` and `read_page`; every pin must be matched
//! by exactly one `unpin_page` before control returns to a client-facing
//! operation, with the sole exception of an index scan's current leaf,
//! which stays pinned between `scan_next` calls.

use crate::file::FileManager;
use quarry_buffer::{BufferFrame, BufferPool, BufferPoolConfig, EvictedPage};
use quarry_common::page::{PageId, PageNo};
use quarry_common::Result;
use std::sync::Arc;

/// Buffer manager combining the frame pool with page-file I/O.
///
/// Dirty pages displaced by eviction are written back to their file
/// immediately, so callers never observe lost updates.
pub struct BufferManager {
    /// In-memory frame pool.
    pool: BufferPool,
    /// File manager for page I/O.
    files: Arc<FileManager>,
}

impl BufferManager {
    /// Creates a new buffer manager.
    pub fn new(files: Arc<FileManager>, config: BufferPoolConfig) -> Self {
        Self {
            pool: BufferPool::new(config),
            files,
        }
    }

    /// Creates a buffer manager with the default pool size.
    pub fn with_defaults(files: Arc<FileManager>) -> Self {
        Self::new(files, BufferPoolConfig::default())
    }

    /// Returns the underlying file manager.
    pub fn files(&self) -> &FileManager {
        &self.files
    }

    /// Returns the number of pages currently pinned in the pool.
    pub fn pinned_page_count(&self) -> usize {
        self.pool.pinned_count()
    }

    /// Allocates a fresh page at the end of the file.
    ///
    /// Returns the new page number and its frame, pinned and zero-filled.
    /// The caller is responsible for unpinning with `dirty = true` once the
    /// page is initialized.
    pub fn alloc_page(&self, file_id: u32) -> Result<(PageNo, &BufferFrame)> {
        let page_no = self.files.allocate_page(file_id)?;
        let page_id = PageId::new(file_id, page_no);

        let (frame, evicted) = self.pool.new_page(page_id)?;
        self.write_back(evicted)?;

        Ok((page_no, frame))
    }

    /// Reads a page, loading it from disk if it is not resident.
    ///
    /// The returned frame is pinned.
    pub fn read_page(&self, file_id: u32, page_no: PageNo) -> Result<&BufferFrame> {
        let page_id = PageId::new(file_id, page_no);

        if let Some(frame) = self.pool.fetch_page(page_id) {
            return Ok(frame);
        }

        let data = self.files.read_page(page_id)?;
        let (frame, evicted) = self.pool.load_page(page_id, &data)?;
        self.write_back(evicted)?;

        Ok(frame)
    }

    /// Unpins a page, marking it dirty if it was written.
    pub fn unpin_page(&self, file_id: u32, page_no: PageNo, dirty: bool) {
        self.pool.unpin_page(PageId::new(file_id, page_no), dirty);
    }

    /// Flushes every dirty page of the file to disk and fsyncs it.
    pub fn flush_file(&self, file_id: u32) -> Result<()> {
        self.pool
            .flush_file(file_id, |page_id, data| self.files.write_page(page_id, data))?;
        self.files.flush(file_id)
    }

    /// Writes an evicted dirty page back to its file.
    fn write_back(&self, evicted: Option<EvictedPage>) -> Result<()> {
        if let Some(page) = evicted {
            self.files.write_page(page.page_id, &page.data)?;
        }
        Ok(())
    }
}
