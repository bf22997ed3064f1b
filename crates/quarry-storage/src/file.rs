//! File manager for page-level I/O over named blob files.

use parking_lot::Mutex;
use quarry_common::page::{PageId, PageNo, INVALID_PAGE_NO, PAGE_SIZE};
use quarry_common::{QuarryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Configuration for the file manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileManagerConfig {
    /// Base directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for FileManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

/// Manages reading and writing pages of named blob files.
///
/// Files are opened by name relative to the data directory and addressed
/// afterwards by the file ID assigned at open time. Pages are 1-indexed;
/// page number 0 is reserved as the null sentinel and never stored.
pub struct FileManager {
    /// Configuration.
    config: FileManagerConfig,
    /// Open file handles keyed by file_id.
    files: Mutex<HashMap<u32, FileHandle>>,
    /// Next file ID to hand out.
    next_file_id: AtomicU32,
}

/// Handle for an open data file.
struct FileHandle {
    /// The file handle.
    file: File,
    /// Path to the file.
    path: PathBuf,
    /// Number of pages in the file.
    num_pages: u32,
}

impl FileManager {
    /// Creates a new file manager, creating the data directory if needed.
    pub fn new(config: FileManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            config,
            files: Mutex::new(HashMap::new()),
            next_file_id: AtomicU32::new(0),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Returns true if a file with the given name exists on disk.
    pub fn exists(&self, name: &str) -> bool {
        self.config.data_dir.join(name).exists()
    }

    /// Opens a file by name, optionally creating it.
    ///
    /// Re-opening an already-open path returns the existing file ID.
    pub fn open(&self, name: &str, create: bool) -> Result<u32> {
        let path = self.config.data_dir.join(name);
        let mut files = self.files.lock();

        if let Some((&file_id, _)) = files.iter().find(|(_, handle)| handle.path == path) {
            return Ok(file_id);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let file_id = self.next_file_id.fetch_add(1, Ordering::Relaxed);
        files.insert(
            file_id,
            FileHandle {
                file,
                path,
                num_pages,
            },
        );

        Ok(file_id)
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut files = self.files.lock();
        let handle = files
            .get_mut(&page_id.file_id)
            .ok_or(QuarryError::FileNotOpen {
                file_id: page_id.file_id,
            })?;

        if page_id.page_no == INVALID_PAGE_NO || page_id.page_no > handle.num_pages {
            return Err(QuarryError::PageNotFound {
                file_id: page_id.file_id,
                page_no: page_id.page_no,
            });
        }

        let offset = (page_id.page_no as u64 - 1) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = [0u8; PAGE_SIZE];
        handle.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut files = self.files.lock();
        let handle = files
            .get_mut(&page_id.file_id)
            .ok_or(QuarryError::FileNotOpen {
                file_id: page_id.file_id,
            })?;

        if page_id.page_no == INVALID_PAGE_NO {
            return Err(QuarryError::PageNotFound {
                file_id: page_id.file_id,
                page_no: page_id.page_no,
            });
        }

        let offset = (page_id.page_no as u64 - 1) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(data)?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        // Track the new page count if the write extended the file
        if page_id.page_no > handle.num_pages {
            handle.num_pages = page_id.page_no;
        }

        Ok(())
    }

    /// Allocates a new page at the end of the file.
    ///
    /// The page is written out zeroed; the first allocation in a fresh file
    /// returns page number 1.
    pub fn allocate_page(&self, file_id: u32) -> Result<PageNo> {
        let mut files = self.files.lock();
        let handle = files
            .get_mut(&file_id)
            .ok_or(QuarryError::FileNotOpen { file_id })?;

        let page_no = handle.num_pages + 1;

        let offset = (page_no as u64 - 1) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        handle.num_pages = page_no;

        Ok(page_no)
    }

    /// Returns the number of pages in a file.
    pub fn num_pages(&self, file_id: u32) -> Result<u32> {
        let files = self.files.lock();
        let handle = files
            .get(&file_id)
            .ok_or(QuarryError::FileNotOpen { file_id })?;

        Ok(handle.num_pages)
    }

    /// Flushes a file's pending writes to disk.
    pub fn flush(&self, file_id: u32) -> Result<()> {
        let files = self.files.lock();
        let handle = files
            .get(&file_id)
            .ok_or(QuarryError::FileNotOpen { file_id })?;

        handle.file.sync_all()?;
        Ok(())
    }

    /// Closes a specific file.
    pub fn close(&self, file_id: u32) -> Result<()> {
        let mut files = self.files.lock();
        if let Some(handle) = files.remove(&file_id) {
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Closes all open files.
    pub fn close_all(&self) -> Result<()> {
        let mut files = self.files.lock();
        for (_, handle) in files.drain() {
            handle.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for FileManager {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}
