//! Error types for QuarryDB.

use thiserror::Error;

/// Result type alias using QuarryError.
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Errors that can occur in QuarryDB operations.
#[derive(Debug, Error)]
pub enum QuarryError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("file {file_id} is not open")]
    FileNotOpen { file_id: u32 },

    #[error("page {page_no} does not exist in file {file_id}")]
    PageNotFound { file_id: u32, page_no: u32 },

    #[error("buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("heap page full, unable to insert record")]
    PageFull,

    #[error("record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("record too short to contain a key at byte offset {offset}")]
    RecordTooShort { offset: usize },

    // Index errors
    #[error("index metadata mismatch: {0}")]
    BadIndexInfo(String),

    #[error("invalid scan operators: low bound takes GT/GTE, high bound takes LT/LTE")]
    BadOpcodes,

    #[error("invalid scan range: low value exceeds high value")]
    BadScanRange,

    #[error("no key in the index satisfies the scan criteria")]
    NoSuchKeyFound,

    #[error("no scan is currently in progress")]
    ScanNotInitialized,

    #[error("index scan has passed the last matching record")]
    IndexScanCompleted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: QuarryError = io_err.into();
        assert!(matches!(err, QuarryError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_storage_errors_display() {
        let err = QuarryError::FileNotOpen { file_id: 3 };
        assert_eq!(err.to_string(), "file 3 is not open");

        let err = QuarryError::PageNotFound {
            file_id: 1,
            page_no: 42,
        };
        assert_eq!(err.to_string(), "page 42 does not exist in file 1");

        let err = QuarryError::BufferPoolFull;
        assert_eq!(
            err.to_string(),
            "buffer pool full, unable to allocate frame"
        );

        let err = QuarryError::RecordTooLarge {
            size: 20000,
            max: 16372,
        };
        assert_eq!(err.to_string(), "record too large: 20000 bytes (max 16372)");
    }

    #[test]
    fn test_index_errors_display() {
        let err = QuarryError::BadIndexInfo("attribute offset 4 != 8".to_string());
        assert_eq!(
            err.to_string(),
            "index metadata mismatch: attribute offset 4 != 8"
        );

        let err = QuarryError::NoSuchKeyFound;
        assert_eq!(
            err.to_string(),
            "no key in the index satisfies the scan criteria"
        );

        let err = QuarryError::ScanNotInitialized;
        assert_eq!(err.to_string(), "no scan is currently in progress");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(QuarryError::BadScanRange)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QuarryError>();
    }
}
