//! Storage layer error types.

use crate::storage::page::PageId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Buffer pool is full: every frame is pinned")]
    BufferPoolFull,

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Invalid page buffer size: expected {expected} bytes, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Page layout error: {0}")]
    PageLayout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
