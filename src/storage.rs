//! Storage layer implementation for clockpool.
//!
//! This module provides page-based persistent storage with an in-memory cache
//! in front of it. Key components:
//!
//! - **PageManager**: Handles reading/writing fixed-size pages to disk
//! - **BufferPoolManager**: Fixed set of in-memory frames shared by all callers
//! - **ClockReplacer**: Second-chance victim selection for the buffer pool
//! - **Hash pages**: Header and block page layouts for the linear-probe hash table

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::clock::ClockReplacer;
pub use buffer::replacer::{FrameId, Replacer};
pub use buffer::{BufferPoolManager, PageReadGuard, PageWriteGuard};
pub use disk::{PageManager, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::PageId;
