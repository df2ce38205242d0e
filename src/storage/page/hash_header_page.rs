//! Header page of the linear-probe hash table.
//!
//! ```text
//! | page id (4) | bucket count (8) | block count (4) | block page ids (4 each) ... |
//! ```

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::storage::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use std::ops::{Deref, DerefMut};

const PAGE_ID_OFFSET: usize = 0;
const NUM_BUCKETS_OFFSET: usize = 4;
const NUM_BLOCKS_OFFSET: usize = 12;
const BLOCK_IDS_OFFSET: usize = 16;

/// Upper bound on block pages a single header can reference.
pub const MAX_BLOCK_PAGES: usize = (PAGE_SIZE - BLOCK_IDS_OFFSET) / 4;

pub struct HashHeaderPage<T> {
    data: T,
}

impl<T: Deref<Target = [u8; PAGE_SIZE]>> HashHeaderPage<T> {
    pub fn from_data(data: T) -> Self {
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        PageId(LittleEndian::read_u32(&self.data[PAGE_ID_OFFSET..]))
    }

    pub fn num_buckets(&self) -> usize {
        LittleEndian::read_u64(&self.data[NUM_BUCKETS_OFFSET..]) as usize
    }

    pub fn num_blocks(&self) -> usize {
        LittleEndian::read_u32(&self.data[NUM_BLOCKS_OFFSET..]) as usize
    }

    pub fn block_page_id(&self, index: usize) -> Option<PageId> {
        if index >= self.num_blocks() {
            return None;
        }
        let offset = BLOCK_IDS_OFFSET + index * 4;
        Some(PageId(LittleEndian::read_u32(&self.data[offset..])))
    }
}

impl<T: DerefMut<Target = [u8; PAGE_SIZE]>> HashHeaderPage<T> {
    /// Format `data` as an empty header for a table of `num_buckets` buckets.
    pub fn new(mut data: T, page_id: PageId, num_buckets: usize) -> Self {
        LittleEndian::write_u32(&mut data[PAGE_ID_OFFSET..], page_id.0);
        LittleEndian::write_u64(&mut data[NUM_BUCKETS_OFFSET..], num_buckets as u64);
        LittleEndian::write_u32(&mut data[NUM_BLOCKS_OFFSET..], 0);
        Self { data }
    }

    pub fn add_block_page_id(&mut self, page_id: PageId) -> StorageResult<()> {
        let num_blocks = self.num_blocks();
        if num_blocks >= MAX_BLOCK_PAGES {
            return Err(StorageError::PageLayout(format!(
                "hash header is full ({} block pages)",
                MAX_BLOCK_PAGES
            )));
        }

        let offset = BLOCK_IDS_OFFSET + num_blocks * 4;
        LittleEndian::write_u32(&mut self.data[offset..], page_id.0);
        LittleEndian::write_u32(&mut self.data[NUM_BLOCKS_OFFSET..], num_blocks as u32 + 1);
        Ok(())
    }
}
