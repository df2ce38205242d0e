use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const PAGE_SIZE: usize = 8192;

/// Page-granular access to one database file.
///
/// The file is a flat array of `PAGE_SIZE` pages; page `n` starts at byte
/// `n * PAGE_SIZE`. Writes are not synced individually, call [`sync`] to
/// make them durable.
///
/// [`sync`]: PageManager::sync
pub struct PageManager {
    file: File,
    num_pages: u32,
}

impl PageManager {
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        debug!("created page file {:?}", path);
        Ok(Self { file, num_pages: 0 })
    }

    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let num_pages = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;

        debug!("opened page file {:?} with {} pages", path, num_pages);
        Ok(Self { file, num_pages })
    }

    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> StorageResult<()> {
        Self::check_len(buf.len())?;
        if page_id.0 >= self.num_pages {
            return Err(StorageError::PageNotFound(page_id));
        }

        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> StorageResult<()> {
        Self::check_len(data.len())?;

        // Writing past the end grows the file; any skipped pages read as zeros
        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.write_all(data)?;
        self.num_pages = self.num_pages.max(page_id.0 + 1);
        Ok(())
    }

    /// Extend the file by one zeroed page and return its id.
    pub fn allocate_page(&mut self) -> StorageResult<PageId> {
        let page_id = PageId(self.num_pages);
        self.file
            .set_len((self.num_pages as u64 + 1) * PAGE_SIZE as u64)?;
        self.num_pages += 1;

        debug!("allocated page {}", page_id);
        Ok(page_id)
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn check_len(len: usize) -> StorageResult<()> {
        if len != PAGE_SIZE {
            return Err(StorageError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: len,
            });
        }
        Ok(())
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id.0 as u64 * PAGE_SIZE as u64
    }
}
