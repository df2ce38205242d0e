use crate::config::HashTableConfig;
use crate::storage::buffer::{BufferPoolManager, PageReadGuard};
use crate::storage::error::StorageError;
use crate::storage::page::hash_block_page::block_slots;
use crate::storage::page::hash_header_page::MAX_BLOCK_PAGES;
use crate::storage::page::{FixedCodec, HashBlockPage, HashHeaderPage, PageId};
use anyhow::{bail, Result};
use log::debug;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Range;

pub type HashFn<K> = fn(&K) -> u64;

fn default_hash<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Fixed-size open-addressing hash table stored in buffer pool pages.
///
/// One header page lists the block pages. Bucket `b` lives in block
/// `b / slots` at slot `b % slots`. Duplicate keys are allowed. There is no
/// removal and no resizing: once every bucket is occupied, inserts return false.
///
/// An operation keeps the header and one block page pinned at the same time,
/// so the pool needs at least two frames.
pub struct LinearProbeHashTable<K, V> {
    buffer_pool: BufferPoolManager,
    header_page_id: PageId,
    hash_fn: HashFn<K>,
    _marker: PhantomData<V>,
}

impl<K, V> LinearProbeHashTable<K, V>
where
    K: FixedCodec + Hash + PartialEq,
    V: FixedCodec,
{
    pub fn new(buffer_pool: BufferPoolManager, num_buckets: usize) -> Result<Self> {
        Self::with_hasher(buffer_pool, num_buckets, default_hash::<K>)
    }

    pub fn with_config(buffer_pool: BufferPoolManager, config: &HashTableConfig) -> Result<Self> {
        Self::new(buffer_pool, config.num_buckets)
    }

    /// Reattach to a table created earlier with the default hasher.
    pub fn open(buffer_pool: BufferPoolManager, header_page_id: PageId) -> Result<Self> {
        let header = HashHeaderPage::from_data(buffer_pool.fetch_page(header_page_id)?);
        if header.page_id() != header_page_id || header.num_buckets() == 0 {
            bail!(StorageError::PageLayout(format!(
                "page {} is not a hash table header",
                header_page_id
            )));
        }

        Ok(Self {
            buffer_pool,
            header_page_id,
            hash_fn: default_hash::<K>,
            _marker: PhantomData,
        })
    }
}

impl<K, V> LinearProbeHashTable<K, V>
where
    K: FixedCodec + PartialEq,
    V: FixedCodec,
{
    pub fn with_hasher(
        buffer_pool: BufferPoolManager,
        num_buckets: usize,
        hash_fn: HashFn<K>,
    ) -> Result<Self> {
        if num_buckets == 0 {
            bail!("hash table needs at least one bucket");
        }
        let num_blocks = num_buckets.div_ceil(block_slots::<K, V>());
        if num_blocks > MAX_BLOCK_PAGES {
            bail!(
                "{} buckets need {} block pages, at most {} fit in the header",
                num_buckets,
                num_blocks,
                MAX_BLOCK_PAGES
            );
        }

        let (header_page_id, guard) = buffer_pool.new_page()?;
        let mut header = HashHeaderPage::new(guard, header_page_id, num_buckets);
        for _ in 0..num_blocks {
            // Fresh pages are zeroed, which is an empty block
            let (block_page_id, _block) = buffer_pool.new_page()?;
            header.add_block_page_id(block_page_id)?;
        }

        debug!(
            "created hash table at header page {} ({} buckets, {} blocks)",
            header_page_id, num_buckets, num_blocks
        );
        Ok(Self {
            buffer_pool,
            header_page_id,
            hash_fn,
            _marker: PhantomData,
        })
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    pub fn num_buckets(&self) -> Result<usize> {
        let header = HashHeaderPage::from_data(self.buffer_pool.fetch_page(self.header_page_id)?);
        Ok(header.num_buckets())
    }

    /// Store `(key, value)` in the first free bucket at or after the key's
    /// home bucket. Returns false when every bucket is occupied.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        let header = HashHeaderPage::from_data(self.buffer_pool.fetch_page(self.header_page_id)?);

        for (block_index, slots) in self.probe_runs(key, header.num_buckets()) {
            let page_id = Self::block_page_id(&header, block_index)?;
            let mut block = HashBlockPage::<_, K, V>::new(self.buffer_pool.fetch_page_write(page_id)?);
            for slot in slots {
                if block.insert(slot, key, value) {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Collect every value stored under `key`. The probe stops at the first
    /// bucket that was never occupied.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        let header = HashHeaderPage::from_data(self.buffer_pool.fetch_page(self.header_page_id)?);
        let mut values = Vec::new();

        for (block_index, slots) in self.probe_runs(key, header.num_buckets()) {
            let page_id = Self::block_page_id(&header, block_index)?;
            let block = HashBlockPage::<_, K, V>::new(self.buffer_pool.fetch_page(page_id)?);
            for slot in slots {
                if !block.is_occupied(slot) {
                    return Ok(values);
                }
                if block.is_readable(slot) && block.key_at(slot) == *key {
                    values.push(block.value_at(slot));
                }
            }
        }

        Ok(values)
    }

    /// The probe sequence for `key` is one lap around the table, starting at
    /// its home bucket. It is returned as runs of consecutive slots, one run
    /// per block page visited.
    fn probe_runs(&self, key: &K, num_buckets: usize) -> Vec<(usize, Range<usize>)> {
        let slots_per_block = block_slots::<K, V>();
        let start = ((self.hash_fn)(key) % num_buckets as u64) as usize;

        let mut runs = Vec::new();
        for (lo, hi) in [(start, num_buckets), (0, start)] {
            let mut bucket = lo;
            while bucket < hi {
                let block_index = bucket / slots_per_block;
                let block_start = block_index * slots_per_block;
                let run_end = (block_start + slots_per_block).min(hi);
                runs.push((block_index, bucket - block_start..run_end - block_start));
                bucket = run_end;
            }
        }
        runs
    }

    fn block_page_id(header: &HashHeaderPage<PageReadGuard>, block_index: usize) -> Result<PageId> {
        match header.block_page_id(block_index) {
            Some(page_id) => Ok(page_id),
            None => bail!(StorageError::PageLayout(format!(
                "block {} missing from hash header {}",
                block_index,
                header.page_id()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferPoolConfig;
    use crate::storage::disk::PageManager;
    use tempfile::{tempdir, TempDir};

    fn create_test_buffer_pool(pool_size: usize) -> Result<(TempDir, BufferPoolManager)> {
        let dir = tempdir()?;
        let page_manager = PageManager::create(&dir.path().join("hash.db"))?;
        let config = BufferPoolConfig { pool_size };
        Ok((dir, BufferPoolManager::with_config(page_manager, &config)))
    }

    fn identity(key: &u64) -> u64 {
        *key
    }

    fn constant(_: &u64) -> u64 {
        7
    }

    #[test]
    fn test_insert_and_get() -> Result<()> {
        let (_dir, buffer_pool) = create_test_buffer_pool(8)?;
        let table = LinearProbeHashTable::<u64, u64>::new(buffer_pool, 2048)?;
        assert_eq!(table.num_buckets()?, 2048);

        for key in 0..1000u64 {
            assert!(table.insert(&key, &(key * 2))?);
        }
        for key in 0..1000u64 {
            assert_eq!(table.get_value(&key)?, vec![key * 2]);
        }
        assert!(table.get_value(&5000)?.is_empty());

        Ok(())
    }

    #[test]
    fn test_duplicate_keys() -> Result<()> {
        let (_dir, buffer_pool) = create_test_buffer_pool(4)?;
        let table = LinearProbeHashTable::<i32, i64>::new(buffer_pool, 64)?;

        assert!(table.insert(&5, &1)?);
        assert!(table.insert(&5, &2)?);
        assert!(table.insert(&6, &3)?);

        assert_eq!(table.get_value(&5)?, vec![1, 2]);
        assert_eq!(table.get_value(&6)?, vec![3]);

        Ok(())
    }

    #[test]
    fn test_collisions_wrap_around() -> Result<()> {
        let (_dir, buffer_pool) = create_test_buffer_pool(4)?;
        let table = LinearProbeHashTable::<u64, u64>::with_hasher(buffer_pool, 10, constant)?;

        // Home bucket 7; the probe runs 7, 8, 9, 0, 1
        for key in 1..=5u64 {
            assert!(table.insert(&key, &(key + 100))?);
        }
        for key in 1..=5u64 {
            assert_eq!(table.get_value(&key)?, vec![key + 100]);
        }

        Ok(())
    }

    #[test]
    fn test_table_full() -> Result<()> {
        let (_dir, buffer_pool) = create_test_buffer_pool(4)?;
        let table = LinearProbeHashTable::<u64, u64>::with_hasher(buffer_pool, 4, constant)?;

        for key in 0..4u64 {
            assert!(table.insert(&key, &key)?);
        }
        assert!(!table.insert(&99, &99)?);

        // Lookups on a full table terminate after one lap
        assert_eq!(table.get_value(&3)?, vec![3]);
        assert!(table.get_value(&99)?.is_empty());

        Ok(())
    }

    #[test]
    fn test_probe_crosses_block_boundary() -> Result<()> {
        let slots = block_slots::<u64, u64>();
        let (_dir, buffer_pool) = create_test_buffer_pool(4)?;
        let table =
            LinearProbeHashTable::<u64, u64>::with_hasher(buffer_pool, 2 * slots + 7, identity)?;

        let boundary = slots as u64 - 1;
        let later = slots as u64;
        assert!(table.insert(&boundary, &1)?);
        assert!(table.insert(&boundary, &2)?);
        assert!(table.insert(&boundary, &3)?);
        // Home bucket of `later` is already taken by the overflow above
        assert!(table.insert(&later, &4)?);

        assert_eq!(table.get_value(&boundary)?, vec![1, 2, 3]);
        assert_eq!(table.get_value(&later)?, vec![4]);

        Ok(())
    }

    #[test]
    fn test_probe_runs() -> Result<()> {
        let slots = block_slots::<u64, u64>();
        let (_dir, buffer_pool) = create_test_buffer_pool(4)?;
        let table =
            LinearProbeHashTable::<u64, u64>::with_hasher(buffer_pool, slots + 10, identity)?;

        assert_eq!(
            table.probe_runs(&(slots as u64 - 2), slots + 10),
            vec![(0, slots - 2..slots), (1, 0..10), (0, 0..slots - 2)]
        );
        assert_eq!(table.probe_runs(&0, slots + 10), vec![(0, 0..slots), (1, 0..10)]);

        Ok(())
    }

    #[test]
    fn test_small_pool_evicts_blocks() -> Result<()> {
        let (_dir, buffer_pool) = create_test_buffer_pool(3)?;
        let num_buckets = block_slots::<u64, u64>() * 8;
        let table =
            LinearProbeHashTable::<u64, u64>::new(buffer_pool.clone(), num_buckets)?;

        for key in 0..2000u64 {
            assert!(table.insert(&key, &(key ^ 0xff))?);
        }
        for key in (0..2000u64).rev() {
            assert_eq!(table.get_value(&key)?, vec![key ^ 0xff]);
        }
        // Nothing is left pinned between operations
        assert_eq!(buffer_pool.evictable_frames(), 3);

        Ok(())
    }

    #[test]
    fn test_reopen() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("hash.db");
        let config = BufferPoolConfig { pool_size: 4 };

        let header_page_id = {
            let buffer_pool =
                BufferPoolManager::with_config(PageManager::create(&file_path)?, &config);
            let table = LinearProbeHashTable::<i64, u32>::new(buffer_pool.clone(), 100)?;
            for key in -20..20i64 {
                table.insert(&key, &((key + 20) as u32))?;
            }
            buffer_pool.flush_all()?;
            table.header_page_id()
        };

        let buffer_pool = BufferPoolManager::with_config(PageManager::open(&file_path)?, &config);
        let table = LinearProbeHashTable::<i64, u32>::open(buffer_pool, header_page_id)?;
        assert_eq!(table.num_buckets()?, 100);
        for key in -20..20i64 {
            assert_eq!(table.get_value(&key)?, vec![(key + 20) as u32]);
        }

        Ok(())
    }

    #[test]
    fn test_open_rejects_non_header() -> Result<()> {
        let (_dir, buffer_pool) = create_test_buffer_pool(4)?;
        let (page_id, guard) = buffer_pool.new_page()?;
        drop(guard);

        let result = LinearProbeHashTable::<u64, u64>::open(buffer_pool, page_id);
        assert!(result.is_err());

        Ok(())
    }

    #[test]
    fn test_zero_buckets() -> Result<()> {
        let (_dir, buffer_pool) = create_test_buffer_pool(4)?;
        assert!(LinearProbeHashTable::<u64, u64>::new(buffer_pool, 0).is_err());

        Ok(())
    }
}
