//! Block page of the linear-probe hash table.
//!
//! Layout, with `n = block_slots::<K, V>()` and `b = ceil(n / 8)`:
//!
//! ```text
//! | occupied bitmap (b) | readable bitmap (b) | n x (key | value) |
//! ```
//!
//! A slot is occupied once anything has been written to it. Readable marks
//! a live entry.

use crate::storage::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Fixed-width little-endian encoding for keys and values stored in pages.
pub trait FixedCodec: Sized {
    const SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! impl_fixed_codec {
    ($ty:ty, $write:ident, $read:ident) => {
        impl FixedCodec for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn encode(&self, buf: &mut [u8]) {
                LittleEndian::$write(buf, *self)
            }

            fn decode(buf: &[u8]) -> Self {
                LittleEndian::$read(buf)
            }
        }
    };
}

impl_fixed_codec!(i32, write_i32, read_i32);
impl_fixed_codec!(u32, write_u32, read_u32);
impl_fixed_codec!(i64, write_i64, read_i64);
impl_fixed_codec!(u64, write_u64, read_u64);

/// Number of (key, value) slots that fit in one block page.
pub fn block_slots<K: FixedCodec, V: FixedCodec>() -> usize {
    // Two bits of bitmap per slot, plus up to two bytes of bitmap rounding
    (8 * (PAGE_SIZE - 2)) / (8 * (K::SIZE + V::SIZE) + 2)
}

pub struct HashBlockPage<T, K, V> {
    data: T,
    _marker: PhantomData<(K, V)>,
}

impl<T, K, V> HashBlockPage<T, K, V>
where
    T: Deref<Target = [u8; PAGE_SIZE]>,
    K: FixedCodec,
    V: FixedCodec,
{
    /// Wrap page data. A zeroed page is an empty block.
    pub fn new(data: T) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        block_slots::<K, V>()
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        self.bit(0, slot)
    }

    pub fn is_readable(&self, slot: usize) -> bool {
        self.bit(Self::bitmap_len(), slot)
    }

    pub fn key_at(&self, slot: usize) -> K {
        let offset = Self::entry_offset(slot);
        K::decode(&self.data[offset..offset + K::SIZE])
    }

    pub fn value_at(&self, slot: usize) -> V {
        let offset = Self::entry_offset(slot) + K::SIZE;
        V::decode(&self.data[offset..offset + V::SIZE])
    }

    fn bit(&self, base: usize, slot: usize) -> bool {
        debug_assert!(slot < self.capacity());
        self.data[base + slot / 8] & (1 << (slot % 8)) != 0
    }

    fn bitmap_len() -> usize {
        block_slots::<K, V>().div_ceil(8)
    }

    fn entry_offset(slot: usize) -> usize {
        2 * Self::bitmap_len() + slot * (K::SIZE + V::SIZE)
    }
}

impl<T, K, V> HashBlockPage<T, K, V>
where
    T: DerefMut<Target = [u8; PAGE_SIZE]>,
    K: FixedCodec,
    V: FixedCodec,
{
    /// Store an entry in `slot`. Returns false if the slot is already occupied.
    pub fn insert(&mut self, slot: usize, key: &K, value: &V) -> bool {
        if self.is_occupied(slot) {
            return false;
        }

        let offset = Self::entry_offset(slot);
        key.encode(&mut self.data[offset..offset + K::SIZE]);
        value.encode(&mut self.data[offset + K::SIZE..offset + K::SIZE + V::SIZE]);

        self.set_bit(0, slot);
        self.set_bit(Self::bitmap_len(), slot);
        true
    }

    fn set_bit(&mut self, base: usize, slot: usize) {
        self.data[base + slot / 8] |= 1 << (slot % 8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_fits_in_page() {
        for (slots, entry) in [
            (block_slots::<u64, u64>(), 16),
            (block_slots::<i32, i32>(), 8),
            (block_slots::<i32, u64>(), 12),
        ] {
            let bitmaps = 2 * slots.div_ceil(8);
            assert!(bitmaps + slots * entry <= PAGE_SIZE);
            // One more slot would not fit
            let bitmaps = 2 * (slots + 1).div_ceil(8);
            assert!(bitmaps + (slots + 1) * entry > PAGE_SIZE - 2);
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        let mut block = HashBlockPage::<_, i64, u32>::new(&mut *data);

        assert!(!block.is_occupied(0));
        assert!(block.insert(0, &-7, &11));
        assert!(block.insert(9, &42, &99));

        assert!(block.is_occupied(0));
        assert!(block.is_readable(0));
        assert_eq!(block.key_at(0), -7);
        assert_eq!(block.value_at(0), 11);
        assert_eq!(block.key_at(9), 42);
        assert_eq!(block.value_at(9), 99);
        assert!(!block.is_occupied(1));
    }

    #[test]
    fn test_insert_into_occupied_slot() {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        let mut block = HashBlockPage::<_, u64, u64>::new(&mut *data);

        assert!(block.insert(3, &1, &1));
        assert!(!block.insert(3, &2, &2));
        assert_eq!(block.key_at(3), 1);
    }

    #[test]
    fn test_last_slot() {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        let last = block_slots::<u64, u64>() - 1;
        {
            let mut block = HashBlockPage::<_, u64, u64>::new(&mut *data);
            assert!(block.insert(last, &u64::MAX, &5));
        }

        let block = HashBlockPage::<_, u64, u64>::new(&*data);
        assert!(block.is_readable(last));
        assert_eq!(block.key_at(last), u64::MAX);
        assert_eq!(block.value_at(last), 5);
    }
}
