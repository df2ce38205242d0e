//! Tunables for the buffer pool and the hash table built on it.

#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    /// Number of in-memory frames, which is also the clock replacer's capacity.
    pub pool_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        BufferPoolConfig { pool_size: 64 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HashTableConfig {
    /// Logical bucket count; fixed for the lifetime of the table.
    pub num_buckets: usize,
}

impl Default for HashTableConfig {
    fn default() -> Self {
        HashTableConfig { num_buckets: 1024 }
    }
}
