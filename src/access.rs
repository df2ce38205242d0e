//! Access methods built on the buffer pool.
//!
//! - **LinearProbeHashTable**: Disk-resident open-addressing hash index

pub mod hash_table;

pub use hash_table::LinearProbeHashTable;
