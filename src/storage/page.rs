pub mod hash_block_page;
pub mod hash_header_page;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub use hash_block_page::{FixedCodec, HashBlockPage};
pub use hash_header_page::HashHeaderPage;
