//! Block allocator over a storage backend.
//!
//! The database file is a fixed header followed by a chain of blocks that
//! covers the rest of the file exactly:
//!
//! ```text
//! | header (144) | block | block | ... | block |  <- EOF
//! ```
//!
//! Every block is a multiple of [`ATOM`] bytes and starts with a
//! [`BlockHeader`]. The ordered store addresses entries only through
//! [`BlockHandle`](crate::types::BlockHandle)s handed out here; it never sees
//! raw offsets.
//!
//! ## Invariants
//!
//! - The chain starts right after the file header and ends exactly at EOF
//! - No two adjacent blocks are both free
//! - The last block is never free: freeing it shrinks the file instead, so a
//!   database whose entries are all gone is back to [`FILE_HEADER_SIZE`]

mod allocator;
mod block;
mod header;

pub use allocator::{AllocStats, BlockAllocator, ScanReport};
pub use block::{BlockHeader, BlockTag};
pub use header::{FileHeader, FILE_HEADER_SIZE, FILE_MAGIC, FORMAT_VERSION};

/// Allocation granularity.
pub const ATOM: u64 = 16;

/// Size of the header in front of every block.
pub const BLOCK_HEADER_SIZE: u64 = 16;

/// Largest block the 4-byte size field can describe.
pub const MAX_BLOCK_SIZE: u64 = u32::MAX as u64 & !(ATOM - 1);

/// Rounds `n` up to a whole number of atoms.
#[must_use]
pub const fn round_up(n: u64) -> u64 {
    (n + ATOM - 1) & !(ATOM - 1)
}
