//! Block header codec.

use super::{ATOM, BLOCK_HEADER_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::wal::compute_crc32;

/// Whether a block holds an entry or is free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockTag {
    /// Holds one entry record.
    Used = 1,
    /// Reusable space.
    Free = 2,
}

impl BlockTag {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Used),
            2 => Some(Self::Free),
            _ => None,
        }
    }
}

/// The 16-byte header in front of every block.
///
/// ```text
/// | tag (1) | reserved (3) | block size (4) | payload length (4) | crc32 (4) |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Used or free.
    pub tag: BlockTag,
    /// Total block size including this header; a multiple of [`ATOM`].
    pub size: u32,
    /// Payload bytes actually in use; zero for free blocks.
    pub payload_len: u32,
}

impl BlockHeader {
    /// Header for a used block holding `payload_len` bytes.
    pub(crate) const fn used(size: u32, payload_len: u32) -> Self {
        Self {
            tag: BlockTag::Used,
            size,
            payload_len,
        }
    }

    /// Header for a free block of `size` bytes.
    pub(crate) const fn free(size: u32) -> Self {
        Self {
            tag: BlockTag::Free,
            size,
            payload_len: 0,
        }
    }

    /// Returns true for free blocks.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.tag == BlockTag::Free
    }

    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; BLOCK_HEADER_SIZE as usize] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE as usize];
        buf[0] = self.tag as u8;
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        let crc = compute_crc32(&buf[..12]);
        buf[12..16].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes a header read from `offset`.
    ///
    /// # Errors
    ///
    /// `ChecksumMismatch` if the CRC fails, `Corruption` if the fields are
    /// inconsistent.
    pub fn decode(bytes: &[u8], offset: u64) -> CoreResult<Self> {
        if bytes.len() < BLOCK_HEADER_SIZE as usize {
            return Err(CoreError::corruption(format!(
                "short block header at {offset:#x}"
            )));
        }
        let stored = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let computed = compute_crc32(&bytes[..12]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let tag = BlockTag::from_byte(bytes[0]).ok_or_else(|| {
            CoreError::corruption(format!("unknown block tag {} at {offset:#x}", bytes[0]))
        })?;
        let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let payload_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        if size == 0 || u64::from(size) % ATOM != 0 {
            return Err(CoreError::corruption(format!(
                "block at {offset:#x} has invalid size {size}"
            )));
        }
        if u64::from(payload_len) + BLOCK_HEADER_SIZE > u64::from(size) {
            return Err(CoreError::corruption(format!(
                "block at {offset:#x} payload {payload_len} overflows size {size}"
            )));
        }
        if tag == BlockTag::Free && payload_len != 0 {
            return Err(CoreError::corruption(format!(
                "free block at {offset:#x} claims payload {payload_len}"
            )));
        }
        Ok(Self {
            tag,
            size,
            payload_len,
        })
    }
}
