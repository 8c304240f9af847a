//! Database file header.
//!
//! ```text
//! | magic (8) | version (2) | reserved (2) | atom (4) | header size (4) | zero padding | crc32 (4) |
//! ```
//!
//! The header is exactly [`FILE_HEADER_SIZE`] bytes, which is also the size
//! of an empty database.

use super::ATOM;
use crate::error::{CoreError, CoreResult};
use crate::wal::compute_crc32;

/// Magic bytes at the start of every database file.
pub const FILE_MAGIC: [u8; 8] = *b"ORDKV\0\0\x01";

/// Current database file format version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the file header, and of an empty database.
pub const FILE_HEADER_SIZE: u64 = 144;

const CRC_OFFSET: usize = FILE_HEADER_SIZE as usize - 4;

/// Decoded database file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version that wrote the file.
    pub version: u16,
    /// Allocation granularity in bytes.
    pub atom: u32,
    /// Header size in bytes.
    pub header_size: u32,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            atom: ATOM as u32,
            header_size: FILE_HEADER_SIZE as u32,
        }
    }
}

impl FileHeader {
    /// Encodes the header into its fixed-size on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE as usize] {
        let mut buf = [0u8; FILE_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&FILE_MAGIC);
        buf[8..10].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.atom.to_le_bytes());
        buf[16..20].copy_from_slice(&self.header_size.to_le_bytes());
        let crc = compute_crc32(&buf[..CRC_OFFSET]);
        buf[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes and validates a header.
    ///
    /// # Errors
    ///
    /// `InvalidFormat` if the bytes are not an ordkv header (wrong magic, too
    /// short, unsupported version or geometry), `ChecksumMismatch` if the
    /// header was damaged.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < FILE_HEADER_SIZE as usize {
            return Err(CoreError::invalid_format(format!(
                "file too short for header: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..8] != FILE_MAGIC {
            return Err(CoreError::invalid_format("bad magic, not an ordkv database"));
        }

        let stored = u32::from_le_bytes([
            bytes[CRC_OFFSET],
            bytes[CRC_OFFSET + 1],
            bytes[CRC_OFFSET + 2],
            bytes[CRC_OFFSET + 3],
        ]);
        let computed = compute_crc32(&bytes[..CRC_OFFSET]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let header = Self {
            version: u16::from_le_bytes([bytes[8], bytes[9]]),
            atom: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            header_size: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        };

        if header.version > FORMAT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported format version {}",
                header.version
            )));
        }
        if u64::from(header.atom) != ATOM || u64::from(header.header_size) != FILE_HEADER_SIZE {
            return Err(CoreError::invalid_format(format!(
                "unsupported geometry: atom {}, header {}",
                header.atom, header.header_size
            )));
        }
        Ok(header)
    }
}
