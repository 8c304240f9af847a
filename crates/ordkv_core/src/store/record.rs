//! Entry record codec.
//!
//! ```text
//! | seq (8) | key_len (4) | value_len (4) | key | value | crc32 (4) |
//! ```
//!
//! One record is the payload of one used block. The CRC covers every byte
//! before it.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use crate::wal::compute_crc32;

const FIXED_LEN: usize = 8 + 4 + 4;
const CRC_LEN: usize = 4;

/// A decoded entry record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    /// Sequence number of the mutation that wrote the entry.
    pub seq: SequenceNumber,
    /// The key.
    pub key: Vec<u8>,
    /// The value.
    pub value: Vec<u8>,
}

/// Encoded size of a record with the given key and value lengths.
pub(crate) const fn encoded_len(key_len: usize, value_len: usize) -> usize {
    FIXED_LEN + key_len + value_len + CRC_LEN
}

/// Encodes an entry record from borrowed parts.
///
/// # Errors
///
/// Returns `InvalidArgument` if the key or value length does not fit 32 bits.
pub fn encode_entry(seq: SequenceNumber, key: &[u8], value: &[u8]) -> CoreResult<Vec<u8>> {
    let key_len = u32::try_from(key.len())
        .map_err(|_| CoreError::invalid_argument(format!("key of {} bytes is too large", key.len())))?;
    let value_len = u32::try_from(value.len()).map_err(|_| {
        CoreError::invalid_argument(format!("value of {} bytes is too large", value.len()))
    })?;

    let mut buf = Vec::with_capacity(FIXED_LEN + key.len() + value.len() + CRC_LEN);
    buf.extend_from_slice(&seq.as_u64().to_le_bytes());
    buf.extend_from_slice(&key_len.to_le_bytes());
    buf.extend_from_slice(&value_len.to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

impl EntryRecord {
    /// Encodes the record.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        encode_entry(self.seq, &self.key, &self.value)
    }

    /// Decodes and checks a record.
    ///
    /// # Errors
    ///
    /// `ChecksumMismatch` if the CRC fails, `Corruption` if the lengths do
    /// not add up to the payload size.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < FIXED_LEN + CRC_LEN {
            return Err(CoreError::corruption(format!(
                "entry record too short: {} bytes",
                bytes.len()
            )));
        }
        let body_end = bytes.len() - CRC_LEN;
        let stored = u32::from_le_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        let computed = compute_crc32(&bytes[..body_end]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let seq = u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]);
        let key_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let value_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;

        if FIXED_LEN + key_len + value_len != body_end {
            return Err(CoreError::corruption(format!(
                "entry record lengths {key_len}+{value_len} do not match payload of {} bytes",
                bytes.len()
            )));
        }
        let key_end = FIXED_LEN + key_len;
        Ok(Self {
            seq: SequenceNumber::new(seq),
            key: bytes[FIXED_LEN..key_end].to_vec(),
            value: bytes[key_end..body_end].to_vec(),
        })
    }
}
