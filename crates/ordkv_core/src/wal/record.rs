//! WAL record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;

/// Magic bytes identifying a WAL record.
pub const WAL_MAGIC: [u8; 4] = *b"KWAL";

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// Type of WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// Upsert of one key.
    Set = 1,
    /// Removal of one key.
    Delete = 2,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Set),
            2 => Some(Self::Delete),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A logical mutation recorded in the WAL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// `key` now maps to `value`.
    Set {
        /// Sequence number of the mutation.
        seq: SequenceNumber,
        /// The key.
        key: Vec<u8>,
        /// The new value.
        value: Vec<u8>,
    },

    /// `key` no longer exists.
    Delete {
        /// Sequence number of the mutation.
        seq: SequenceNumber,
        /// The key.
        key: Vec<u8>,
    },
}

impl WalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Set { .. } => WalRecordType::Set,
            Self::Delete { .. } => WalRecordType::Delete,
        }
    }

    /// Returns the sequence number of the mutation.
    #[must_use]
    pub fn seq(&self) -> SequenceNumber {
        match self {
            Self::Set { seq, .. } | Self::Delete { seq, .. } => *seq,
        }
    }

    /// Returns the key the mutation applies to.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Set { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// Layout: `seq u64 | key_len u32 | key` followed, for `Set`, by
    /// `value_len u32 | value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or value does not fit a 4-byte length.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let (seq, key, value) = match self {
            Self::Set { seq, key, value } => (*seq, key, Some(value)),
            Self::Delete { seq, key } => (*seq, key, None),
        };

        let mut buf = Vec::with_capacity(16 + key.len() + value.map_or(0, Vec::len));
        buf.extend_from_slice(&seq.as_u64().to_le_bytes());
        put_len_prefixed(&mut buf, key, "key")?;
        if let Some(value) = value {
            put_len_prefixed(&mut buf, value, "value")?;
        }
        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut cursor = 0;

        let seq_bytes: [u8; 8] = take(payload, &mut cursor, 8)?
            .try_into()
            .map_err(|_| CoreError::wal_corruption("invalid u64"))?;
        let seq = SequenceNumber::new(u64::from_le_bytes(seq_bytes));
        let key = take_len_prefixed(payload, &mut cursor)?.to_vec();

        let record = match record_type {
            WalRecordType::Set => {
                let value = take_len_prefixed(payload, &mut cursor)?.to_vec();
                Self::Set { seq, key, value }
            }
            WalRecordType::Delete => Self::Delete { seq, key },
        };

        if cursor != payload.len() {
            return Err(CoreError::wal_corruption(format!(
                "trailing bytes in {:?} record: expected {} bytes, got {}",
                record_type,
                cursor,
                payload.len()
            )));
        }
        Ok(record)
    }
}

fn put_len_prefixed(buf: &mut Vec<u8>, data: &[u8], what: &str) -> CoreResult<()> {
    let len = u32::try_from(data.len()).map_err(|_| {
        CoreError::invalid_argument(format!(
            "{what} too large: {} bytes exceeds maximum of {} bytes",
            data.len(),
            u32::MAX
        ))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

fn take<'p>(payload: &'p [u8], cursor: &mut usize, n: usize) -> CoreResult<&'p [u8]> {
    let end = cursor
        .checked_add(n)
        .filter(|&end| end <= payload.len())
        .ok_or_else(|| CoreError::wal_corruption("unexpected end of payload"))?;
    let out = &payload[*cursor..end];
    *cursor = end;
    Ok(out)
}

fn take_len_prefixed<'p>(payload: &'p [u8], cursor: &mut usize) -> CoreResult<&'p [u8]> {
    let len_bytes: [u8; 4] = take(payload, cursor, 4)?
        .try_into()
        .map_err(|_| CoreError::wal_corruption("invalid u32"))?;
    take(payload, cursor, u32::from_le_bytes(len_bytes) as usize)
}

/// Computes the CRC32 (IEEE) checksum used by every on-disk structure.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_roundtrip() {
        for t in [WalRecordType::Set, WalRecordType::Delete] {
            assert_eq!(WalRecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(WalRecordType::from_byte(0), None);
        assert_eq!(WalRecordType::from_byte(3), None);
    }

    #[test]
    fn set_record_roundtrip() {
        let record = WalRecord::Set {
            seq: SequenceNumber::new(7),
            key: b"alpha".to_vec(),
            value: vec![0xCA, 0xFE],
        };
        let payload = record.encode_payload().unwrap();
        let decoded = WalRecord::decode_payload(WalRecordType::Set, &payload).unwrap();
        assert_eq!(record, decoded);
        assert_eq!(decoded.key(), b"alpha");
        assert_eq!(decoded.seq(), SequenceNumber::new(7));
    }

    #[test]
    fn empty_key_and_value_survive() {
        let record = WalRecord::Set {
            seq: SequenceNumber::new(1),
            key: Vec::new(),
            value: Vec::new(),
        };
        let payload = record.encode_payload().unwrap();
        assert_eq!(payload.len(), 16);
        let decoded = WalRecord::decode_payload(WalRecordType::Set, &payload).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn delete_record_roundtrip() {
        let record = WalRecord::Delete {
            seq: SequenceNumber::new(99),
            key: vec![0xFF; 3],
        };
        let payload = record.encode_payload().unwrap();
        let decoded = WalRecord::decode_payload(WalRecordType::Delete, &payload).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let record = WalRecord::Delete {
            seq: SequenceNumber::new(1),
            key: b"k".to_vec(),
        };
        let mut payload = record.encode_payload().unwrap();
        payload.push(0);
        let err = WalRecord::decode_payload(WalRecordType::Delete, &payload).unwrap_err();
        assert!(matches!(err, CoreError::WalCorruption { .. }));
    }

    #[test]
    fn short_payload_rejected() {
        let record = WalRecord::Set {
            seq: SequenceNumber::new(1),
            key: b"key".to_vec(),
            value: b"value".to_vec(),
        };
        let payload = record.encode_payload().unwrap();
        let err = WalRecord::decode_payload(WalRecordType::Set, &payload[..payload.len() - 2])
            .unwrap_err();
        assert!(matches!(err, CoreError::WalCorruption { .. }));
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
