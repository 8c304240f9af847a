//! WAL writer and reader.

use super::{CRC_SIZE, HEADER_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::wal::record::{compute_crc32, WalRecord, WAL_MAGIC, WAL_VERSION};
use ordkv_storage::StorageBackend;
use parking_lot::Mutex;
use std::sync::Arc;

/// Where an appended record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalPosition {
    /// Offset of the record's first byte.
    pub offset: u64,
    /// WAL size right after the append.
    pub end: u64,
}

impl WalPosition {
    /// Encoded size of the record.
    #[must_use]
    pub const fn len(self) -> u64 {
        self.end - self.offset
    }
}

/// Manages WAL writes and reads.
///
/// Appends are serialized by an internal mutex, so records from concurrent
/// writers never interleave.
pub struct WalManager {
    backend: Arc<Mutex<Box<dyn StorageBackend>>>,
    /// Whether to sync after each write.
    sync_on_write: bool,
}

impl WalManager {
    /// Creates a new WAL manager.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            sync_on_write,
        }
    }

    /// Appends a record to the WAL.
    ///
    /// With `sync_on_write` set, the record is on stable storage when this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or value exceeds 4 GiB or on I/O failure.
    pub fn append(&self, record: &WalRecord) -> CoreResult<WalPosition> {
        let data = encode_envelope(record)?;

        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;

        if self.sync_on_write {
            backend.flush()?;
            backend.sync()?;
        }

        Ok(WalPosition {
            offset,
            end: offset + data.len() as u64,
        })
    }

    /// Flushes and syncs everything appended so far.
    pub fn sync(&self) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.flush()?;
        backend.sync()?;
        Ok(())
    }

    /// Returns the current WAL size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Returns a streaming iterator over WAL records.
    ///
    /// The iterator holds the WAL lock; appends block until it is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be accessed.
    pub fn iter(&self) -> CoreResult<super::WalRecordIterator<'_>> {
        let backend = self.backend.lock();
        super::WalRecordIterator::new(backend, 0)
    }

    /// Iterates over records with a streaming callback.
    ///
    /// The callback returns `Ok(true)` to continue or `Ok(false)` to stop.
    /// Returns the offset just past the last complete record visited, which
    /// is below [`WalManager::size`] when the log ends in a torn record.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the callback returns an error.
    pub fn for_each_streaming<F>(&self, mut callback: F) -> CoreResult<u64>
    where
        F: FnMut(u64, WalRecord) -> CoreResult<bool>,
    {
        let mut iter = self.iter()?;
        while let Some(result) = iter.next() {
            let (offset, record) = result?;
            if !callback(offset, record)? {
                break;
            }
        }
        Ok(iter.valid_end())
    }

    /// Reads all records from the WAL.
    ///
    /// Prefer [`WalManager::iter`] for large logs.
    pub fn read_all(&self) -> CoreResult<Vec<(u64, WalRecord)>> {
        self.iter()?.collect()
    }

    /// Truncates the WAL to `offset` bytes.
    pub fn truncate(&self, offset: u64) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(offset)?;
        Ok(())
    }

    /// Clears the WAL and syncs the now-empty file.
    ///
    /// Used by checkpoint once every logged mutation is durable in the
    /// database file.
    pub fn clear(&self) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(0)?;
        backend.sync()?;
        Ok(())
    }

    /// Returns the backend so tests can simulate torn writes and bit rot.
    #[cfg(test)]
    pub(crate) fn backend_for_testing(&self) -> Arc<Mutex<Box<dyn StorageBackend>>> {
        Arc::clone(&self.backend)
    }
}

fn encode_envelope(record: &WalRecord) -> CoreResult<Vec<u8>> {
    let payload = record.encode_payload()?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_argument("WAL record payload too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&WAL_MAGIC);
    data.extend_from_slice(&WAL_VERSION.to_le_bytes());
    data.push(record.record_type().as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

impl std::fmt::Debug for WalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalManager")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SequenceNumber;
    use ordkv_storage::InMemoryBackend;

    fn create_wal() -> WalManager {
        WalManager::new(Box::new(InMemoryBackend::new()), false)
    }

    fn set(seq: u64, key: &[u8], value: &[u8]) -> WalRecord {
        WalRecord::Set {
            seq: SequenceNumber::new(seq),
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn append_and_read_set() {
        let wal = create_wal();
        let record = set(1, b"k", b"v");
        let pos = wal.append(&record).unwrap();
        assert_eq!(pos.offset, 0);
        assert_eq!(pos.end, wal.size().unwrap());
        assert_eq!(pos.len(), (HEADER_SIZE + 8 + 4 + 1 + 4 + 1 + CRC_SIZE) as u64);

        let records = wal.read_all().unwrap();
        assert_eq!(records, vec![(0, record)]);
    }

    #[test]
    fn append_multiple_records() {
        let wal = create_wal();
        let r1 = set(1, b"a", b"1");
        let r2 = WalRecord::Delete {
            seq: SequenceNumber::new(2),
            key: b"a".to_vec(),
        };
        let r3 = set(3, b"b", b"");

        let p1 = wal.append(&r1).unwrap();
        let p2 = wal.append(&r2).unwrap();
        let p3 = wal.append(&r3).unwrap();
        assert_eq!(p1.end, p2.offset);
        assert_eq!(p2.end, p3.offset);

        let records: Vec<_> = wal.read_all().unwrap().into_iter().map(|(_, r)| r).collect();
        assert_eq!(records, vec![r1, r2, r3]);
    }

    #[test]
    fn for_each_early_exit() {
        let wal = create_wal();
        for i in 0..10 {
            wal.append(&set(i, b"k", b"v")).unwrap();
        }

        let mut count = 0;
        wal.for_each_streaming(|_, _| {
            count += 1;
            Ok(count < 3)
        })
        .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn for_each_reports_valid_end_before_torn_tail() {
        let wal = create_wal();
        wal.append(&set(1, b"a", b"1")).unwrap();
        let good = wal.size().unwrap();
        {
            let backend = wal.backend_for_testing();
            backend.lock().append(&WAL_MAGIC).unwrap();
        }

        let mut seen = 0;
        let end = wal
            .for_each_streaming(|_, _| {
                seen += 1;
                Ok(true)
            })
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(end, good);
        assert_eq!(wal.size().unwrap(), good + 4);
    }

    #[test]
    fn clear_wal() {
        let wal = create_wal();
        wal.append(&set(1, b"a", b"1")).unwrap();
        wal.append(&set(2, b"b", b"2")).unwrap();
        assert_eq!(wal.read_all().unwrap().len(), 2);

        wal.clear().unwrap();
        assert_eq!(wal.size().unwrap(), 0);
        assert!(wal.read_all().unwrap().is_empty());
    }

    #[test]
    fn truncate_wal() {
        let wal = create_wal();
        let first = wal.append(&set(1, b"a", b"1")).unwrap();
        wal.append(&set(2, b"b", b"2")).unwrap();

        wal.truncate(first.end).unwrap();
        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, first.offset);
    }
}
