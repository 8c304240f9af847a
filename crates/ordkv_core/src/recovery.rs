//! Crash recovery.
//!
//! Opening a database rebuilds its state in two passes:
//!
//! 1. **Blocks.** Every used block is decoded into the index. A key found in
//!    more than one block (a crash between writing a replacement and freeing
//!    the original) keeps the copy with the highest sequence number; the
//!    others are freed. Blocks are rewritten in place without a sync, so a
//!    crash can leave a reused block half written. Such a block is freed if
//!    the WAL holds a `Set` of exactly its size, since that record rebuilds
//!    it in the next pass. Any other damaged block fails the open.
//! 2. **WAL.** Records are replayed in log order. A record is applied only if
//!    it is newer than the entry currently held for its key, so records whose
//!    effect already reached the file are skipped and replay is idempotent.
//!
//! The caller then checkpoints, leaving an empty WAL.

use crate::alloc::{BlockAllocator, ScanReport};
use crate::error::CoreResult;
use crate::store::{encoded_len, remove_entry, write_entry, EntryRecord, OrderedStore, Slot};
use crate::types::SequenceNumber;
use crate::wal::{WalManager, WalRecord};
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Summary of what recovery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryReport {
    /// Used blocks decoded from the database file.
    pub blocks_scanned: u64,
    /// Stale duplicate entries freed.
    pub duplicates_freed: u64,
    /// Half-written entry blocks freed and rebuilt from the WAL.
    pub damaged_blocks: u64,
    /// WAL records whose effect was applied.
    pub records_replayed: u64,
    /// WAL records already reflected in the file.
    pub records_skipped: u64,
    /// Bytes of a torn final block cut from the database file.
    pub torn_block_bytes: u64,
    /// Bytes of a torn final record cut from the WAL.
    pub torn_wal_bytes: u64,
}

/// Encoded entry sizes of the `Set` records in the WAL, with their counts.
pub(crate) fn logged_entry_sizes(wal: &WalManager) -> CoreResult<BTreeMap<usize, u64>> {
    let mut sizes = BTreeMap::new();
    wal.for_each_streaming(|_, record| {
        if let WalRecord::Set { key, value, .. } = &record {
            *sizes.entry(encoded_len(key.len(), value.len())).or_insert(0) += 1;
        }
        Ok(true)
    })?;
    Ok(sizes)
}

/// Loads the index from scanned blocks. Returns the highest sequence number
/// seen.
///
/// `logged` comes from [`logged_entry_sizes`]. Each damaged block consumes
/// one logged size equal to its payload length; a damaged block with no
/// such size left is returned as an error.
pub(crate) fn load_blocks(
    alloc: &mut BlockAllocator,
    scan: ScanReport,
    index: &OrderedStore,
    mut logged: BTreeMap<usize, u64>,
    report: &mut RecoveryReport,
) -> CoreResult<SequenceNumber> {
    report.torn_block_bytes = scan.torn_tail_bytes;
    let mut max_seq = SequenceNumber::new(0);

    for (handle, payload) in scan.used {
        let record = match EntryRecord::decode(&payload) {
            Ok(record) => record,
            Err(e) => {
                match logged.get_mut(&payload.len()) {
                    Some(count) if *count > 0 => *count -= 1,
                    _ => return Err(e),
                }
                warn!(block = %handle, error = %e, "freeing half-written entry block");
                alloc.free(handle)?;
                report.damaged_blocks += 1;
                continue;
            }
        };
        report.blocks_scanned += 1;
        max_seq = max_seq.max(record.seq);

        let key = Bytes::from(record.key);
        let stale = match index.get(&key) {
            Some(existing) if existing.seq >= record.seq => Some(handle),
            existing => {
                index.insert(
                    key,
                    Slot {
                        handle,
                        seq: record.seq,
                        value: Bytes::from(record.value),
                    },
                );
                existing.map(|e| e.handle)
            }
        };
        if let Some(stale) = stale {
            debug!(block = %stale, "freeing superseded duplicate entry");
            alloc.free(stale)?;
            report.duplicates_freed += 1;
        }
    }
    Ok(max_seq)
}

/// Replays the WAL on top of the loaded index. Returns the highest sequence
/// number seen, including `max_seq`.
pub(crate) fn replay_wal(
    alloc: &mut BlockAllocator,
    index: &OrderedStore,
    wal: &WalManager,
    report: &mut RecoveryReport,
    max_seq: SequenceNumber,
) -> CoreResult<SequenceNumber> {
    let mut max_seq = max_seq;

    let valid_end = wal.for_each_streaming(|_, record| {
        max_seq = max_seq.max(record.seq());
        let current = index.seq_of(record.key());
        let newer = current.map_or(true, |seq| record.seq() > seq);

        match record {
            WalRecord::Set { seq, key, value } if newer => {
                write_entry(alloc, index, seq, &key, Bytes::from(value))?;
                report.records_replayed += 1;
            }
            WalRecord::Delete { key, .. } if newer && current.is_some() => {
                remove_entry(alloc, index, &key)?;
                report.records_replayed += 1;
            }
            _ => report.records_skipped += 1,
        }
        Ok(true)
    })?;

    let size = wal.size()?;
    if valid_end < size {
        warn!(
            offset = valid_end,
            discarded = size - valid_end,
            "discarding torn record at end of WAL"
        );
        wal.truncate(valid_end)?;
        report.torn_wal_bytes = size - valid_end;
    }
    Ok(max_seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::encode_entry;
    use ordkv_storage::InMemoryBackend;

    fn set(seq: u64, key: &[u8], value: &[u8]) -> WalRecord {
        WalRecord::Set {
            seq: SequenceNumber::new(seq),
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    fn fresh() -> BlockAllocator {
        BlockAllocator::create(Box::new(InMemoryBackend::new())).unwrap()
    }

    #[test]
    fn duplicate_keys_keep_newest() {
        let mut alloc = fresh();
        let old = alloc
            .allocate(&encode_entry(SequenceNumber::new(3), b"k", b"old").unwrap())
            .unwrap();
        let new = alloc
            .allocate(&encode_entry(SequenceNumber::new(8), b"k", b"new").unwrap())
            .unwrap();
        let scan = ScanReport {
            used: vec![
                (new, alloc.read(new).unwrap()),
                (old, alloc.read(old).unwrap()),
            ],
            ..ScanReport::default()
        };

        let index = OrderedStore::new();
        let mut report = RecoveryReport::default();
        let max = load_blocks(&mut alloc, scan, &index, BTreeMap::new(), &mut report).unwrap();

        assert_eq!(max, SequenceNumber::new(8));
        assert_eq!(report.blocks_scanned, 2);
        assert_eq!(report.duplicates_freed, 1);
        assert_eq!(index.get(b"k").unwrap().value, &b"new"[..]);
        assert_eq!(alloc.stats().used_blocks, 1);
    }

    fn scan_with_torn_block(alloc: &mut BlockAllocator) -> (ScanReport, usize) {
        let good = alloc
            .allocate(&encode_entry(SequenceNumber::new(1), b"a", b"kept").unwrap())
            .unwrap();
        let mut torn = encode_entry(SequenceNumber::new(2), b"x", &[7u8; 40]).unwrap();
        let len = torn.len();
        let handle = alloc.allocate(&torn).unwrap();
        torn[20] ^= 0xff;
        let scan = ScanReport {
            used: vec![(good, alloc.read(good).unwrap()), (handle, torn)],
            ..ScanReport::default()
        };
        (scan, len)
    }

    #[test]
    fn damaged_block_covered_by_wal_is_freed() {
        let mut alloc = fresh();
        let (scan, len) = scan_with_torn_block(&mut alloc);

        let index = OrderedStore::new();
        let mut report = RecoveryReport::default();
        let logged = BTreeMap::from([(len, 1)]);
        let max = load_blocks(&mut alloc, scan, &index, logged, &mut report).unwrap();

        assert_eq!(max, SequenceNumber::new(1));
        assert_eq!(report.blocks_scanned, 1);
        assert_eq!(report.damaged_blocks, 1);
        assert_eq!(index.len(), 1);
        assert_eq!(alloc.stats().used_blocks, 1);
    }

    #[test]
    fn damaged_block_without_wal_record_is_fatal() {
        let mut alloc = fresh();
        let (scan, len) = scan_with_torn_block(&mut alloc);
        let err = load_blocks(
            &mut alloc,
            scan,
            &OrderedStore::new(),
            BTreeMap::from([(len + 1, 3)]),
            &mut RecoveryReport::default(),
        )
        .unwrap_err();
        assert!(err.is_corruption(), "{err}");
    }

    #[test]
    fn logged_sizes_count_sets_only() {
        let wal = WalManager::new(Box::new(InMemoryBackend::new()), false);
        wal.append(&set(1, b"a", b"12")).unwrap();
        wal.append(&set(2, b"b", b"34")).unwrap();
        wal.append(&set(3, b"cc", b"")).unwrap();
        wal.append(&WalRecord::Delete {
            seq: SequenceNumber::new(4),
            key: b"a".to_vec(),
        })
        .unwrap();

        let sizes = logged_entry_sizes(&wal).unwrap();
        assert_eq!(sizes.get(&encoded_len(1, 2)), Some(&2));
        assert_eq!(sizes.get(&encoded_len(2, 0)), Some(&1));
        assert_eq!(sizes.len(), 2);
    }

    #[test]
    fn replay_skips_records_already_on_disk() {
        let mut alloc = fresh();
        let index = OrderedStore::new();
        write_entry(&mut alloc, &index, SequenceNumber::new(5), b"a", Bytes::from_static(b"disk"))
            .unwrap();

        let wal = WalManager::new(Box::new(InMemoryBackend::new()), false);
        wal.append(&set(4, b"a", b"older")).unwrap();
        wal.append(&set(6, b"b", b"fresh")).unwrap();
        wal.append(&WalRecord::Delete {
            seq: SequenceNumber::new(7),
            key: b"a".to_vec(),
        })
        .unwrap();
        wal.append(&WalRecord::Delete {
            seq: SequenceNumber::new(9),
            key: b"never".to_vec(),
        })
        .unwrap();

        let mut report = RecoveryReport::default();
        let max = replay_wal(&mut alloc, &index, &wal, &mut report, SequenceNumber::new(5)).unwrap();

        assert_eq!(max, SequenceNumber::new(9));
        assert_eq!(report.records_replayed, 2);
        assert_eq!(report.records_skipped, 2);
        assert!(index.get(b"a").is_none());
        assert_eq!(index.get(b"b").unwrap().value, &b"fresh"[..]);
    }

    #[test]
    fn replay_twice_is_idempotent() {
        let mut alloc = fresh();
        let index = OrderedStore::new();
        let wal = WalManager::new(Box::new(InMemoryBackend::new()), false);
        for i in 1..=5u64 {
            wal.append(&set(i, &[i as u8], b"v")).unwrap();
        }

        let mut first = RecoveryReport::default();
        replay_wal(&mut alloc, &index, &wal, &mut first, SequenceNumber::new(0)).unwrap();
        let stats = alloc.stats();

        let mut second = RecoveryReport::default();
        replay_wal(&mut alloc, &index, &wal, &mut second, SequenceNumber::new(0)).unwrap();
        assert_eq!(first.records_replayed, 5);
        assert_eq!(second.records_replayed, 0);
        assert_eq!(second.records_skipped, 5);
        assert_eq!(alloc.stats(), stats);
    }

    #[test]
    fn torn_wal_tail_is_truncated() {
        let mut alloc = fresh();
        let index = OrderedStore::new();
        let wal = WalManager::new(Box::new(InMemoryBackend::new()), false);
        let good = wal.append(&set(1, b"a", b"1")).unwrap();
        wal.append(&set(2, b"b", b"2")).unwrap();
        wal.truncate(good.end + 5).unwrap();

        let mut report = RecoveryReport::default();
        replay_wal(&mut alloc, &index, &wal, &mut report, SequenceNumber::new(0)).unwrap();
        assert_eq!(report.torn_wal_bytes, 5);
        assert_eq!(wal.size().unwrap(), good.end);
        assert_eq!(index.len(), 1);
    }
}
