//! Applying mutations to blocks and index together.
//!
//! Both the live write path and WAL replay go through these two functions,
//! so a replayed mutation leaves exactly the state the original one did.
//! Callers hold the allocator lock and, for live writes, the key's lock.

use super::{encode_entry, OrderedStore, Slot};
use crate::alloc::BlockAllocator;
use crate::error::CoreResult;
use crate::types::SequenceNumber;
use bytes::Bytes;

/// Writes `key = value` at `seq`, replacing any previous entry.
///
/// The new block is written before the index points at it and the old
/// block is freed only afterwards, so a crash at any step leaves at least
/// one complete copy of the entry on disk.
pub(crate) fn write_entry(
    alloc: &mut BlockAllocator,
    index: &OrderedStore,
    seq: SequenceNumber,
    key: &[u8],
    value: Bytes,
) -> CoreResult<()> {
    let payload = encode_entry(seq, key, &value)?;
    let handle = alloc.allocate(&payload)?;
    let old = index.insert(Bytes::copy_from_slice(key), Slot { handle, seq, value });
    if let Some(old) = old {
        alloc.free(old.handle)?;
    }
    Ok(())
}

/// Removes `key`, returning the slot it had.
pub(crate) fn remove_entry(
    alloc: &mut BlockAllocator,
    index: &OrderedStore,
    key: &[u8],
) -> CoreResult<Option<Slot>> {
    let Some(old) = index.remove(key) else {
        return Ok(None);
    };
    alloc.free(old.handle)?;
    Ok(Some(old))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::FILE_HEADER_SIZE;
    use ordkv_storage::InMemoryBackend;

    #[test]
    fn overwrite_frees_previous_block() {
        let mut alloc = BlockAllocator::create(Box::new(InMemoryBackend::new())).unwrap();
        let index = OrderedStore::new();

        write_entry(&mut alloc, &index, SequenceNumber::new(1), b"k", Bytes::from_static(b"v1"))
            .unwrap();
        write_entry(&mut alloc, &index, SequenceNumber::new(2), b"k", Bytes::from_static(b"v2"))
            .unwrap();

        let stats = alloc.stats();
        assert_eq!(stats.used_blocks, 1);
        let slot = index.get(b"k").unwrap();
        assert_eq!(slot.value, &b"v2"[..]);
        let stored = crate::store::EntryRecord::decode(&alloc.read(slot.handle).unwrap()).unwrap();
        assert_eq!(stored.seq, SequenceNumber::new(2));
        assert_eq!(stored.value, b"v2");
    }

    #[test]
    fn remove_reclaims_space() {
        let mut alloc = BlockAllocator::create(Box::new(InMemoryBackend::new())).unwrap();
        let index = OrderedStore::new();
        write_entry(&mut alloc, &index, SequenceNumber::new(1), b"k", Bytes::from_static(b"v"))
            .unwrap();

        assert!(remove_entry(&mut alloc, &index, b"k").unwrap().is_some());
        assert!(remove_entry(&mut alloc, &index, b"k").unwrap().is_none());
        assert_eq!(alloc.size(), FILE_HEADER_SIZE);
        assert!(index.is_empty());
    }
}
