//! Sorted key index.

use crate::types::{BlockHandle, SequenceNumber};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Where an entry lives and what it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Block holding the entry record.
    pub handle: BlockHandle,
    /// Sequence number of the write that produced the entry.
    pub seq: SequenceNumber,
    /// Cached value.
    pub value: Bytes,
}

/// Byte-ordered map from key to [`Slot`].
///
/// Readers share the lock; a writer holds it only for the instant it swaps
/// one slot, so a reader sees either the old or the new entry for a key,
/// never a mix.
#[derive(Debug, Default)]
pub struct OrderedStore {
    map: RwLock<BTreeMap<Bytes, Slot>>,
}

impl OrderedStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Slot> {
        self.map.read().get(key).cloned()
    }

    /// Returns the sequence number of the entry for `key`.
    #[must_use]
    pub fn seq_of(&self, key: &[u8]) -> Option<SequenceNumber> {
        self.map.read().get(key).map(|s| s.seq)
    }

    /// Inserts or replaces the slot for `key`, returning the old one.
    pub fn insert(&self, key: Bytes, slot: Slot) -> Option<Slot> {
        self.map.write().insert(key, slot)
    }

    /// Removes `key`, returning its slot.
    pub fn remove(&self, key: &[u8]) -> Option<Slot> {
        self.map.write().remove(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// True if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Smallest entry.
    #[must_use]
    pub fn first(&self) -> Option<(Bytes, Bytes)> {
        self.map
            .read()
            .iter()
            .next()
            .map(|(k, s)| (k.clone(), s.value.clone()))
    }

    /// Largest entry.
    #[must_use]
    pub fn last(&self) -> Option<(Bytes, Bytes)> {
        self.map
            .read()
            .iter()
            .next_back()
            .map(|(k, s)| (k.clone(), s.value.clone()))
    }

    /// Smallest entry whose key lies above `lower`.
    #[must_use]
    pub fn ceiling(&self, lower: Bound<&[u8]>) -> Option<(Bytes, Bytes)> {
        self.map
            .read()
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, s)| (k.clone(), s.value.clone()))
    }

    /// Largest entry whose key lies below `upper`.
    #[must_use]
    pub fn floor(&self, upper: Bound<&[u8]>) -> Option<(Bytes, Bytes)> {
        self.map
            .read()
            .range::<[u8], _>((Bound::Unbounded, upper))
            .next_back()
            .map(|(k, s)| (k.clone(), s.value.clone()))
    }

    /// Copies out every entry in key order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Bytes, Slot)> {
        self.map
            .read()
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.map.write().clear();
    }
}
