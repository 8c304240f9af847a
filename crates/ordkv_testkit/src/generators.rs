//! Property-based test generators using proptest.
//!
//! Provides strategies for random keys, values and operation sequences,
//! plus a `BTreeMap` reference model to run them against.

use ordkv_core::{CoreResult, Database, PutAction};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for keys drawn from a small alphabet, so operations collide
/// often. Includes the empty key.
pub fn small_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..4, 0..4)
}

/// Strategy for arbitrary keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for values, including empty ones.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// One step of a generated workload.
#[derive(Debug, Clone)]
pub enum Operation {
    /// `set(key, value)`
    Set {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// `delete(key)`
    Delete {
        /// Key
        key: Vec<u8>,
    },
    /// `extract(key)`
    Extract {
        /// Key
        key: Vec<u8>,
    },
    /// `inc(key, delta)`
    Inc {
        /// Key
        key: Vec<u8>,
        /// Delta
        delta: i64,
    },
    /// `put` that appends `suffix` to the current value, or deletes the
    /// entry when `suffix` is empty.
    Append {
        /// Key
        key: Vec<u8>,
        /// Bytes to append
        suffix: Vec<u8>,
    },
    /// `checkpoint()`
    Checkpoint,
}

/// Strategy for a single operation over [`small_key_strategy`] keys.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        5 => (small_key_strategy(), value_strategy())
            .prop_map(|(key, value)| Operation::Set { key, value }),
        2 => small_key_strategy().prop_map(|key| Operation::Delete { key }),
        1 => small_key_strategy().prop_map(|key| Operation::Extract { key }),
        2 => (small_key_strategy(), -100i64..100)
            .prop_map(|(key, delta)| Operation::Inc { key, delta }),
        2 => (small_key_strategy(), prop::collection::vec(any::<u8>(), 0..8))
            .prop_map(|(key, suffix)| Operation::Append { key, suffix }),
        1 => Just(Operation::Checkpoint),
    ]
}

/// Strategy for a sequence of operations.
pub fn workload_strategy(max_len: usize) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(operation_strategy(), 1..max_len)
}

/// The reference model: what the database should contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in key order.
    pub fn entries(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.entries
    }

    /// Applies `op` to both the model and `db`, checking that every value
    /// the database reports agrees with the model.
    pub fn apply(&mut self, db: &Database, op: &Operation) -> CoreResult<()> {
        match op {
            Operation::Set { key, value } => {
                db.set(key, value)?;
                self.entries.insert(key.clone(), value.clone());
            }
            Operation::Delete { key } => {
                db.delete(key)?;
                self.entries.remove(key);
            }
            Operation::Extract { key } => {
                let got = db.extract(key)?;
                let want = self.entries.remove(key);
                assert_eq!(got.as_deref(), want.as_deref(), "extract {key:?}");
            }
            Operation::Inc { key, delta } => {
                let prior = self
                    .entries
                    .get(key)
                    .and_then(|v| <[u8; 8]>::try_from(v.as_slice()).ok())
                    .map_or(0, i64::from_be_bytes);
                let want = prior.wrapping_add(*delta);
                assert_eq!(db.inc(key, *delta)?, want, "inc {key:?}");
                self.entries.insert(key.clone(), want.to_be_bytes().to_vec());
            }
            Operation::Append { key, suffix } => {
                let outcome = db.put(key, |_, old| {
                    Ok(if suffix.is_empty() {
                        PutAction::Delete
                    } else {
                        let mut value = old.map(<[u8]>::to_vec).unwrap_or_default();
                        value.extend_from_slice(suffix);
                        PutAction::Write(value)
                    })
                })?;
                assert_eq!(
                    outcome.old.as_deref(),
                    self.entries.get(key).map(Vec::as_slice),
                    "put {key:?}"
                );
                if suffix.is_empty() {
                    self.entries.remove(key);
                } else {
                    self.entries.entry(key.clone()).or_default().extend_from_slice(suffix);
                }
            }
            Operation::Checkpoint => db.checkpoint()?,
        }
        Ok(())
    }

    /// Asserts that `db` holds exactly the model's entries, walking it
    /// forward and backward.
    pub fn assert_matches(&self, db: &Database) {
        let expected: Vec<(Vec<u8>, Vec<u8>)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(db.len().unwrap(), expected.len());

        let forward = collect(db, true);
        assert_eq!(forward, expected, "forward enumeration");

        let mut backward = collect(db, false);
        backward.reverse();
        assert_eq!(backward, expected, "backward enumeration");

        for (k, v) in &self.entries {
            assert_eq!(db.get(k).unwrap().as_deref(), Some(v.as_slice()));
        }
    }
}

fn collect(db: &Database, forward: bool) -> Vec<(Vec<u8>, Vec<u8>)> {
    let cursor = if forward { db.seek_first() } else { db.seek_last() };
    let Ok(cursor) = cursor else {
        return Vec::new();
    };
    let steps = if forward {
        cursor.forward()
    } else {
        cursor.backward()
    };
    steps
        .map(|r| {
            let (k, v) = r.unwrap();
            (k.to_vec(), v.to_vec())
        })
        .collect()
}
