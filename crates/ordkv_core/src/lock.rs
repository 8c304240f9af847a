//! Per-key mutual exclusion.
//!
//! Mutations lock their key's stripe for the whole read-modify-write, which
//! is what makes `put` and `inc` atomic. Keys hash onto a fixed set of
//! stripes, so unrelated keys rarely contend and memory stays bounded no
//! matter how many keys exist.

use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;

/// Default number of stripes.
pub const DEFAULT_STRIPES: usize = 64;

/// A fixed table of mutexes indexed by key hash.
#[derive(Debug)]
pub struct KeyLocks {
    stripes: Box<[Mutex<()>]>,
    hasher: RandomState,
}

impl KeyLocks {
    /// Creates a table with `stripes` mutexes (at least one).
    #[must_use]
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
        }
    }

    /// Blocks until the stripe guarding `key` is held.
    pub fn lock(&self, key: &[u8]) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(key)].lock()
    }

    fn stripe_of(&self, key: &[u8]) -> usize {
        (self.hasher.hash_one(key) % self.stripes.len() as u64) as usize
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}
