//! Operation counters.
//!
//! # Usage
//!
//! ```rust
//! use ordkv_core::{Database, Options};
//!
//! let db = Database::create_mem(Options::default()).unwrap();
//! db.set(b"k", b"v").unwrap();
//! db.get(b"k").unwrap();
//!
//! let stats = db.stats();
//! assert_eq!(stats.sets, 1);
//! assert_eq!(stats.gets, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live operation counters for one database handle.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    puts: AtomicU64,
    incs: AtomicU64,
    extracts: AtomicU64,
    seeks: AtomicU64,
    enumerator_steps: AtomicU64,
    checkpoints: AtomicU64,
    checkpoint_failures: AtomicU64,
    wal_bytes: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_inc(&self) {
        self.incs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_extract(&self) {
        self.extracts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_seek(&self) {
        self.seeks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_step(&self) {
        self.enumerator_steps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint_failure(&self) {
        self.checkpoint_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wal_bytes(&self, bytes: u64) {
        self.wal_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            incs: self.incs.load(Ordering::Relaxed),
            extracts: self.extracts.load(Ordering::Relaxed),
            seeks: self.seeks.load(Ordering::Relaxed),
            enumerator_steps: self.enumerator_steps.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            checkpoint_failures: self.checkpoint_failures.load(Ordering::Relaxed),
            wal_bytes: self.wal_bytes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`DatabaseStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Point lookups (`get`, `get_into`).
    pub gets: u64,
    /// Unconditional writes.
    pub sets: u64,
    /// Deletes, including deletes of absent keys.
    pub deletes: u64,
    /// Conditional writes, whatever the resolver decided.
    pub puts: u64,
    /// Atomic increments.
    pub incs: u64,
    /// Extractions.
    pub extracts: u64,
    /// Enumerator positionings.
    pub seeks: u64,
    /// Successful `next`/`prev` calls.
    pub enumerator_steps: u64,
    /// Completed checkpoints.
    pub checkpoints: u64,
    /// Automatic checkpoints that failed after their mutation committed.
    pub checkpoint_failures: u64,
    /// Bytes appended to the WAL.
    pub wal_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = DatabaseStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_operations() {
        let stats = DatabaseStats::new();
        stats.record_get();
        stats.record_get();
        stats.record_set();
        stats.record_wal_bytes(40);
        stats.record_wal_bytes(2);

        let snap = stats.snapshot();
        assert_eq!(snap.gets, 2);
        assert_eq!(snap.sets, 1);
        assert_eq!(snap.wal_bytes, 42);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(DatabaseStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_inc();
                    s.record_step();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.incs, 1000);
        assert_eq!(snap.enumerator_steps, 1000);
    }
}
