//! Stress tests for ordkv.
//!
//! These helpers drive one handle under heavy load and concurrent access
//! and report how many operations went through.

use crate::fixtures::numbered_key;
use ordkv_core::{Database, PutAction};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform (per thread for concurrent tests).
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Size of values in bytes.
    pub value_size: usize,
    /// Number of distinct keys.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            value_size: 256,
            key_count: 1_000,
        }
    }
}

#[derive(Default)]
struct Tally {
    successful: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record<T, E>(&self, result: Result<T, E>) {
        match result {
            Ok(_) => self.successful.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn finish(self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.into_inner(),
            self.failed.into_inner(),
            start.elapsed(),
        )
    }
}

fn key_for(i: usize, config: &StressConfig) -> [u8; 8] {
    numbered_key((i % config.key_count.max(1)) as u64)
}

fn populate(db: &Database, config: &StressConfig) {
    let value = vec![0xABu8; config.value_size];
    for i in 0..config.key_count {
        let _ = db.set(&key_for(i, config), &value);
    }
}

/// Run a sequential write stress test.
pub fn stress_sequential_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    let value = vec![0xABu8; config.value_size];
    let tally = Tally::default();
    let start = Instant::now();

    for i in 0..config.operations {
        tally.record(db.set(&key_for(i, config), &value));
    }

    tally.finish(start)
}

/// Run a sequential read stress test over a populated key range.
pub fn stress_sequential_reads(db: &Database, config: &StressConfig) -> StressTestResult {
    populate(db, config);
    let tally = Tally::default();
    let start = Instant::now();

    for i in 0..config.operations {
        tally.record(db.get(&key_for(i, config)));
    }

    tally.finish(start)
}

/// Run a mixed set/get/delete stress test.
pub fn stress_mixed_operations(db: &Database, config: &StressConfig) -> StressTestResult {
    let value = vec![0xABu8; config.value_size];
    let tally = Tally::default();
    let start = Instant::now();

    for i in 0..config.operations {
        let key = key_for(i, config);
        match i % 3 {
            0 => tally.record(db.set(&key, &value)),
            1 => tally.record(db.get(&key)),
            _ => tally.record(db.delete(&key)),
        }
    }

    tally.finish(start)
}

/// Run concurrent readers over a populated key range.
pub fn stress_concurrent_reads(db: &Database, config: &StressConfig) -> StressTestResult {
    populate(db, config);
    let tally = Tally::default();
    let start = Instant::now();

    thread::scope(|s| {
        for t in 0..config.threads {
            let tally = &tally;
            s.spawn(move || {
                for i in 0..config.operations {
                    tally.record(db.get(&key_for(t * config.operations + i, config)));
                }
            });
        }
    });

    tally.finish(start)
}

/// Run `threads` incrementers against one key, thread `t` adding `t` each
/// time. Returns the result and the final counter value, which must equal
/// `operations * (0 + 1 + .. + threads - 1)`.
pub fn stress_concurrent_inc(
    db: &Database,
    key: &[u8],
    config: &StressConfig,
) -> (StressTestResult, i64) {
    let tally = Tally::default();
    let start = Instant::now();

    thread::scope(|s| {
        for t in 0..config.threads {
            let tally = &tally;
            s.spawn(move || {
                for _ in 0..config.operations {
                    tally.record(db.inc(key, t as i64));
                }
            });
        }
    });

    let result = tally.finish(start);
    let total = db
        .get(key)
        .ok()
        .flatten()
        .and_then(|v| <[u8; 8]>::try_from(&v[..]).ok())
        .map_or(0, i64::from_be_bytes);
    (result, total)
}

/// Run concurrent read-modify-write `put`s appending one byte each to a
/// shared key. The final value length must equal the successful count.
pub fn stress_concurrent_put(db: &Database, key: &[u8], config: &StressConfig) -> StressTestResult {
    let tally = Tally::default();
    let start = Instant::now();

    thread::scope(|s| {
        for t in 0..config.threads {
            let tally = &tally;
            s.spawn(move || {
                for _ in 0..config.operations {
                    tally.record(db.put(key, |_, old| {
                        let mut value = old.map(<[u8]>::to_vec).unwrap_or_default();
                        value.push(t as u8);
                        Ok(PutAction::Write(value))
                    }));
                }
            });
        }
    });

    tally.finish(start)
}

/// Walk the whole database forward repeatedly while writer threads rewrite
/// every key. Each walk counts as one operation and fails if it skips a key
/// or yields keys out of order.
pub fn stress_enumeration_under_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    populate(db, config);
    let value = vec![0xCDu8; config.value_size];
    let stop = AtomicBool::new(false);
    let tally = Tally::default();
    let start = Instant::now();

    thread::scope(|s| {
        for t in 0..config.threads {
            let (stop, value) = (&stop, &value);
            s.spawn(move || {
                let mut i = t;
                while !stop.load(Ordering::Relaxed) {
                    let _ = db.set(&key_for(i, config), value);
                    i += config.threads;
                }
            });
        }

        for _ in 0..config.operations {
            tally.record(full_walk(db, config.key_count));
        }
        stop.store(true, Ordering::Relaxed);
    });

    tally.finish(start)
}

fn full_walk(db: &Database, expected: usize) -> Result<(), String> {
    let cursor = db.seek_first().map_err(|e| e.to_string())?;
    let mut last: Option<Vec<u8>> = None;
    let mut count = 0;
    for step in cursor.forward() {
        let (key, _) = step.map_err(|e| e.to_string())?;
        if last.as_deref().is_some_and(|prev| prev >= &key[..]) {
            return Err(format!("key {key:?} out of order"));
        }
        last = Some(key.to_vec());
        count += 1;
    }
    if count == expected {
        Ok(())
    } else {
        Err(format!("walk saw {count} keys, expected {expected}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordkv_core::Options;

    fn create_test_db() -> Database {
        Database::create_mem(Options::default()).expect("Failed to create database")
    }

    #[test]
    fn test_sequential_writes() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 1_000,
            value_size: 64,
            ..Default::default()
        };

        let result = stress_sequential_writes(&db, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 1_000);
        assert_eq!(db.len().unwrap(), 1_000);
    }

    #[test]
    fn test_sequential_reads() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 1_000,
            key_count: 100,
            value_size: 64,
            ..Default::default()
        };

        let result = stress_sequential_reads(&db, &config);
        assert_eq!(result.failed_ops, 0);
    }

    #[test]
    fn test_mixed_operations() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 1_000,
            key_count: 100,
            value_size: 64,
            ..Default::default()
        };

        let result = stress_mixed_operations(&db, &config);
        assert_eq!(result.failed_ops, 0);
        db.verify().unwrap();
    }

    #[test]
    fn test_concurrent_reads() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 1_000,
            threads: 4,
            key_count: 100,
            value_size: 64,
        };

        let result = stress_concurrent_reads(&db, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 4_000);
    }

    #[test]
    fn test_concurrent_inc() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 2_000,
            threads: 4,
            ..Default::default()
        };

        let (result, total) = stress_concurrent_inc(&db, b"counter", &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(total, 2_000 * (1 + 2 + 3));
    }

    #[test]
    fn test_concurrent_put() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 500,
            threads: 4,
            ..Default::default()
        };

        let result = stress_concurrent_put(&db, b"log", &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(db.get(b"log").unwrap().unwrap().len(), 2_000);
    }

    #[test]
    fn test_enumeration_under_writes() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 20,
            threads: 2,
            key_count: 500,
            value_size: 16,
        };

        let result = stress_enumeration_under_writes(&db, &config);
        assert_eq!(result.failed_ops, 0);
    }
}
