//! Crash recovery testing for ordkv.
//!
//! This module provides utilities for testing crash recovery behavior.
//! It simulates crashes at various points and verifies that reopening the
//! database recovers every acknowledged write.
//!
//! ## Test Strategy
//!
//! 1. **Crash during a WAL append** - the torn record is discarded
//! 2. **Crash before blocks reach the file** - the WAL rebuilds them
//! 3. **Crash after a checkpoint** - the file alone is enough
//! 4. **Torn block at the end of the file** - the tail is cut off
//! 5. **Torn rewrite of a reused block** - a [`CrashableBackend`] under a
//!    live engine cuts the write short; the WAL rebuilds the block
//!
//! ## Usage
//!
//! ```rust
//! use ordkv_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! let result = harness.test_acknowledged_writes_survive();
//! assert!(result.passed, "{:?}", result.error);
//! ```

use crate::fixtures::{numbered_key, scenarios, TestDatabase};
use ordkv_core::alloc::{BLOCK_HEADER_SIZE, FILE_HEADER_SIZE};
use ordkv_core::{wal_name_for, CoreError, CoreResult, Database, Options};
use ordkv_storage::{FileBackend, StorageBackend, StorageError, StorageResult};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Crash partway through appending the last WAL record.
    DuringWalWrite,
    /// Crash after the WAL appends, before any entry block reached the file.
    AfterWalWrite,
    /// Crash after entry blocks were written but before a checkpoint.
    BeforeCheckpoint,
    /// Crash right after a checkpoint.
    AfterCheckpoint,
    /// Crash partway through rewriting a freed block in the middle of the
    /// file, after its WAL record was written.
    DuringBlockReuse,
}

impl CrashPoint {
    /// Every crash point.
    pub const ALL: [CrashPoint; 5] = [
        CrashPoint::DuringWalWrite,
        CrashPoint::AfterWalWrite,
        CrashPoint::BeforeCheckpoint,
        CrashPoint::AfterCheckpoint,
        CrashPoint::DuringBlockReuse,
    ];
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected entries after recovery.
    pub expected_entries: usize,
    /// Actual entries after recovery.
    pub actual_entries: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, entries: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_entries: entries,
            actual_entries: entries,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_entries: expected,
            actual_entries: actual,
            error: Some(error.to_string()),
        }
    }
}

/// Shared crash trigger for a [`CrashableBackend`].
///
/// Stays with the test after the backend itself has been boxed into an
/// allocator or WAL.
#[derive(Debug)]
pub struct CrashSwitch {
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

impl CrashSwitch {
    fn new() -> Self {
        Self {
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        }
    }

    /// Crash once `bytes` more bytes have been written.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.bytes_written.load(Ordering::SeqCst);
        self.crash_after_bytes
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Sets whether flush and sync should fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Resets the crash state.
    pub fn reset(&self) {
        self.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_on_sync.store(false, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Total bytes written through the backend.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::SeqCst)
    }

    /// How much of a `len`-byte write may go through. `Err` once crashed.
    fn admit(&self, len: usize) -> StorageResult<usize> {
        if self.has_crashed() {
            return Err(simulated("write after crash"));
        }
        let current = self.bytes_written.fetch_add(len, Ordering::SeqCst);
        let threshold = self.crash_after_bytes.load(Ordering::SeqCst);
        if current.saturating_add(len) > threshold {
            self.crashed.store(true, Ordering::SeqCst);
            Ok(threshold.saturating_sub(current))
        } else {
            Ok(len)
        }
    }

    fn check_sync(&self, what: &str) -> StorageResult<()> {
        if self.has_crashed() || self.fail_on_sync.load(Ordering::SeqCst) {
            self.crashed.store(true, Ordering::SeqCst);
            return Err(simulated(what));
        }
        Ok(())
    }
}

fn simulated(what: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("simulated crash during {what}"),
    ))
}

/// A storage backend wrapper that can simulate crashes.
///
/// The write that crosses the byte budget is cut short and fails; every
/// later write, flush or sync fails too, as if the process had died. Reads
/// still see what reached the inner backend.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    switch: Arc<CrashSwitch>,
}

impl CrashableBackend {
    /// Creates a new crashable backend wrapping an inner backend.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            switch: Arc::new(CrashSwitch::new()),
        }
    }

    /// Returns the trigger controlling this backend.
    pub fn switch(&self) -> Arc<CrashSwitch> {
        Arc::clone(&self.switch)
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let allowed = self.switch.admit(data.len())?;
        if allowed < data.len() {
            if allowed > 0 {
                let _ = self.inner.write_at(offset, &data[..allowed]);
            }
            return Err(simulated("partial write"));
        }
        self.inner.write_at(offset, data)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let allowed = self.switch.admit(data.len())?;
        if allowed < data.len() {
            if allowed > 0 {
                let _ = self.inner.append(&data[..allowed]);
            }
            return Err(simulated("partial append"));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.switch.check_sync("flush")?;
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.switch.check_sync("sync")?;
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.switch.has_crashed() {
            return Err(simulated("truncate"));
        }
        self.inner.truncate(new_size)
    }
}

/// Shortens the file at `path` to `len` bytes.
pub fn truncate_file(path: &Path, len: u64) -> std::io::Result<()> {
    OpenOptions::new().write(true).open(path)?.set_len(len)
}

/// Counts entries written by [`scenarios::fill`] that read back intact,
/// then verifies the database.
fn count_intact(db: &Database, count: u64) -> CoreResult<usize> {
    let mut intact = 0;
    for i in 0..count {
        let value = db.get(&numbered_key(i))?;
        if value.as_deref() == Some(&scenarios::expected_value(i)[..]) {
            intact += 1;
        }
    }
    db.verify()?;
    Ok(intact)
}

/// Fills a database, frees the block of a middle entry and writes the entry
/// again through a backend that dies partway into the block payload.
///
/// The failed write was logged first, so recovery must bring back every
/// entry, the torn one included.
fn torn_block_reuse(count: u64) -> CoreResult<usize> {
    let dir = TempDir::new()?;
    let path = dir.path().join("reuse.db");
    let options = Options::default().lock_file(false).sync_on_commit(false);

    let db = Database::create(&path, options.clone())?;
    scenarios::fill(&db, count);
    db.close()?;

    let file = CrashableBackend::new(Box::new(FileBackend::open_existing(&path)?));
    let switch = file.switch();
    let wal = FileBackend::open(&wal_name_for(&path))?;
    let db = Database::open_with_backends(&path, Box::new(file), Box::new(wal), options.clone())?;

    let victim = count / 2;
    db.delete(&numbered_key(victim))?;
    switch.crash_after(BLOCK_HEADER_SIZE as usize + 8);
    if db
        .set(&numbered_key(victim), &scenarios::expected_value(victim))
        .is_ok()
    {
        return Err(CoreError::invalid_argument("block rewrite was not torn"));
    }
    drop(db);

    let db = Database::open(&path, options)?;
    if db.recovery_report().damaged_blocks != 1 {
        return Err(CoreError::corruption("torn block was not detected"));
    }
    count_intact(&db, count)
}

/// Test harness for crash recovery scenarios on real files.
#[derive(Debug, Default)]
pub struct CrashRecoveryHarness {
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new crash recovery harness.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if every test run so far passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    fn record(
        &mut self,
        description: &str,
        expected: usize,
        outcome: Result<usize, CoreError>,
    ) -> CrashRecoveryResult {
        let result = match outcome {
            Ok(actual) if actual == expected => CrashRecoveryResult::pass(description, expected),
            Ok(actual) => {
                CrashRecoveryResult::fail(description, expected, actual, "entry count differs")
            }
            Err(e) => CrashRecoveryResult::fail(description, expected, 0, &e.to_string()),
        };
        self.results.push(result.clone());
        result
    }

    /// Writes `count` entries, crashes at `point` and checks what survives.
    ///
    /// Every write acknowledged before the crash must be readable after
    /// reopening, with its value intact.
    pub fn test_crash_at(&mut self, point: CrashPoint, count: u64) -> CrashRecoveryResult {
        let description = format!("crash {point:?} after {count} writes");
        if point == CrashPoint::DuringBlockReuse {
            let outcome = torn_block_reuse(count);
            return self.record(&description, count as usize, outcome);
        }
        let test_db = TestDatabase::crashable();
        scenarios::fill(&test_db, count);
        if point == CrashPoint::AfterCheckpoint {
            if let Err(e) = test_db.checkpoint() {
                return self.record(&description, count as usize, Err(e));
            }
        }

        // A torn record at the end of the WAL belongs to a write that was
        // never acknowledged, so the expected count is unchanged.
        let recovered = test_db.crash_and_reopen(|db, wal| {
            if matches!(point, CrashPoint::DuringWalWrite | CrashPoint::AfterWalWrite) {
                truncate_file(db, FILE_HEADER_SIZE).expect("truncate database");
            }
            if point == CrashPoint::DuringWalWrite {
                let mut file = OpenOptions::new()
                    .append(true)
                    .open(wal)
                    .expect("open WAL");
                std::io::Write::write_all(&mut file, b"KWAL\x01\x00\x01\xff\xff")
                    .expect("tear WAL");
            }
        });

        let outcome = count_intact(&recovered, count);
        self.record(&description, count as usize, outcome)
    }

    /// Acknowledged writes survive an abandoned handle.
    pub fn test_acknowledged_writes_survive(&mut self) -> CrashRecoveryResult {
        self.test_crash_at(CrashPoint::BeforeCheckpoint, 25)
    }

    /// Runs every crash point.
    pub fn run_all(&mut self, count: u64) -> &[CrashRecoveryResult] {
        for point in CrashPoint::ALL {
            self.test_crash_at(point, count);
        }
        &self.results
    }
}
