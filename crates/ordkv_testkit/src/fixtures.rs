//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use ordkv_core::{Database, Options};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
    options: Options,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::create_mem(Options::default()).expect("Failed to create memory database"),
            temp_dir: None,
            options: Options::default(),
        }
    }

    /// Creates a new file-based test database with default options.
    pub fn file() -> Self {
        Self::file_with(Options::default())
    }

    /// Creates a new file-based test database.
    pub fn file_with(options: Options) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::create(temp_dir.path().join("test.db"), options.clone())
            .expect("Failed to create file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
            options,
        }
    }

    /// A file database that can be crashed and reopened in-process.
    ///
    /// File locking is off, since a crashed handle never releases its lock,
    /// and WAL syncs are skipped to keep tests fast.
    pub fn crashable() -> Self {
        Self::file_with(Options::default().lock_file(false).sync_on_commit(false))
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("test.db"))
    }

    /// Returns the temporary directory holding the database.
    pub fn dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes the database cleanly and opens it again.
    pub fn reopen(self) -> Self {
        let path = self.path().expect("Only file databases can be reopened");
        self.db.close().expect("Failed to close database");
        let db = Database::open(&path, self.options.clone()).expect("Failed to reopen database");
        Self {
            db,
            temp_dir: self.temp_dir,
            options: self.options,
        }
    }

    /// Abandons the handle without closing it, as a crash would, then opens
    /// the files again.
    ///
    /// `tamper` runs between the crash and the reopen with the database and
    /// WAL paths, so tests can damage the files first.
    pub fn crash_and_reopen<F>(self, tamper: F) -> Self
    where
        F: FnOnce(&Path, &Path),
    {
        let path = self.path().expect("Only file databases can crash");
        let wal = self.db.wal_name();
        std::mem::forget(self.db);
        tamper(&path, &wal);
        let db = Database::open(&path, self.options.clone()).expect("Failed to recover database");
        Self {
            db,
            temp_dir: self.temp_dir,
            options: self.options,
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use ordkv_testkit::fixtures::with_temp_db;
///
/// with_temp_db(|db| {
///     assert_eq!(db.inc(b"n", 2).unwrap(), 2);
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Big-endian `u64` key, so numeric order and byte order agree.
pub fn numbered_key(n: u64) -> [u8; 8] {
    n.to_be_bytes()
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database with `count` entries keyed by [`numbered_key`].
    ///
    /// Entry `i` holds `i` as a big-endian `u64` repeated `i % 8 + 1` times.
    pub fn populated_database(count: u64) -> TestDatabase {
        let test_db = TestDatabase::memory();
        fill(&test_db.db, count);
        test_db
    }

    /// Writes the entries of [`populated_database`] into `db`.
    pub fn fill(db: &Database, count: u64) {
        for i in 0..count {
            db.set(&numbered_key(i), &expected_value(i))
                .expect("Failed to set entry");
        }
    }

    /// Value [`populated_database`] stores under entry `i`.
    pub fn expected_value(i: u64) -> Vec<u8> {
        i.to_be_bytes().repeat((i % 8 + 1) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordkv_core::alloc::FILE_HEADER_SIZE;

    #[test]
    fn test_memory_database() {
        let test_db = TestDatabase::memory();
        assert!(test_db.path().is_none());
        assert_eq!(test_db.size().unwrap(), FILE_HEADER_SIZE);
    }

    #[test]
    fn test_with_file_db() {
        with_file_db(|db, path| {
            assert_eq!(db.name(), path);
            db.set(b"k", b"v").unwrap();
        });
    }

    #[test]
    fn test_populated_scenario() {
        let test_db = scenarios::populated_database(10);
        assert_eq!(test_db.len().unwrap(), 10);
        assert_eq!(
            test_db.get(&numbered_key(3)).unwrap().unwrap(),
            &scenarios::expected_value(3)[..]
        );
    }

    #[test]
    fn test_reopen_keeps_data() {
        let test_db = TestDatabase::file();
        scenarios::fill(&test_db, 20);
        let test_db = test_db.reopen();
        assert_eq!(test_db.len().unwrap(), 20);
    }

    #[test]
    fn test_crash_and_reopen() {
        let test_db = TestDatabase::crashable();
        scenarios::fill(&test_db, 20);
        let test_db = test_db.crash_and_reopen(|_, wal| {
            assert!(std::fs::metadata(wal).unwrap().len() > 0);
        });
        assert_eq!(test_db.len().unwrap(), 20);
        test_db.verify().unwrap();
    }
}
