//! Database handle, lifecycle and point operations.

use crate::alloc::{AllocStats, BlockAllocator};
use crate::config::Options;
use crate::enumerator::Enumerator;
use crate::error::{CoreError, CoreResult, ResolverError};
use crate::files::{wal_name_for, DbLock};
use crate::lock::KeyLocks;
use crate::recovery::{self, RecoveryReport};
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::store::{remove_entry, write_entry, OrderedStore};
use crate::types::SequenceNumber;
use crate::verify::{verify_database, Problems};
use crate::wal::{WalManager, WalRecord};
use bytes::Bytes;
use ordkv_storage::{create_unique, FileBackend, InMemoryBackend, StorageBackend, StorageError};
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// What a [`Database::put`] resolver decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutAction {
    /// Leave the entry as it is.
    Keep,
    /// Store this value. An empty vector stores an empty value.
    Write(Vec<u8>),
    /// Remove the entry. A no-op if the key is absent.
    Delete,
}

/// Result of a [`Database::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    /// The value the resolver saw.
    pub old: Option<Bytes>,
    /// Whether the database changed.
    pub written: bool,
}

/// The main database handle.
///
/// A `Database` is an ordered map from byte-string keys to byte-string
/// values, persisted in one file with a companion WAL. All methods take
/// `&self` and may be called from many threads at once.
///
/// # Example
///
/// ```rust
/// use ordkv_core::{Database, Options};
///
/// let db = Database::create_mem(Options::default()).unwrap();
/// db.set(b"b", b"2").unwrap();
/// db.set(b"a", b"1").unwrap();
///
/// let (first_key, _) = db.first().unwrap().unwrap();
/// assert_eq!(first_key, &b"a"[..]);
/// assert_eq!(db.inc(b"counter", 5).unwrap(), 5);
///
/// db.close().unwrap();
/// db.close().unwrap();
/// ```
///
/// # Concurrency
///
/// Mutations of one key are serialized by a per-key lock held across the
/// whole read-modify-write, which makes [`Database::put`] and
/// [`Database::inc`] atomic. Readers never take key locks; they see either
/// the old or the new entry. Checkpoint, verify and close wait for every
/// in-flight operation and exclude new ones while they run.
///
/// # Durability
///
/// A mutation is logged before it is applied. Once it returns `Ok` it
/// survives a crash, even if the automatic checkpoint that follows it
/// fails; such failures are logged and counted in
/// [`StatsSnapshot::checkpoint_failures`].
pub struct Database {
    name: PathBuf,
    wal_name: RwLock<PathBuf>,
    options: Options,
    /// `None` once closed. Operations hold it shared.
    engine: RwLock<Option<Engine>>,
    store: OrderedStore,
    locks: KeyLocks,
    next_seq: AtomicU64,
    file_lock: Mutex<Option<DbLock>>,
    stats: DatabaseStats,
    recovery: RecoveryReport,
}

/// The file and WAL of an open handle. Dropping it closes both.
struct Engine {
    alloc: Mutex<BlockAllocator>,
    /// `None` for memory databases.
    wal: Option<WalManager>,
}

struct Parts {
    name: PathBuf,
    wal_name: PathBuf,
    alloc: BlockAllocator,
    store: OrderedStore,
    wal: Option<WalManager>,
    file_lock: Option<DbLock>,
    max_seq: SequenceNumber,
    recovery: RecoveryReport,
}

impl Database {
    /// Creates a new, empty database at `path`.
    ///
    /// The WAL goes to `options.wal_path` or, by default, to
    /// [`wal_name_for(path)`](crate::files::wal_name_for).
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if anything exists at `path` or a non-empty
    /// WAL exists at the WAL path, `DatabaseLocked` if the file is locked,
    /// or an I/O error.
    pub fn create(path: impl AsRef<Path>, options: Options) -> CoreResult<Self> {
        let path = path.as_ref();
        let wal_path = options
            .wal_path
            .clone()
            .unwrap_or_else(|| wal_name_for(path));
        if std::fs::metadata(&wal_path).is_ok_and(|m| m.len() > 0) {
            return Err(CoreError::AlreadyExists { path: wal_path });
        }

        let backend = FileBackend::create_new(path).map_err(|e| map_create_error(path, e))?;
        Self::format_new(path, backend, options, wal_path)
    }

    /// Creates a new database under a fresh name in `dir`.
    ///
    /// The file name is `prefix`, a random component, then `suffix`; it is
    /// never the bare `prefix + suffix`. An empty `dir` means the system
    /// temporary directory. [`Database::name`] tells where it landed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `dir` is not writable.
    pub fn create_temp(
        dir: impl AsRef<Path>,
        prefix: &str,
        suffix: &str,
        options: Options,
    ) -> CoreResult<Self> {
        let backend = create_unique(dir.as_ref(), prefix, suffix)?;
        let path = backend.path().to_path_buf();
        let wal_path = options
            .wal_path
            .clone()
            .unwrap_or_else(|| wal_name_for(&path));
        Self::format_new(&path, backend, options, wal_path)
    }

    /// Creates a transient database that lives only in memory.
    ///
    /// It has no WAL; [`Database::name`] and [`Database::wal_name`] are
    /// empty and [`Database::close`] discards everything.
    pub fn create_mem(options: Options) -> CoreResult<Self> {
        let alloc = BlockAllocator::create(Box::new(InMemoryBackend::new()))?;
        info!("created memory database");
        Ok(Self::assemble(
            options,
            Parts {
                name: PathBuf::new(),
                wal_name: PathBuf::new(),
                alloc,
                store: OrderedStore::new(),
                wal: None,
                file_lock: None,
                max_seq: SequenceNumber::new(0),
                recovery: RecoveryReport::default(),
            },
        ))
    }

    /// Opens an existing database, recovering from its WAL.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing exists at `path`, `InvalidFormat` if it
    /// is a directory or not a database, `DatabaseLocked` if another handle
    /// has it open, and a corruption error if the file or the WAL is damaged.
    pub fn open(path: impl AsRef<Path>, options: Options) -> CoreResult<Self> {
        let path = path.as_ref();
        let backend = FileBackend::open_existing(path).map_err(|e| map_open_error(path, e))?;
        let file_lock = lock_if(path, &options)?;
        let wal_path = options
            .wal_path
            .clone()
            .unwrap_or_else(|| wal_name_for(path));
        let wal_backend = FileBackend::open(&wal_path)?;
        Self::recover(path, Box::new(backend), Box::new(wal_backend), options, wal_path, file_lock)
    }

    /// Opens a database over caller-supplied storage for the file and WAL.
    ///
    /// `path` only names the handle; nothing is locked. Used by crash tests
    /// to put a fault-injecting backend under a real engine.
    #[doc(hidden)]
    pub fn open_with_backends(
        path: impl AsRef<Path>,
        file: Box<dyn StorageBackend>,
        wal: Box<dyn StorageBackend>,
        options: Options,
    ) -> CoreResult<Self> {
        let path = path.as_ref();
        let wal_path = options
            .wal_path
            .clone()
            .unwrap_or_else(|| wal_name_for(path));
        Self::recover(path, file, wal, options, wal_path, None)
    }

    fn recover(
        path: &Path,
        file: Box<dyn StorageBackend>,
        wal: Box<dyn StorageBackend>,
        options: Options,
        wal_path: PathBuf,
        file_lock: Option<DbLock>,
    ) -> CoreResult<Self> {
        let (mut alloc, scan) = BlockAllocator::open(file)?;
        let wal = WalManager::new(wal, options.sync_on_commit);
        let store = OrderedStore::new();
        let mut report = RecoveryReport::default();
        let logged = recovery::logged_entry_sizes(&wal)?;
        let max_seq = recovery::load_blocks(&mut alloc, scan, &store, logged, &mut report)?;

        if options.verify_before_open {
            let mut log = |_: &CoreError| true;
            let mut problems = Problems::new(&mut log);
            verify_database(&alloc, &store, Some(&wal), &mut problems)?;
            problems.finish(())?;
        }

        let max_seq = recovery::replay_wal(&mut alloc, &store, &wal, &mut report, max_seq)?;
        alloc.sync()?;
        wal.clear()?;

        info!(
            path = %path.display(),
            entries = store.len(),
            blocks = report.blocks_scanned,
            replayed = report.records_replayed,
            skipped = report.records_skipped,
            damaged = report.damaged_blocks,
            "opened database"
        );

        let verify_after_open = options.verify_after_open;
        let db = Self::assemble(
            options,
            Parts {
                name: path.to_path_buf(),
                wal_name: wal_path,
                alloc,
                store,
                wal: Some(wal),
                file_lock,
                max_seq,
                recovery: report,
            },
        );
        if verify_after_open {
            db.verify()?;
        }
        Ok(db)
    }

    fn format_new(
        path: &Path,
        backend: FileBackend,
        options: Options,
        wal_path: PathBuf,
    ) -> CoreResult<Self> {
        match format_parts(path, backend, &options, &wal_path) {
            Ok((alloc, wal, file_lock)) => {
                info!(path = %path.display(), wal = %wal_path.display(), "created database");
                Ok(Self::assemble(
                    options,
                    Parts {
                        name: path.to_path_buf(),
                        wal_name: wal_path,
                        alloc,
                        store: OrderedStore::new(),
                        wal: Some(wal),
                        file_lock,
                        max_seq: SequenceNumber::new(0),
                        recovery: RecoveryReport::default(),
                    },
                ))
            }
            Err(e) => {
                let _ = std::fs::remove_file(path);
                Err(e)
            }
        }
    }

    fn assemble(options: Options, parts: Parts) -> Self {
        Self {
            name: parts.name,
            wal_name: RwLock::new(parts.wal_name),
            options,
            engine: RwLock::new(Some(Engine {
                alloc: Mutex::new(parts.alloc),
                wal: parts.wal,
            })),
            store: parts.store,
            locks: KeyLocks::default(),
            next_seq: AtomicU64::new(parts.max_seq.as_u64() + 1),
            file_lock: Mutex::new(parts.file_lock),
            stats: DatabaseStats::new(),
            recovery: parts.recovery,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Closes the database.
    ///
    /// Checkpoints, closes the file and WAL, releases the file lock and
    /// clears [`Database::wal_name`]. A memory database discards all of its
    /// state. The handle is closed even if this returns an error, and
    /// closing an already closed handle succeeds without doing anything.
    ///
    /// With `verify_before_close` set and verification failing, files are
    /// still synced but the WAL is kept so the next open can replay it.
    pub fn close(&self) -> CoreResult<()> {
        let Some(engine) = self.engine.write().take() else {
            return Ok(());
        };

        let verified = if self.options.verify_before_close {
            self.verify_quiescent(&engine, &mut |_: &CoreError| true)
                .map(|_| ())
        } else {
            Ok(())
        };
        let flushed = if verified.is_ok() {
            self.checkpoint_quiescent(&engine)
        } else {
            sync_engine(&engine)
        };
        drop(engine);
        let unlocked = match self.file_lock.lock().take() {
            Some(lock) => lock.release(),
            None => Ok(()),
        };

        self.store.clear();
        *self.wal_name.write() = PathBuf::new();
        info!(path = %self.name.display(), "closed database");

        verified.and(flushed).and(unlocked)
    }

    /// Returns true until [`Database::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.engine.read_recursive().is_some()
    }

    /// Makes every completed mutation durable in the database file and
    /// empties the WAL.
    ///
    /// Runs automatically once the WAL passes
    /// [`Options::checkpoint_wal_size`] and on close.
    pub fn checkpoint(&self) -> CoreResult<()> {
        let state = self.engine.write();
        let engine = state.as_ref().ok_or(CoreError::DatabaseClosed)?;
        self.checkpoint_quiescent(engine)
    }

    fn checkpoint_quiescent(&self, engine: &Engine) -> CoreResult<()> {
        engine.alloc.lock().sync()?;
        if let Some(wal) = &engine.wal {
            wal.clear()?;
        }
        self.stats.record_checkpoint();
        debug!(path = %self.name.display(), "checkpoint complete");
        Ok(())
    }

    /// Checks the whole database for consistency.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn verify(&self) -> CoreResult<AllocStats> {
        self.verify_with(|_| true)
    }

    /// Checks the whole database, reporting every problem to `log`.
    ///
    /// `log` returns `false` to stop at that problem. Mutations wait until
    /// verification finishes.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, or `DatabaseClosed`.
    pub fn verify_with<F>(&self, mut log: F) -> CoreResult<AllocStats>
    where
        F: FnMut(&CoreError) -> bool,
    {
        let state = self.engine.write();
        let engine = state.as_ref().ok_or(CoreError::DatabaseClosed)?;
        self.verify_quiescent(engine, &mut log)
    }

    fn verify_quiescent(
        &self,
        engine: &Engine,
        log: &mut dyn FnMut(&CoreError) -> bool,
    ) -> CoreResult<AllocStats> {
        let alloc = engine.alloc.lock();
        let mut problems = Problems::new(log);
        verify_database(&alloc, &self.store, engine.wal.as_ref(), &mut problems)?;
        problems.finish(alloc.stats())
    }

    // ========================================================================
    // Identity and accounting
    // ========================================================================

    /// Path of the database file; empty for memory databases.
    #[must_use]
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Path of the WAL; empty for memory databases and after close.
    #[must_use]
    pub fn wal_name(&self) -> PathBuf {
        self.wal_name.read().clone()
    }

    /// Current size of the database file in bytes.
    ///
    /// An empty database is [`FILE_HEADER_SIZE`](crate::alloc::FILE_HEADER_SIZE)
    /// bytes.
    pub fn size(&self) -> CoreResult<u64> {
        let engine = self.admit()?;
        let size = engine.alloc.lock().size();
        Ok(size)
    }

    /// Number of entries.
    pub fn len(&self) -> CoreResult<usize> {
        let _open = self.admit()?;
        Ok(self.store.len())
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// What recovery did when this handle was opened.
    #[must_use]
    pub fn recovery_report(&self) -> RecoveryReport {
        self.recovery
    }

    /// Options this handle was created with.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns the value stored for `key`.
    pub fn get(&self, key: &[u8]) -> CoreResult<Option<Bytes>> {
        let _open = self.admit()?;
        self.stats.record_get();
        Ok(self.store.get(key).map(|slot| self.hand_out(slot.value)))
    }

    /// Copies the value stored for `key` into `buf`, reusing its capacity.
    ///
    /// Returns false, leaving `buf` empty, if the key is absent.
    pub fn get_into(&self, key: &[u8], buf: &mut Vec<u8>) -> CoreResult<bool> {
        let _open = self.admit()?;
        self.stats.record_get();
        buf.clear();
        match self.store.get(key) {
            Some(slot) => {
                buf.extend_from_slice(&slot.value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Smallest key and its value, or `None` if the database is empty.
    pub fn first(&self) -> CoreResult<Option<(Bytes, Bytes)>> {
        let _open = self.admit()?;
        Ok(self.store.first().map(|(k, v)| self.hand_out_pair(k, v)))
    }

    /// Largest key and its value, or `None` if the database is empty.
    pub fn last(&self) -> CoreResult<Option<(Bytes, Bytes)>> {
        let _open = self.admit()?;
        Ok(self.store.last().map(|(k, v)| self.hand_out_pair(k, v)))
    }

    /// Positions an enumerator on `key`.
    ///
    /// The flag is true if `key` exists. `next()` then yields the first entry
    /// at or after `key` and `prev()` the last entry at or before it.
    pub fn seek(&self, key: &[u8]) -> CoreResult<(Enumerator<'_>, bool)> {
        let _open = self.admit()?;
        self.stats.record_seek();
        let hit = self.store.seq_of(key).is_some();
        Ok((Enumerator::at(self, Bytes::copy_from_slice(key)), hit))
    }

    /// Positions an enumerator on the smallest key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the database is empty.
    pub fn seek_first(&self) -> CoreResult<Enumerator<'_>> {
        let _open = self.admit()?;
        self.stats.record_seek();
        let (key, _) = self
            .store
            .first()
            .ok_or_else(|| CoreError::not_found("first key of empty database"))?;
        Ok(Enumerator::at(self, key))
    }

    /// Positions an enumerator on the largest key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the database is empty.
    pub fn seek_last(&self) -> CoreResult<Enumerator<'_>> {
        let _open = self.admit()?;
        self.stats.record_seek();
        let (key, _) = self
            .store
            .last()
            .ok_or_else(|| CoreError::not_found("last key of empty database"))?;
        Ok(Enumerator::at(self, key))
    }

    /// One enumerator step against the live index.
    pub(crate) fn step(
        &self,
        forward: bool,
        bound: Bound<&[u8]>,
    ) -> CoreResult<Option<(Bytes, Bytes)>> {
        let _open = self.admit()?;
        let found = if forward {
            self.store.ceiling(bound)
        } else {
            self.store.floor(bound)
        };
        if found.is_some() {
            self.stats.record_step();
        }
        Ok(found)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        let wal_end = {
            let engine = self.admit()?;
            let _key = self.locks.lock(key);
            self.stats.record_set();
            self.commit_set(&engine, key, Bytes::copy_from_slice(value))?
        };
        self.after_commit(wal_end);
        Ok(())
    }

    /// Removes `key`. Removing an absent key succeeds and writes nothing.
    pub fn delete(&self, key: &[u8]) -> CoreResult<()> {
        let wal_end = {
            let engine = self.admit()?;
            let _key = self.locks.lock(key);
            self.stats.record_delete();
            if self.store.seq_of(key).is_none() {
                return Ok(());
            }
            self.commit_delete(&engine, key)?
        };
        self.after_commit(wal_end);
        Ok(())
    }

    /// Removes `key` and returns the value it had.
    ///
    /// The returned value is always an independent copy, whatever
    /// [`Options::no_copy`] says.
    pub fn extract(&self, key: &[u8]) -> CoreResult<Option<Bytes>> {
        let (value, wal_end) = {
            let engine = self.admit()?;
            let _key = self.locks.lock(key);
            self.stats.record_extract();
            let Some(slot) = self.store.get(key) else {
                return Ok(None);
            };
            let wal_end = self.commit_delete(&engine, key)?;
            (Bytes::copy_from_slice(&slot.value), wal_end)
        };
        self.after_commit(wal_end);
        Ok(Some(value))
    }

    /// Atomic read-modify-write of one key.
    ///
    /// `resolver` runs exactly once, with the key locked, and receives the
    /// key and its current value. Whatever it returns is applied before any
    /// other mutation of the key can run. If it returns an error nothing is
    /// written and the error comes back as `ResolverAborted`.
    ///
    /// The resolver must not mutate this database. It runs under a key lock
    /// that is not reentrant, so a mutation from inside the resolver of a key
    /// sharing its lock stripe (the same key included) deadlocks instead of
    /// returning an error. Reads are safe.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ordkv_core::{Database, Options, PutAction};
    ///
    /// let db = Database::create_mem(Options::default()).unwrap();
    /// let outcome = db
    ///     .put(b"k", |_, old| {
    ///         Ok(match old {
    ///             None => PutAction::Write(b"first".to_vec()),
    ///             Some(_) => PutAction::Keep,
    ///         })
    ///     })
    ///     .unwrap();
    /// assert!(outcome.written);
    /// assert!(outcome.old.is_none());
    /// ```
    pub fn put<F>(&self, key: &[u8], resolver: F) -> CoreResult<PutOutcome>
    where
        F: FnOnce(&[u8], Option<&[u8]>) -> Result<PutAction, ResolverError>,
    {
        let (outcome, wal_end) = {
            let engine = self.admit()?;
            let _key = self.locks.lock(key);
            self.stats.record_put();

            let old = self.store.get(key).map(|slot| slot.value);
            let action = resolver(key, old.as_deref())
                .map_err(|source| CoreError::ResolverAborted { source })?;

            let (written, wal_end) = match action {
                PutAction::Keep => (false, None),
                PutAction::Write(value) => {
                    (true, self.commit_set(&engine, key, Bytes::from(value))?)
                }
                PutAction::Delete if old.is_some() => (true, self.commit_delete(&engine, key)?),
                PutAction::Delete => (false, None),
            };
            let outcome = PutOutcome {
                old: old.map(|v| self.hand_out(v)),
                written,
            };
            (outcome, wal_end)
        };
        self.after_commit(wal_end);
        Ok(outcome)
    }

    /// Atomically adds `delta` to the big-endian `i64` stored at `key`.
    ///
    /// An absent key, or a value that is not exactly 8 bytes, counts as 0
    /// and is overwritten. Overflow wraps. Returns the new value.
    pub fn inc(&self, key: &[u8], delta: i64) -> CoreResult<i64> {
        let (new, wal_end) = {
            let engine = self.admit()?;
            let _key = self.locks.lock(key);
            self.stats.record_inc();

            let prior = self
                .store
                .get(key)
                .and_then(|slot| <[u8; 8]>::try_from(&slot.value[..]).ok())
                .map_or(0, i64::from_be_bytes);
            let new = prior.wrapping_add(delta);
            let wal_end =
                self.commit_set(&engine, key, Bytes::copy_from_slice(&new.to_be_bytes()))?;
            (new, wal_end)
        };
        self.after_commit(wal_end);
        Ok(new)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn admit(&self) -> CoreResult<MappedRwLockReadGuard<'_, Engine>> {
        RwLockReadGuard::try_map(self.engine.read_recursive(), Option::as_ref)
            .map_err(|_| CoreError::DatabaseClosed)
    }

    fn next_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.next_seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Appends to the WAL, returning its new size. `None` without a WAL.
    fn log(&self, engine: &Engine, record: impl FnOnce() -> WalRecord) -> CoreResult<Option<u64>> {
        let Some(wal) = &engine.wal else {
            return Ok(None);
        };
        let pos = wal.append(&record())?;
        self.stats.record_wal_bytes(pos.len());
        Ok(Some(pos.end))
    }

    /// Logs and applies `key = value`. The caller holds the key lock.
    fn commit_set(&self, engine: &Engine, key: &[u8], value: Bytes) -> CoreResult<Option<u64>> {
        let seq = self.next_seq();
        let wal_end = self.log(engine, || WalRecord::Set {
            seq,
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        write_entry(&mut engine.alloc.lock(), &self.store, seq, key, value)?;
        Ok(wal_end)
    }

    /// Logs and applies the removal of a present key. The caller holds the
    /// key lock.
    fn commit_delete(&self, engine: &Engine, key: &[u8]) -> CoreResult<Option<u64>> {
        let seq = self.next_seq();
        let wal_end = self.log(engine, || WalRecord::Delete {
            seq,
            key: key.to_vec(),
        })?;
        remove_entry(&mut engine.alloc.lock(), &self.store, key)?;
        Ok(wal_end)
    }

    /// Checkpoints once the WAL has grown past the configured size. Must be
    /// called with no gate or key lock held.
    ///
    /// The mutation is already logged, so a failed checkpoint only leaves
    /// the WAL in place for the next one.
    fn after_commit(&self, wal_end: Option<u64>) {
        let Some(end) = wal_end else { return };
        if end <= self.options.checkpoint_wal_size {
            return;
        }
        match self.checkpoint() {
            Ok(()) | Err(CoreError::DatabaseClosed) => {}
            Err(e) => {
                self.stats.record_checkpoint_failure();
                warn!(
                    path = %self.name.display(),
                    error = %e,
                    "automatic checkpoint failed, keeping the WAL"
                );
            }
        }
    }

    pub(crate) fn hand_out(&self, value: Bytes) -> Bytes {
        if self.options.no_copy {
            value
        } else {
            Bytes::copy_from_slice(&value)
        }
    }

    fn hand_out_pair(&self, key: Bytes, value: Bytes) -> (Bytes, Bytes) {
        (self.hand_out(key), self.hand_out(value))
    }
}

fn sync_engine(engine: &Engine) -> CoreResult<()> {
    engine.alloc.lock().sync()?;
    if let Some(wal) = &engine.wal {
        wal.sync()?;
    }
    Ok(())
}

fn format_parts(
    path: &Path,
    backend: FileBackend,
    options: &Options,
    wal_path: &Path,
) -> CoreResult<(BlockAllocator, WalManager, Option<DbLock>)> {
    let file_lock = lock_if(path, options)?;
    let mut alloc = BlockAllocator::create(Box::new(backend))?;
    alloc.sync()?;
    let wal = WalManager::new(
        Box::new(FileBackend::open(wal_path)?),
        options.sync_on_commit,
    );
    wal.clear()?;
    Ok((alloc, wal, file_lock))
}

fn lock_if(path: &Path, options: &Options) -> CoreResult<Option<DbLock>> {
    if options.lock_file {
        DbLock::acquire(path).map(Some)
    } else {
        Ok(None)
    }
}

fn map_open_error(path: &Path, err: StorageError) -> CoreError {
    match err {
        StorageError::NotFound { .. } => {
            CoreError::not_found(format!("database {}", path.display()))
        }
        StorageError::IsDirectory { .. } => {
            CoreError::invalid_format(format!("{} is a directory", path.display()))
        }
        other => other.into(),
    }
}

fn map_create_error(path: &Path, err: StorageError) -> CoreError {
    match err {
        StorageError::AlreadyExists { .. } => CoreError::AlreadyExists {
            path: path.to_path_buf(),
        },
        other => other.into(),
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("is_open", &self.is_open())
            .field("entries", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
