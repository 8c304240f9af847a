//! Database options.

use std::path::PathBuf;

/// Default WAL size that triggers an automatic checkpoint.
pub const DEFAULT_CHECKPOINT_WAL_SIZE: u64 = 4 * 1024 * 1024;

/// Options fixed when a database handle is created or opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Return shared views of cached values instead of private copies.
    ///
    /// With `no_copy` set, values handed out by `get`, `first`, `last` and
    /// enumerators are reference-counted slices of the store's own cache.
    /// They are immutable, so sharing never lets a caller corrupt the store,
    /// but they keep the cached allocation alive for as long as they are held.
    pub no_copy: bool,

    /// Explicit WAL location. `None` derives it from the database path.
    pub wal_path: Option<PathBuf>,

    /// Whether to fsync the WAL before a mutation reports success.
    pub sync_on_commit: bool,

    /// WAL size in bytes past which a checkpoint runs after a mutation.
    pub checkpoint_wal_size: u64,

    /// Run `verify` over the file and the WAL before the WAL is replayed.
    pub verify_before_open: bool,

    /// Run `verify` once recovery has finished.
    pub verify_after_open: bool,

    /// Run `verify` as the first step of `close`.
    pub verify_before_close: bool,

    /// Hold an exclusive advisory lock on the database file while open.
    pub lock_file: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            no_copy: false,
            wal_path: None,
            sync_on_commit: true,
            checkpoint_wal_size: DEFAULT_CHECKPOINT_WAL_SIZE,
            verify_before_open: false,
            verify_after_open: false,
            verify_before_close: false,
            lock_file: true,
        }
    }
}

impl Options {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets no-copy mode.
    #[must_use]
    pub const fn no_copy(mut self, value: bool) -> Self {
        self.no_copy = value;
        self
    }

    /// Sets an explicit WAL path.
    #[must_use]
    pub fn wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wal_path = Some(path.into());
        self
    }

    /// Sets whether to sync the WAL on every mutation.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the WAL size that triggers a checkpoint.
    #[must_use]
    pub const fn checkpoint_wal_size(mut self, size: u64) -> Self {
        self.checkpoint_wal_size = size;
        self
    }

    /// Sets verification before open.
    #[must_use]
    pub const fn verify_before_open(mut self, value: bool) -> Self {
        self.verify_before_open = value;
        self
    }

    /// Sets verification after open.
    #[must_use]
    pub const fn verify_after_open(mut self, value: bool) -> Self {
        self.verify_after_open = value;
        self
    }

    /// Sets verification before close.
    #[must_use]
    pub const fn verify_before_close(mut self, value: bool) -> Self {
        self.verify_before_close = value;
        self
    }

    /// Sets whether to lock the database file.
    #[must_use]
    pub const fn lock_file(mut self, value: bool) -> Self {
        self.lock_file = value;
        self
    }
}
