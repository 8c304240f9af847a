//! Error types for the ordkv engine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// The error a [`crate::Database::put`] resolver may return to abort.
pub type ResolverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in ordkv core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] ordkv_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `create` found a database (or a non-empty WAL) at the target path.
    #[error("already exists: {}", path.display())]
    AlreadyExists {
        /// The path that is already taken.
        path: PathBuf,
    },

    /// The requested thing does not exist.
    ///
    /// Returned by `open` on a missing path and by `seek_first`/`seek_last`
    /// on an empty database. Looking up an absent key is not an error.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked for.
        what: String,
    },

    /// The database file is structurally inconsistent.
    #[error("database corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// WAL is corrupted or invalid.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// An enumerator ran past the end of the key space.
    ///
    /// This is the normal way enumeration terminates.
    #[error("end of sequence")]
    EndOfSequence,

    /// A `put` resolver returned its own error; nothing was written.
    #[error("put resolver aborted: {source}")]
    ResolverAborted {
        /// The resolver's error.
        #[source]
        source: ResolverError,
    },

    /// The target is not an ordkv database.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// An argument was out of range.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Another handle holds the database file lock.
    #[error("database locked: another handle has exclusive access")]
    DatabaseLocked,

    /// The handle has been closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a database corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true for the normal end-of-enumeration signal.
    #[must_use]
    pub fn is_end_of_sequence(&self) -> bool {
        matches!(self, Self::EndOfSequence)
    }

    /// Returns true for `NotFound`, including a missing file reported by
    /// the storage layer.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Returns true for any flavour of detected corruption.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corruption { .. } | Self::WalCorruption { .. } | Self::ChecksumMismatch { .. }
        )
    }
}
