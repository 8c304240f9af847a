//! # ordkv core
//!
//! Embedded, ordered, durable key-value store.
//!
//! This crate provides:
//! - An ordered map from byte-string keys to byte-string values
//! - A block allocator that keeps the database file compact
//! - A write-ahead log replayed on open for crash recovery
//! - Atomic read-modify-write (`put`, `inc`) and bidirectional enumerators
//! - Whole-database verification
//!
//! ```rust
//! use ordkv_core::{Database, Options};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("data.db");
//!
//! let db = Database::create(&path, Options::default()).unwrap();
//! db.set(b"greeting", b"hello").unwrap();
//! db.close().unwrap();
//!
//! let db = Database::open(&path, Options::default()).unwrap();
//! assert_eq!(db.get(b"greeting").unwrap().unwrap(), &b"hello"[..]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod alloc;
mod config;
mod database;
mod enumerator;
mod error;
pub mod files;
mod lock;
mod recovery;
mod stats;
pub mod store;
mod types;
mod verify;
pub mod wal;

pub use alloc::AllocStats;
pub use config::{Options, DEFAULT_CHECKPOINT_WAL_SIZE};
pub use database::{Database, PutAction, PutOutcome};
pub use enumerator::{Enumerator, Steps};
pub use error::{CoreError, CoreResult, ResolverError};
pub use files::wal_name_for;
pub use lock::KeyLocks;
pub use recovery::RecoveryReport;
pub use stats::{DatabaseStats, StatsSnapshot};
pub use types::{BlockHandle, SequenceNumber};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
