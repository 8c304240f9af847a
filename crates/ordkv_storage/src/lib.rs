//! # ordkv storage
//!
//! The OS file layer underneath the ordkv engine.
//!
//! Backends are **opaque byte stores**: they read, write, append, flush,
//! sync and truncate bytes at offsets. They know nothing about database
//! headers, blocks, entry records or WAL framing; the engine in
//! `ordkv_core` owns every byte of interpretation.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - transient databases and tests
//! - [`FileBackend`] - persistent storage using OS file APIs
//!
//! ## File helpers
//!
//! - [`FileBackend::create_new`] refuses to clobber an existing file
//! - [`FileBackend::open_existing`] refuses missing paths and directories
//! - [`create_unique`] atomically picks a fresh `<prefix>NNN<suffix>` name
//!
//! ## Example
//!
//! ```rust
//! use ordkv_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! backend.write_at(offset, b"HELLO").unwrap();
//! assert_eq!(backend.read_at(offset, 11).unwrap(), b"HELLO world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod unique;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use unique::{create_unique, MAX_UNIQUE_ATTEMPTS};
