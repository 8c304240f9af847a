//! # ordkv Testkit
//!
//! Test utilities for ordkv.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based generators and a reference model using proptest
//! - Crash simulation for recovery tests
//! - Stress helpers for concurrent access
//! - On-disk format vectors
//!
//! ## Usage
//!
//! ```rust
//! use ordkv_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     db.set(b"k", b"v").unwrap();
//!     assert_eq!(db.len().unwrap(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
}
