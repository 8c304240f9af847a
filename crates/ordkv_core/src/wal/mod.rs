//! Write-Ahead Log (WAL) for durability and crash recovery.
//!
//! Every mutation is appended to the WAL (and synced, unless
//! `sync_on_commit` is off) before it touches the database file. On open the
//! WAL is replayed on top of whatever the database file holds, then cleared
//! by a checkpoint.
//!
//! ## WAL Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! Records are logical: `Set { seq, key, value }` and `Delete { seq, key }`.
//! Replaying a record whose sequence number is not newer than the entry
//! already stored for its key is a no-op, so replay is idempotent.
//!
//! ## Recovery Policy
//!
//! ### Tolerated (treated as clean end of log)
//!
//! - **Truncated header**: fewer than 11 bytes left at the end
//! - **Truncated payload**: record length exceeds the available bytes
//!
//! These are crashes mid-append. The mutation never reported success, so the
//! partial record is discarded.
//!
//! ### Fatal (open fails)
//!
//! - **CRC mismatch** → `ChecksumMismatch`
//! - **Invalid magic**, **unknown record type**, **future version** → `WalCorruption`

mod iterator;
mod record;
mod writer;

pub use iterator::WalRecordIterator;
pub use record::{compute_crc32, WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
pub use writer::{WalManager, WalPosition};

/// Header size for WAL records: magic (4) + version (2) + type (1) + length (4).
pub(crate) const HEADER_SIZE: usize = 11;

/// Trailing CRC size.
pub(crate) const CRC_SIZE: usize = 4;
