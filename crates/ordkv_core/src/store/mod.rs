//! The ordered store: an in-memory index over entries persisted in blocks.
//!
//! Every entry lives in exactly one used block as an [`EntryRecord`]. The
//! [`OrderedStore`] keeps keys sorted byte-lexicographically and maps each
//! to its block, the sequence number that wrote it, and a cached copy of
//! the value so reads never touch the file.

mod apply;
mod index;
mod record;

pub(crate) use apply::{remove_entry, write_entry};
pub(crate) use record::encoded_len;

pub use index::{OrderedStore, Slot};
pub use record::{encode_entry, EntryRecord};
