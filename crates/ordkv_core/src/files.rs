//! File naming and locking for on-disk databases.
//!
//! A database is one regular file plus one WAL file in the same directory:
//!
//! ```text
//! <dir>/
//! ├─ data.db                                        # the database
//! └─ .5c1f...e2.wal                                 # its WAL
//! ```
//!
//! The WAL name is a pure function of the database file name, so tooling
//! holding only the database path can always find the log.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Number of hex digits of the name digest kept in a WAL file name.
const WAL_DIGEST_HEX_LEN: usize = 40;

/// Returns the default WAL path for a database at `db_path`.
///
/// The result is `<dir>/.<hex>.wal`, where `<hex>` is the first 40 hex
/// digits of the SHA-256 of the database's file name. The transform is
/// deterministic and stable across versions.
#[must_use]
pub fn wal_name_for(db_path: &Path) -> PathBuf {
    let file_name = db_path.file_name().map_or_else(
        || db_path.as_os_str().as_encoded_bytes().to_vec(),
        |n| n.as_encoded_bytes().to_vec(),
    );
    let digest = Sha256::digest(&file_name);

    let mut name = String::with_capacity(WAL_DIGEST_HEX_LEN + 5);
    name.push('.');
    for byte in digest.iter().take(WAL_DIGEST_HEX_LEN / 2) {
        let _ = write!(name, "{byte:02x}");
    }
    name.push_str(".wal");

    match db_path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Exclusive advisory lock on a database file.
///
/// Held for as long as a handle is open; dropping it releases the lock.
#[derive(Debug)]
pub struct DbLock {
    path: PathBuf,
    file: File,
}

impl DbLock {
    /// Tries to lock the file at `path` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseLocked`] if another handle (in this or
    /// another process) holds the lock.
    pub fn acquire(path: &Path) -> CoreResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Returns the locked path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock.
    pub fn release(self) -> CoreResult<()> {
        FileExt::unlock(&self.file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn wal_name_is_hidden_sibling() {
        let wal = wal_name_for(Path::new("/var/data/test.db"));
        assert_eq!(wal.parent().unwrap(), Path::new("/var/data"));

        let name = wal.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with('.'));
        assert!(name.ends_with(".wal"));
        assert_eq!(name.len(), 1 + WAL_DIGEST_HEX_LEN + 4);
        assert!(name[1..1 + WAL_DIGEST_HEX_LEN]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn wal_name_is_deterministic() {
        let a = wal_name_for(Path::new("dir/one.db"));
        let b = wal_name_for(Path::new("dir/one.db"));
        let c = wal_name_for(Path::new("dir/two.db"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        // Only the file name feeds the digest.
        assert_eq!(
            a.file_name(),
            wal_name_for(Path::new("elsewhere/one.db")).file_name()
        );
    }

    #[test]
    fn lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locked.db");
        std::fs::write(&path, b"").unwrap();

        let lock = DbLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path);
        assert!(matches!(
            DbLock::acquire(&path),
            Err(CoreError::DatabaseLocked)
        ));

        lock.release().unwrap();
        let again = DbLock::acquire(&path).unwrap();
        drop(again);
    }
}
