//! Atomic allocation of fresh file names.

use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use rand::Rng;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// How many random names are tried before giving up.
pub const MAX_UNIQUE_ATTEMPTS: usize = 10_000;

/// Creates a new, empty file named `<prefix><random digits><suffix>` in `dir`.
///
/// The random component always sits between `prefix` and `suffix`, so the
/// chosen name never equals the bare `prefix + suffix`. Creation is
/// exclusive: a name that is already taken is never reused, another one is
/// drawn instead. An empty `dir` means the system temporary directory.
///
/// # Errors
///
/// Returns an I/O error if the directory is not writable, or
/// [`StorageError::AlreadyExists`] if every attempt collided.
pub fn create_unique(dir: &Path, prefix: &str, suffix: &str) -> StorageResult<FileBackend> {
    let dir = if dir.as_os_str().is_empty() {
        std::env::temp_dir()
    } else {
        dir.to_path_buf()
    };

    let mut rng = rand::thread_rng();
    let mut last: Option<PathBuf> = None;
    for _ in 0..MAX_UNIQUE_ATTEMPTS {
        let candidate = dir.join(format!("{prefix}{}{suffix}", rng.gen_range(0..1_000_000_000u32)));
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return FileBackend::from_file(&candidate, file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last = Some(candidate),
            Err(e) => return Err(StorageError::Io(e)),
        }
    }

    Err(StorageError::AlreadyExists {
        path: last.unwrap_or(dir),
    })
}
