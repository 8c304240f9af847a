//! Benchmark utilities.

use ordkv_core::{Database, Options};
use rand::Rng;
use tempfile::TempDir;

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// A 16-byte key whose byte order follows `n`.
pub fn key16(n: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[8..].copy_from_slice(&n.to_be_bytes());
    key
}

/// Generate `count` random 16-byte keys.
pub fn random_keys(count: usize) -> Vec<[u8; 16]> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen()).collect()
}

/// Where a benchmark database lives.
#[derive(Debug, Clone, Copy)]
pub enum Backing {
    /// In memory, no WAL.
    Memory,
    /// A file with WAL, without fsync on commit.
    File,
}

/// A database for benchmarking, with its directory kept alive.
pub struct BenchDb {
    /// The handle.
    pub db: Database,
    _dir: Option<TempDir>,
}

impl BenchDb {
    /// Creates an empty database.
    pub fn new(backing: Backing) -> Self {
        match backing {
            Backing::Memory => Self {
                db: Database::create_mem(Options::default()).expect("create memory db"),
                _dir: None,
            },
            Backing::File => {
                let dir = tempfile::tempdir().expect("create temp dir");
                let options = Options::default().sync_on_commit(false);
                let db = Database::create(dir.path().join("bench.db"), options)
                    .expect("create file db");
                Self { db, _dir: Some(dir) }
            }
        }
    }

    /// Creates a database holding `keys`, each with a `value_size` value.
    pub fn populated(backing: Backing, keys: &[[u8; 16]], value_size: usize) -> Self {
        let bench = Self::new(backing);
        let value = random_data(value_size);
        for key in keys {
            bench.db.set(key, &value).expect("populate");
        }
        bench
    }
}
