//! CLI command implementations.

pub mod create;
pub mod kv;
pub mod scan;
pub mod stats;
pub mod verify;
pub mod wal_dump;

use ordkv_core::{wal_name_for, CoreResult, Database, Options};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the CLI itself, before the engine is involved.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    /// A `--hex` argument was not valid hex.
    #[error("invalid hex: {0:?}")]
    InvalidHex(String),

    /// A requested key is absent.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// An `--format` value other than `text` or `json`.
    #[error("unknown output format: {0:?}")]
    UnknownFormat(String),
}

/// How keys and values are read from arguments and printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// UTF-8 arguments; printed lossily, with non-printable bytes escaped.
    Text,
    /// Lowercase hex both ways.
    Hex,
}

impl Encoding {
    /// Decodes a command-line argument.
    pub fn parse(self, arg: &str) -> Result<Vec<u8>, CliError> {
        match self {
            Self::Text => Ok(arg.as_bytes().to_vec()),
            Self::Hex => hex_decode(arg).ok_or_else(|| CliError::InvalidHex(arg.to_string())),
        }
    }

    /// Renders bytes for output.
    pub fn render(self, bytes: &[u8]) -> String {
        match self {
            Self::Text => bytes.escape_ascii().to_string(),
            Self::Hex => hex_encode(bytes),
        }
    }
}

/// Output format for commands that support `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses a `--format` value.
    pub fn parse(s: &str) -> Result<Self, CliError> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}

/// A database file and where its WAL lives.
#[derive(Debug, Clone)]
pub struct Target {
    path: PathBuf,
    wal: Option<PathBuf>,
}

impl Target {
    /// Creates a target; `wal` overrides the derived WAL name.
    pub fn new(path: PathBuf, wal: Option<PathBuf>) -> Self {
        Self { path, wal }
    }

    /// The database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The WAL file.
    pub fn wal_path(&self) -> PathBuf {
        self.wal.clone().unwrap_or_else(|| wal_name_for(&self.path))
    }

    /// Options for handles on this target.
    pub fn options(&self) -> Options {
        let options = Options::default();
        match &self.wal {
            Some(wal) => options.wal_path(wal.clone()),
            None => options,
        }
    }

    /// Opens the database, running recovery.
    pub fn open(&self) -> CoreResult<Database> {
        Database::open(&self.path, self.options())
    }
}

/// Lowercase hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Decodes hex of either case. `None` on odd length or bad digits.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
