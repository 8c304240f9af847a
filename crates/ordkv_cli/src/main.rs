//! ordkv CLI
//!
//! Command-line tools for ordkv database files.
//!
//! # Commands
//!
//! - `create` - Create an empty database
//! - `get` / `set` / `delete` / `inc` - Single-key operations
//! - `scan` - Walk keys in order from a starting point
//! - `verify` - Check the file and WAL for corruption
//! - `stats` - Display space accounting and recovery details
//! - `wal-dump` - Dump WAL records for debugging

mod commands;

use clap::{Parser, Subcommand};
use commands::Encoding;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ordkv command-line database tools.
#[derive(Parser)]
#[command(name = "ordkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Explicit WAL location (defaults to the name derived from the path)
    #[arg(global = true, long)]
    wal: Option<PathBuf>,

    /// Read keys and values as hex and print them as hex
    #[arg(global = true, short = 'x', long)]
    hex: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty database
    Create,

    /// Print the value stored under a key
    Get {
        /// The key
        key: String,
    },

    /// Store a value under a key
    Set {
        /// The key
        key: String,
        /// The value
        value: String,
    },

    /// Remove a key
    Delete {
        /// The key
        key: String,
    },

    /// Add to the 8-byte big-endian counter stored under a key
    Inc {
        /// The key
        key: String,
        /// Amount to add
        #[arg(allow_hyphen_values = true, default_value = "1")]
        delta: i64,
    },

    /// Walk entries in key order
    Scan {
        /// Start at this key (default: first key, or last with --reverse)
        #[arg(short, long)]
        from: Option<String>,

        /// Walk backward
        #[arg(short, long)]
        reverse: bool,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify database integrity
    Verify,

    /// Display space accounting and recovery details
    Stats {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump WAL records for debugging
    WalDump {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let encoding = if cli.hex { Encoding::Hex } else { Encoding::Text };
    let target = |command: &str| -> Result<commands::Target, Box<dyn std::error::Error>> {
        let path = cli
            .path
            .clone()
            .ok_or_else(|| format!("Database path required for {command}"))?;
        Ok(commands::Target::new(path, cli.wal.clone()))
    };

    match cli.command {
        Commands::Create => {
            commands::create::run(&target("create")?)?;
        }
        Commands::Get { ref key } => {
            commands::kv::get(&target("get")?, encoding, key)?;
        }
        Commands::Set { ref key, ref value } => {
            commands::kv::set(&target("set")?, encoding, key, value)?;
        }
        Commands::Delete { ref key } => {
            commands::kv::delete(&target("delete")?, encoding, key)?;
        }
        Commands::Inc { ref key, delta } => {
            commands::kv::inc(&target("inc")?, encoding, key, delta)?;
        }
        Commands::Scan {
            ref from,
            reverse,
            limit,
            ref format,
        } => {
            let scan = commands::scan::ScanArgs {
                from: from.as_deref(),
                reverse,
                limit,
            };
            commands::scan::run(&target("scan")?, encoding, &scan, format)?;
        }
        Commands::Verify => {
            commands::verify::run(&target("verify")?)?;
        }
        Commands::Stats { ref format } => {
            commands::stats::run(&target("stats")?, format)?;
        }
        Commands::WalDump { limit, ref format } => {
            commands::wal_dump::run(&target("wal-dump")?, encoding, limit, format)?;
        }
        Commands::Version => {
            println!("ordkv CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ordkv core v{}", ordkv_core::VERSION);
        }
    }

    Ok(())
}
