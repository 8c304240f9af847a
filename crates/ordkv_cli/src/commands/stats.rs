//! Stats command implementation.

use super::{Format, Target};
use ordkv_storage::{FileBackend, StorageBackend};
use serde::Serialize;

/// Database statistics.
#[derive(Debug, Serialize)]
pub struct StatsResult {
    /// Database path.
    pub path: String,
    /// WAL path.
    pub wal_path: String,
    /// WAL size before opening, in bytes. Non-zero after a crash.
    pub pending_wal_size: u64,
    /// Database file size in bytes.
    pub file_size: u64,
    /// Number of entries.
    pub entries: u64,
    /// Blocks holding entries.
    pub used_blocks: u64,
    /// Bytes in used blocks.
    pub used_bytes: u64,
    /// Reusable blocks.
    pub free_blocks: u64,
    /// Bytes in free blocks.
    pub free_bytes: u64,
    /// What recovery did while opening.
    pub recovery: RecoveryInfo,
}

/// Recovery details from opening the database.
#[derive(Debug, Serialize)]
pub struct RecoveryInfo {
    /// Used blocks decoded.
    pub blocks_scanned: u64,
    /// Stale duplicate entries freed.
    pub duplicates_freed: u64,
    /// Half-written blocks rebuilt from the WAL.
    pub damaged_blocks: u64,
    /// WAL records applied.
    pub records_replayed: u64,
    /// WAL records already in the file.
    pub records_skipped: u64,
    /// Torn bytes cut from the database file.
    pub torn_block_bytes: u64,
    /// Torn bytes cut from the WAL.
    pub torn_wal_bytes: u64,
}

/// Runs the stats command.
pub fn run(target: &Target, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let format = Format::parse(format)?;
    let result = gather(target)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Opens the database and collects its statistics.
pub fn gather(target: &Target) -> Result<StatsResult, Box<dyn std::error::Error>> {
    let wal_path = target.wal_path();
    let pending_wal_size = match FileBackend::open_existing(&wal_path) {
        Ok(backend) => backend.size()?,
        Err(e) if e.is_not_found() => 0,
        Err(e) => return Err(e.into()),
    };

    let db = target.open()?;
    let space = db.verify()?;
    let report = db.recovery_report();
    db.close()?;

    Ok(StatsResult {
        path: target.path().display().to_string(),
        wal_path: wal_path.display().to_string(),
        pending_wal_size,
        file_size: space.total_bytes,
        entries: space.entries,
        used_blocks: space.used_blocks,
        used_bytes: space.used_bytes,
        free_blocks: space.free_blocks,
        free_bytes: space.free_bytes,
        recovery: RecoveryInfo {
            blocks_scanned: report.blocks_scanned,
            duplicates_freed: report.duplicates_freed,
            damaged_blocks: report.damaged_blocks,
            records_replayed: report.records_replayed,
            records_skipped: report.records_skipped,
            torn_block_bytes: report.torn_block_bytes,
            torn_wal_bytes: report.torn_wal_bytes,
        },
    })
}

fn print_text_output(result: &StatsResult) {
    println!("Database: {}", result.path);
    println!("WAL: {} ({} bytes pending)", result.wal_path, result.pending_wal_size);
    println!();
    println!("File size: {} bytes", result.file_size);
    println!("Entries: {}", result.entries);
    println!("Used blocks: {} ({} bytes)", result.used_blocks, result.used_bytes);
    println!("Free blocks: {} ({} bytes)", result.free_blocks, result.free_bytes);
    println!();
    println!("Recovery:");
    let r = &result.recovery;
    println!("  Blocks scanned: {}", r.blocks_scanned);
    println!("  Duplicates freed: {}", r.duplicates_freed);
    if r.damaged_blocks > 0 {
        println!("  Damaged blocks rebuilt: {}", r.damaged_blocks);
    }
    println!("  WAL records replayed: {}", r.records_replayed);
    println!("  WAL records skipped: {}", r.records_skipped);
    if r.torn_block_bytes > 0 || r.torn_wal_bytes > 0 {
        println!(
            "  Torn bytes cut: {} (file), {} (WAL)",
            r.torn_block_bytes, r.torn_wal_bytes
        );
    }
}
