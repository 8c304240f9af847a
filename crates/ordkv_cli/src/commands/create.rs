//! Create command implementation.

use super::Target;
use ordkv_core::Database;
use tracing::info;

/// Runs the create command.
pub fn run(target: &Target) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::create(target.path(), target.options())?;
    let size = db.size()?;
    db.close()?;

    info!(path = %target.path().display(), "created database");
    println!("Created {} ({size} bytes)", target.path().display());
    println!("WAL: {}", target.wal_path().display());
    Ok(())
}
