//! Verify command implementation.

use super::Target;
use ordkv_core::AllocStats;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Space accounting, when the database opened.
    pub stats: Option<AllocStats>,
    /// Every problem found, in the order found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.stats.is_some() && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(target: &Target) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying database at {:?}", target.path());
    println!();

    let result = check(target);
    if let Some(stats) = &result.stats {
        println!("  Entries: {}", stats.entries);
        println!("  Used blocks: {} ({} bytes)", stats.used_blocks, stats.used_bytes);
        println!("  Free blocks: {} ({} bytes)", stats.free_blocks, stats.free_bytes);
    }
    for error in &result.errors {
        println!("  Error: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Database verification passed");
        Ok(())
    } else {
        println!("✗ Database verification failed");
        Err("Verification failed".into())
    }
}

/// Opens the database with the WAL checked before replay, then verifies
/// the recovered state, collecting every problem.
pub fn check(target: &Target) -> VerifyResult {
    let mut result = VerifyResult::default();
    let db = match ordkv_core::Database::open(
        target.path(),
        target.options().verify_before_open(true),
    ) {
        Ok(db) => db,
        Err(e) => {
            result.errors.push(e.to_string());
            return result;
        }
    };

    let mut errors = Vec::new();
    let outcome = db.verify_with(|problem| {
        errors.push(problem.to_string());
        true
    });
    result.errors = errors;
    match outcome {
        Ok(stats) => result.stats = Some(stats),
        Err(e) if result.errors.is_empty() => result.errors.push(e.to_string()),
        Err(_) => {}
    }
    if let Err(e) = db.close() {
        result.errors.push(e.to_string());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordkv_core::{Database, Options};
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};

    fn populated() -> (tempfile::TempDir, Target) {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::new(dir.path().join("db"), None);
        let db = Database::create(target.path(), Options::default()).unwrap();
        for i in 0..10u8 {
            db.set(&[i], &[i; 20]).unwrap();
        }
        db.close().unwrap();
        (dir, target)
    }

    #[test]
    fn test_clean_database_passes() {
        let (_dir, target) = populated();
        let result = check(&target);
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.stats.unwrap().entries, 10);
        run(&target).unwrap();
    }

    #[test]
    fn test_damaged_entry_fails() {
        let (_dir, target) = populated();
        let mut file = OpenOptions::new().write(true).open(target.path()).unwrap();
        file.seek(SeekFrom::Start(144 + 16 + 16)).unwrap();
        file.write_all(&[0xEE]).unwrap();
        drop(file);

        let result = check(&target);
        assert!(!result.is_ok());
        assert!(!result.errors.is_empty());
        assert!(run(&target).is_err());
    }

    #[test]
    fn test_missing_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = check(&Target::new(dir.path().join("absent"), None));
        assert!(result.stats.is_none());
        assert_eq!(result.errors.len(), 1);
    }
}
