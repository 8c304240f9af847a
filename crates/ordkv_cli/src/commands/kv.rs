//! Single-key commands: get, set, delete and inc.

use super::{CliError, Encoding, Target};
use tracing::debug;

/// Runs the get command. A missing key is an error so scripts can test the
/// exit status.
pub fn get(target: &Target, encoding: Encoding, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let key = encoding.parse(key)?;
    let db = target.open()?;
    let value = db.get(&key)?;
    db.close()?;

    match value {
        Some(value) => {
            println!("{}", encoding.render(&value));
            Ok(())
        }
        None => Err(CliError::KeyNotFound(encoding.render(&key)).into()),
    }
}

/// Runs the set command.
pub fn set(
    target: &Target,
    encoding: Encoding,
    key: &str,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = encoding.parse(key)?;
    let value = encoding.parse(value)?;
    let db = target.open()?;
    db.set(&key, &value)?;
    db.close()?;
    debug!(key_len = key.len(), value_len = value.len(), "set");
    Ok(())
}

/// Runs the delete command. Deleting an absent key succeeds.
pub fn delete(target: &Target, encoding: Encoding, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let key = encoding.parse(key)?;
    let db = target.open()?;
    db.delete(&key)?;
    db.close()?;
    Ok(())
}

/// Runs the inc command and prints the new counter value.
pub fn inc(
    target: &Target,
    encoding: Encoding,
    key: &str,
    delta: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = encoding.parse(key)?;
    let db = target.open()?;
    let value = db.inc(&key, delta)?;
    db.close()?;
    println!("{value}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordkv_core::{Database, Options};

    fn fresh() -> (tempfile::TempDir, Target) {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::new(dir.path().join("db"), None);
        Database::create(target.path(), Options::default())
            .unwrap()
            .close()
            .unwrap();
        (dir, target)
    }

    #[test]
    fn test_set_get_delete() {
        let (_dir, target) = fresh();
        set(&target, Encoding::Text, "k", "v").unwrap();
        get(&target, Encoding::Text, "k").unwrap();

        delete(&target, Encoding::Text, "k").unwrap();
        let err = get(&target, Encoding::Text, "k").unwrap_err();
        assert_eq!(err.to_string(), "key not found: k");

        delete(&target, Encoding::Text, "k").unwrap();
    }

    #[test]
    fn test_hex_arguments() {
        let (_dir, target) = fresh();
        set(&target, Encoding::Hex, "00ff", "0102").unwrap();

        let db = target.open().unwrap();
        assert_eq!(db.get(&[0x00, 0xff]).unwrap().unwrap(), &[1u8, 2][..]);
        db.close().unwrap();

        assert!(set(&target, Encoding::Hex, "zz", "00").is_err());
    }

    #[test]
    fn test_inc_persists() {
        let (_dir, target) = fresh();
        inc(&target, Encoding::Text, "n", 5).unwrap();
        inc(&target, Encoding::Text, "n", -2).unwrap();

        let db = target.open().unwrap();
        assert_eq!(db.inc(b"n", 0).unwrap(), 3);
    }

    #[test]
    fn test_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::new(dir.path().join("absent"), None);
        assert!(get(&target, Encoding::Text, "k").is_err());
        assert!(!dir.path().join("absent").exists());
    }
}
