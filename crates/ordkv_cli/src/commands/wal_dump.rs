//! WAL dump command implementation.
//!
//! Reads the log without opening the database, so records left behind by a
//! crash can be inspected before recovery replays and clears them.

use super::{Encoding, Format, Target};
use ordkv_core::wal::{WalManager, WalRecord};
use ordkv_storage::FileBackend;
use serde::Serialize;

/// WAL record representation for output.
#[derive(Debug, Serialize)]
pub struct WalRecordInfo {
    /// Offset in the WAL file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Sequence number.
    pub seq: u64,
    /// Rendered key.
    pub key: String,
    /// Value size in bytes (set records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
}

/// Everything read from one WAL.
#[derive(Debug, Serialize)]
pub struct WalDump {
    /// Complete records, in log order.
    pub records: Vec<WalRecordInfo>,
    /// WAL size in bytes.
    pub total_size: u64,
    /// Offset just past the last complete record read.
    pub valid_end: u64,
    /// The corruption that stopped reading, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the wal-dump command.
pub fn run(
    target: &Target,
    encoding: Encoding,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = Format::parse(format)?;
    let dump = read_wal(target, encoding, limit)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&dump)?),
        Format::Text => print_text_output(&dump),
    }
    Ok(())
}

/// Reads up to `limit` records from the target's WAL.
pub fn read_wal(
    target: &Target,
    encoding: Encoding,
    limit: Option<usize>,
) -> Result<WalDump, Box<dyn std::error::Error>> {
    let backend = FileBackend::open_existing(&target.wal_path())?;
    let wal = WalManager::new(Box::new(backend), false);
    let max_records = limit.unwrap_or(usize::MAX);

    let mut iter = wal.iter()?;
    let mut records = Vec::new();
    let mut error = None;
    while records.len() < max_records {
        match iter.next() {
            Some(Ok((offset, record))) => records.push(describe(offset, &record, encoding)),
            Some(Err(e)) => {
                error = Some(e.to_string());
                break;
            }
            None => break,
        }
    }

    Ok(WalDump {
        records,
        total_size: iter.total_size(),
        valid_end: iter.valid_end(),
        error,
    })
}

fn describe(offset: u64, record: &WalRecord, encoding: Encoding) -> WalRecordInfo {
    let (record_type, value_size) = match record {
        WalRecord::Set { value, .. } => ("SET", Some(value.len())),
        WalRecord::Delete { .. } => ("DELETE", None),
    };
    WalRecordInfo {
        offset,
        record_type: record_type.to_string(),
        seq: record.seq().as_u64(),
        key: encoding.render(record.key()),
        value_size,
    }
}

fn print_text_output(dump: &WalDump) {
    println!("WAL Records ({} total)", dump.records.len());
    println!("================");
    println!();

    for record in &dump.records {
        print!(
            "[{:08}] {:6} seq={} key={}",
            record.offset, record.record_type, record.seq, record.key
        );
        if let Some(size) = record.value_size {
            print!(" value={size} bytes");
        }
        println!();
    }

    if let Some(error) = &dump.error {
        println!();
        println!("Stopped at offset {}: {error}", dump.valid_end);
    } else if dump.valid_end < dump.total_size {
        println!();
        println!(
            "{} trailing bytes after offset {}",
            dump.total_size - dump.valid_end,
            dump.valid_end
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordkv_core::SequenceNumber;

    fn write_wal(target: &Target, records: &[WalRecord]) {
        let backend = FileBackend::open(&target.wal_path()).unwrap();
        let wal = WalManager::new(Box::new(backend), false);
        for record in records {
            wal.append(record).unwrap();
        }
        wal.sync().unwrap();
    }

    fn sample() -> Vec<WalRecord> {
        vec![
            WalRecord::Set {
                seq: SequenceNumber::new(1),
                key: b"a".to_vec(),
                value: b"hello".to_vec(),
            },
            WalRecord::Delete {
                seq: SequenceNumber::new(2),
                key: b"a".to_vec(),
            },
        ]
    }

    #[test]
    fn test_read_records() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::new(dir.path().join("db"), None);
        write_wal(&target, &sample());

        let dump = read_wal(&target, Encoding::Text, None).unwrap();
        assert_eq!(dump.records.len(), 2);
        assert_eq!(dump.records[0].record_type, "SET");
        assert_eq!(dump.records[0].value_size, Some(5));
        assert_eq!(dump.records[1].record_type, "DELETE");
        assert_eq!(dump.records[1].seq, 2);
        assert_eq!(dump.valid_end, dump.total_size);
        assert!(dump.error.is_none());
    }

    #[test]
    fn test_limit() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::new(dir.path().join("db"), None);
        write_wal(&target, &sample());

        let dump = read_wal(&target, Encoding::Hex, Some(1)).unwrap();
        assert_eq!(dump.records.len(), 1);
        assert_eq!(dump.records[0].key, "61");
    }

    #[test]
    fn test_torn_tail_reported() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::new(dir.path().join("db"), None);
        write_wal(&target, &sample());

        let wal_path = target.wal_path();
        let len = std::fs::metadata(&wal_path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&wal_path).unwrap();
        file.set_len(len - 3).unwrap();

        let dump = read_wal(&target, Encoding::Text, None).unwrap();
        assert_eq!(dump.records.len(), 1);
        assert!(dump.valid_end < dump.total_size);
        assert!(dump.error.is_none());
    }

    #[test]
    fn test_missing_wal() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::new(dir.path().join("db"), None);
        assert!(read_wal(&target, Encoding::Text, None).is_err());
    }
}
