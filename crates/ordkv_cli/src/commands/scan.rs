//! Scan command implementation.

use super::{Encoding, Format, Target};
use ordkv_core::{CoreResult, Database};
use serde::Serialize;

/// What to walk.
#[derive(Debug, Clone, Default)]
pub struct ScanArgs<'a> {
    /// Starting key; `None` starts at an end of the key space.
    pub from: Option<&'a str>,
    /// Walk from larger to smaller keys.
    pub reverse: bool,
    /// Stop after this many entries.
    pub limit: Option<usize>,
}

/// One entry in scan output.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ScanEntry {
    /// Rendered key.
    pub key: String,
    /// Rendered value.
    pub value: String,
}

/// Runs the scan command.
pub fn run(
    target: &Target,
    encoding: Encoding,
    args: &ScanArgs<'_>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = Format::parse(format)?;
    let from = args.from.map(|k| encoding.parse(k)).transpose()?;

    let db = target.open()?;
    let entries = collect(&db, from.as_deref(), args.reverse, args.limit)?;
    db.close()?;

    let entries: Vec<ScanEntry> = entries
        .iter()
        .map(|(k, v)| ScanEntry {
            key: encoding.render(k),
            value: encoding.render(v),
        })
        .collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        Format::Text => {
            for entry in &entries {
                println!("{}\t{}", entry.key, entry.value);
            }
        }
    }
    Ok(())
}

/// Collects up to `limit` entries starting at `from`.
///
/// Forward scans start at the smallest key `>= from`; reverse scans at the
/// largest key `<= from`.
pub fn collect(
    db: &Database,
    from: Option<&[u8]>,
    reverse: bool,
    limit: Option<usize>,
) -> CoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
    if db.is_empty()? {
        return Ok(Vec::new());
    }

    let cursor = match from {
        Some(key) => db.seek(key)?.0,
        None if reverse => db.seek_last()?,
        None => db.seek_first()?,
    };
    let steps = if reverse {
        cursor.backward()
    } else {
        cursor.forward()
    };

    steps
        .take(limit.unwrap_or(usize::MAX))
        .map(|step| step.map(|(k, v)| (k.to_vec(), v.to_vec())))
        .collect()
}
