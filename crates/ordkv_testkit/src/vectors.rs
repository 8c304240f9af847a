//! On-disk format vectors for ordkv.
//!
//! These pin the byte layout of the file header, entry records, WAL
//! payloads and WAL file names, so a format change cannot slip in unnoticed.
//! Vectors serialize to JSON for use by external tooling.

use serde::{Deserialize, Serialize};

/// A test vector: an input and the bytes it must encode to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Input data (hex-encoded).
    pub input_hex: String,
    /// Expected output data (hex-encoded).
    pub expected_hex: String,
}

impl TestVector {
    fn new(id: &str, description: &str, input: &[u8], expected_hex: &str) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_hex: hex_encode(input),
            expected_hex: expected_hex.into(),
        }
    }

    /// Decoded input bytes.
    pub fn input(&self) -> Vec<u8> {
        hex_decode(&self.input_hex).expect("vector input is valid hex")
    }

    /// Decoded expected bytes.
    pub fn expected(&self) -> Vec<u8> {
        hex_decode(&self.expected_hex).expect("vector output is valid hex")
    }
}

/// File header layout: the first 20 bytes of an empty database.
///
/// Input is unused; the header of a fresh database is fixed.
pub fn header_vectors() -> Vec<TestVector> {
    vec![TestVector::new(
        "header_prefix",
        "magic, version 1, reserved, atom 16, header size 144",
        b"",
        "4f52444b56000001\
         0100\
         0000\
         10000000\
         90000000",
    )]
}

/// Entry record bodies (without the trailing CRC) for `seq = 1`.
///
/// Input is `key_len u8 | key | value`.
pub fn entry_vectors() -> Vec<TestVector> {
    vec![
        TestVector::new(
            "entry_k_v",
            "key 'k', value 'v'",
            b"\x01kv",
            "0100000000000000\
             01000000\
             01000000\
             6b\
             76",
        ),
        TestVector::new(
            "entry_empty",
            "empty key, empty value",
            b"\x00",
            "0100000000000000\
             00000000\
             00000000",
        ),
    ]
}

/// WAL record payloads (without envelope).
///
/// Input is `kind | seq u8 | key_len u8 | key | value`, where kind is `S`
/// for set and `D` for delete.
pub fn wal_payload_vectors() -> Vec<TestVector> {
    vec![
        TestVector::new(
            "wal_set",
            "set seq 1, key 'k', value 'v'",
            b"S\x01\x01kv",
            "0100000000000000\
             01000000\
             6b\
             01000000\
             76",
        ),
        TestVector::new(
            "wal_delete",
            "delete seq 2, key 'k'",
            b"D\x02\x01k",
            "0200000000000000\
             01000000\
             6b",
        ),
    ]
}

/// Default WAL file names. Input is the database file name; expected is
/// the WAL file name as ASCII.
pub fn wal_name_vectors() -> Vec<TestVector> {
    vec![TestVector::new(
        "wal_name_abc",
        "first 40 hex digits of sha256(\"abc\")",
        b"abc",
        &hex_encode(b".ba7816bf8f01cfea414140de5dae2223b00361a3.wal"),
    )]
}

/// Every vector.
pub fn all_vectors() -> Vec<TestVector> {
    let mut all = header_vectors();
    all.extend(entry_vectors());
    all.extend(wal_payload_vectors());
    all.extend(wal_name_vectors());
    all
}

/// Serializes vectors to pretty JSON.
pub fn vectors_to_json(vectors: &[TestVector]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(vectors)
}

/// Parses vectors from JSON.
pub fn vectors_from_json(json: &str) -> serde_json::Result<Vec<TestVector>> {
    serde_json::from_str(json)
}

/// Lowercase hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes lowercase or uppercase hex. `None` on odd length or bad digits.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
