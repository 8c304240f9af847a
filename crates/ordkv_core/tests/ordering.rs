//! Key order, seeks and enumerators.

use bytes::Bytes;
use ordkv_core::{Database, Enumerator, Options};
use std::sync::atomic::{AtomicBool, Ordering};

fn key(n: u64) -> [u8; 8] {
    n.to_be_bytes()
}

fn db_with(keys: &[u64]) -> Database {
    let db = Database::create_mem(Options::default()).unwrap();
    for &n in keys {
        db.set(&key(n), &key(n * 10)).unwrap();
    }
    db
}

/// Raises the flag on drop, so a failed assertion still stops the writer.
struct StopOnDrop<'a>(&'a AtomicBool);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn drain(cursor: &mut Enumerator<'_>, forward: bool) -> Vec<u64> {
    let mut out = Vec::new();
    loop {
        let step = if forward { cursor.next() } else { cursor.prev() };
        match step {
            Ok((k, v)) => {
                let n = u64::from_be_bytes(k[..].try_into().unwrap());
                assert_eq!(v, &key(n * 10)[..]);
                out.push(n);
            }
            Err(e) => {
                assert!(e.is_end_of_sequence(), "unexpected error: {e}");
                return out;
            }
        }
    }
}

#[test]
fn seek_table() {
    let db = db_with(&[10, 20, 30]);

    let cases: &[(u64, bool, &[u64], &[u64])] = &[
        (5, false, &[10, 20, 30], &[]),
        (10, true, &[10, 20, 30], &[10]),
        (15, false, &[20, 30], &[10]),
        (20, true, &[20, 30], &[20, 10]),
        (25, false, &[30], &[20, 10]),
        (30, true, &[30], &[30, 20, 10]),
        (35, false, &[], &[30, 20, 10]),
    ];

    for &(target, want_hit, want_next, want_prev) in cases {
        let (mut cursor, hit) = db.seek(&key(target)).unwrap();
        assert_eq!(hit, want_hit, "seek({target}) hit");
        assert_eq!(drain(&mut cursor, true), want_next, "seek({target}) next");

        let (mut cursor, _) = db.seek(&key(target)).unwrap();
        assert_eq!(drain(&mut cursor, false), want_prev, "seek({target}) prev");
    }
}

#[test]
fn seek_first_and_last() {
    let empty = db_with(&[]);
    assert!(empty.seek_first().unwrap_err().is_not_found());
    assert!(empty.seek_last().unwrap_err().is_not_found());

    let (mut cursor, hit) = empty.seek(b"anything").unwrap();
    assert!(!hit);
    assert!(cursor.next().unwrap_err().is_end_of_sequence());

    let db = db_with(&[3, 1, 2]);
    assert_eq!(drain(&mut db.seek_first().unwrap(), true), vec![1, 2, 3]);
    assert_eq!(drain(&mut db.seek_last().unwrap(), false), vec![3, 2, 1]);
    assert_eq!(drain(&mut db.seek_first().unwrap(), false), vec![1]);
    assert_eq!(drain(&mut db.seek_last().unwrap(), true), vec![3]);
}

#[test]
fn lexicographic_byte_order() {
    let db = Database::create_mem(Options::default()).unwrap();
    for k in [&b"b"[..], b"", b"ab", b"a", b"\xff", b"a\x00"] {
        db.set(k, b"").unwrap();
    }
    let keys: Vec<Bytes> = db
        .seek_first()
        .unwrap()
        .forward()
        .map(|r| r.unwrap().0)
        .collect();
    let expected: Vec<&[u8]> = vec![
        &b""[..],
        &b"a"[..],
        &b"a\x00"[..],
        &b"ab"[..],
        &b"b"[..],
        &b"\xff"[..],
    ];
    assert_eq!(keys, expected);
}

#[test]
fn rewriting_keys_mid_iteration_changes_nothing() {
    const N: u64 = 200;
    let db = db_with(&(0..N).collect::<Vec<_>>());

    let mut cursor = db.seek_first().unwrap();
    let mut seen = Vec::new();
    while let Ok((k, _)) = cursor.next() {
        let n = u64::from_be_bytes(k[..].try_into().unwrap());
        seen.push(n);
        // Rewrite the key just visited and one not visited yet.
        db.set(&key(n), &key(n * 10)).unwrap();
        db.set(&key((n + 7) % N), &key(((n + 7) % N) * 10)).unwrap();
    }
    assert_eq!(seen, (0..N).collect::<Vec<_>>());

    let mut cursor = db.seek_last().unwrap();
    let mut seen = Vec::new();
    while let Ok((k, _)) = cursor.prev() {
        let n = u64::from_be_bytes(k[..].try_into().unwrap());
        seen.push(n);
        db.set(&key(n), &key(n * 10)).unwrap();
    }
    assert_eq!(seen, (0..N).rev().collect::<Vec<_>>());
}

#[test]
fn enumerator_survives_concurrent_writers() {
    const N: u64 = 2_000;
    let db = db_with(&(0..N).map(|n| n * 2).collect::<Vec<_>>());
    let stop = AtomicBool::new(false);

    std::thread::scope(|s| {
        s.spawn(|| {
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let even = (i * 2) % (N * 2);
                db.set(&key(even), &key(even * 10)).unwrap();
                let odd = (i * 2 + 1) % (N * 2);
                db.set(&key(odd), &key(odd * 10)).unwrap();
                db.delete(&key(odd)).unwrap();
                i += 1;
            }
        });
        let _stop = StopOnDrop(&stop);

        for _ in 0..5 {
            let mut cursor = db.seek_first().unwrap();
            let mut last = None;
            let mut evens = 0;
            while let Ok((k, _)) = cursor.next() {
                let n = u64::from_be_bytes(k[..].try_into().unwrap());
                assert!(last.map_or(true, |prev| n > prev), "order violated at {n}");
                last = Some(n);
                if n % 2 == 0 {
                    evens += 1;
                }
            }
            assert_eq!(evens, N);
        }
    });
}
