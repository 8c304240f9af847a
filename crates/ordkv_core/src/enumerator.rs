//! Bidirectional cursors over the live key order.
//!
//! An [`Enumerator`] remembers only the last key it yielded, never a
//! position inside the index. Each step asks the index for the nearest key
//! past that one, so concurrent inserts and deletes are tolerated: a key
//! removed behind the cursor is simply skipped, and a key inserted ahead of
//! it shows up when the cursor reaches it.

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use bytes::Bytes;
use std::ops::Bound;

/// A cursor produced by [`Database::seek`], [`Database::seek_first`] or
/// [`Database::seek_last`].
///
/// [`next`](Enumerator::next) and [`prev`](Enumerator::prev) return
/// [`CoreError::EndOfSequence`] once there is nothing further in that
/// direction. Running off one end does not stop the other direction.
///
/// ```rust
/// use ordkv_core::{Database, Options};
///
/// let db = Database::create_mem(Options::default()).unwrap();
/// for key in [b"10", b"20", b"30"] {
///     db.set(key, b"").unwrap();
/// }
///
/// let (mut cursor, found) = db.seek(b"15").unwrap();
/// assert!(!found);
/// assert_eq!(cursor.next().unwrap().0, &b"20"[..]);
/// assert_eq!(cursor.next().unwrap().0, &b"30"[..]);
/// assert!(cursor.next().unwrap_err().is_end_of_sequence());
/// ```
pub struct Enumerator<'db> {
    db: &'db Database,
    /// Next step forward yields the smallest key inside this bound.
    lower: Bound<Bytes>,
    /// Next step backward yields the largest key inside this bound.
    upper: Bound<Bytes>,
    forward_done: bool,
    backward_done: bool,
}

impl<'db> Enumerator<'db> {
    pub(crate) fn at(db: &'db Database, key: Bytes) -> Self {
        Self {
            db,
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
            forward_done: false,
            backward_done: false,
        }
    }

    /// Steps forward.
    ///
    /// The first call after a seek yields the seek key itself if present,
    /// otherwise its successor. Later calls yield the successor of the last
    /// key yielded in either direction.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> CoreResult<(Bytes, Bytes)> {
        if self.forward_done {
            return Err(CoreError::EndOfSequence);
        }
        match self.db.step(true, as_ref(&self.lower))? {
            Some((key, value)) => Ok(self.yielded(key, value)),
            None => {
                self.forward_done = true;
                Err(CoreError::EndOfSequence)
            }
        }
    }

    /// Steps backward. Mirror image of [`Enumerator::next`].
    pub fn prev(&mut self) -> CoreResult<(Bytes, Bytes)> {
        if self.backward_done {
            return Err(CoreError::EndOfSequence);
        }
        match self.db.step(false, as_ref(&self.upper))? {
            Some((key, value)) => Ok(self.yielded(key, value)),
            None => {
                self.backward_done = true;
                Err(CoreError::EndOfSequence)
            }
        }
    }

    /// Consumes the cursor into an iterator stepping forward.
    #[must_use]
    pub fn forward(self) -> Steps<'db> {
        Steps {
            cursor: self,
            forward: true,
            done: false,
        }
    }

    /// Consumes the cursor into an iterator stepping backward.
    #[must_use]
    pub fn backward(self) -> Steps<'db> {
        Steps {
            cursor: self,
            forward: false,
            done: false,
        }
    }

    fn yielded(&mut self, key: Bytes, value: Bytes) -> (Bytes, Bytes) {
        self.lower = Bound::Excluded(key.clone());
        self.upper = Bound::Excluded(key.clone());
        (self.db.hand_out(key), self.db.hand_out(value))
    }
}

impl std::fmt::Debug for Enumerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enumerator")
            .field("lower", &self.lower)
            .field("upper", &self.upper)
            .field("forward_done", &self.forward_done)
            .field("backward_done", &self.backward_done)
            .finish_non_exhaustive()
    }
}

fn as_ref(bound: &Bound<Bytes>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_ref()),
        Bound::Excluded(k) => Bound::Excluded(k.as_ref()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Iterator adapter over an [`Enumerator`].
///
/// Ends quietly at end of sequence. Any other error is yielded once and
/// then the iterator ends.
#[derive(Debug)]
pub struct Steps<'db> {
    cursor: Enumerator<'db>,
    forward: bool,
    done: bool,
}

impl Iterator for Steps<'_> {
    type Item = CoreResult<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = if self.forward {
            self.cursor.next()
        } else {
            self.cursor.prev()
        };
        match step {
            Ok(entry) => Some(Ok(entry)),
            Err(e) => {
                self.done = true;
                if e.is_end_of_sequence() {
                    None
                } else {
                    Some(Err(e))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, Options};

    fn db_with(keys: &[&[u8]]) -> Database {
        let db = Database::create_mem(Options::default()).unwrap();
        for key in keys {
            db.set(key, &[key.len() as u8]).unwrap();
        }
        db
    }

    #[test]
    fn turn_around_does_not_repeat_the_current_key() {
        let db = db_with(&[b"a", b"b", b"c"]);
        let (mut cursor, found) = db.seek(b"b").unwrap();
        assert!(found);
        assert_eq!(cursor.next().unwrap().0, &b"b"[..]);
        assert_eq!(cursor.prev().unwrap().0, &b"a"[..]);
        assert_eq!(cursor.next().unwrap().0, &b"b"[..]);
        assert_eq!(cursor.next().unwrap().0, &b"c"[..]);
    }

    #[test]
    fn directions_end_independently() {
        let db = db_with(&[b"a", b"b"]);
        let mut cursor = db.seek_last().unwrap();
        assert_eq!(cursor.next().unwrap().0, &b"b"[..]);
        assert!(cursor.next().unwrap_err().is_end_of_sequence());
        assert!(cursor.next().unwrap_err().is_end_of_sequence());
        assert_eq!(cursor.prev().unwrap().0, &b"a"[..]);
        assert!(cursor.prev().unwrap_err().is_end_of_sequence());
    }

    #[test]
    fn sees_inserts_ahead_and_skips_deletes() {
        let db = db_with(&[b"a", b"c", b"e"]);
        let mut cursor = db.seek_first().unwrap();
        assert_eq!(cursor.next().unwrap().0, &b"a"[..]);
        db.set(b"b", b"new").unwrap();
        db.delete(b"c").unwrap();
        assert_eq!(cursor.next().unwrap().0, &b"b"[..]);
        assert_eq!(cursor.next().unwrap().0, &b"e"[..]);
    }

    #[test]
    fn iterator_adapters() {
        let db = db_with(&[b"a", b"b", b"c"]);
        let forward: Vec<_> = db
            .seek_first()
            .unwrap()
            .forward()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(forward, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);

        let backward: Vec<_> = db
            .seek_last()
            .unwrap()
            .backward()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(backward, vec![&b"c"[..], &b"b"[..], &b"a"[..]]);
    }

    #[test]
    fn closed_database_stops_the_cursor() {
        let db = db_with(&[b"a", b"b"]);
        let mut cursor = db.seek_first().unwrap();
        cursor.next().unwrap();
        db.close().unwrap();
        assert!(matches!(
            cursor.next(),
            Err(crate::CoreError::DatabaseClosed)
        ));
    }
}
