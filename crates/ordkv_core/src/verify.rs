//! Consistency checking.
//!
//! Verification cross-checks every layer against the one below it: the
//! block chain against the allocator's bookkeeping, each entry record's
//! checksum, key uniqueness on disk, the in-memory index against the
//! decoded entries, and every WAL record's checksum.

use crate::alloc::BlockAllocator;
use crate::error::{CoreError, CoreResult};
use crate::store::{EntryRecord, OrderedStore};
use crate::types::{BlockHandle, SequenceNumber};
use crate::wal::WalManager;
use std::collections::BTreeMap;
use tracing::error;

/// Collects problems found during verification.
///
/// Every problem is logged and handed to the caller's callback; the first
/// one becomes the error returned at the end.
pub(crate) struct Problems<'a> {
    log: &'a mut dyn FnMut(&CoreError) -> bool,
    first: Option<CoreError>,
    stopped: bool,
}

impl<'a> Problems<'a> {
    pub(crate) fn new(log: &'a mut dyn FnMut(&CoreError) -> bool) -> Self {
        Self {
            log,
            first: None,
            stopped: false,
        }
    }

    /// Records a problem. Returns `false` once the callback asked to stop.
    pub(crate) fn report(&mut self, problem: CoreError) -> bool {
        if self.stopped {
            return false;
        }
        error!(%problem, "verification found a problem");
        if !(self.log)(&problem) {
            self.stopped = true;
        }
        if self.first.is_none() {
            self.first = Some(problem);
        }
        !self.stopped
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stopped
    }

    /// Returns `value` if nothing was reported, otherwise the first problem.
    pub(crate) fn finish<T>(self, value: T) -> CoreResult<T> {
        match self.first {
            Some(problem) => Err(problem),
            None => Ok(value),
        }
    }
}

/// Runs every check over a quiescent database.
pub(crate) fn verify_database(
    alloc: &BlockAllocator,
    store: &OrderedStore,
    wal: Option<&WalManager>,
    problems: &mut Problems<'_>,
) -> CoreResult<()> {
    let used = alloc.verify(problems)?;
    if problems.stopped() {
        return Ok(());
    }

    let mut on_disk: BTreeMap<Vec<u8>, (BlockHandle, SequenceNumber, Vec<u8>)> = BTreeMap::new();
    for (handle, payload) in used {
        let record = match EntryRecord::decode(&payload) {
            Ok(record) => record,
            Err(e) => {
                if !problems.report(e) {
                    return Ok(());
                }
                continue;
            }
        };
        if let Some((other, _, _)) = on_disk.get(&record.key) {
            if !problems.report(CoreError::corruption(format!(
                "key stored twice, in {other} and {handle}"
            ))) {
                return Ok(());
            }
            continue;
        }
        on_disk.insert(record.key, (handle, record.seq, record.value));
    }

    let indexed = store.snapshot();
    if indexed.len() != on_disk.len()
        && !problems.report(CoreError::corruption(format!(
            "index holds {} keys, file holds {}",
            indexed.len(),
            on_disk.len()
        )))
    {
        return Ok(());
    }
    for (key, slot) in &indexed {
        let agrees = on_disk.get(key.as_ref()).is_some_and(|(handle, seq, value)| {
            *handle == slot.handle && *seq == slot.seq && value.as_slice() == slot.value.as_ref()
        });
        if !agrees
            && !problems.report(CoreError::corruption(format!(
                "index entry at {} does not match the file",
                slot.handle
            )))
        {
            return Ok(());
        }
    }

    if let Some(wal) = wal {
        for result in wal.iter()? {
            if let Err(e) = result {
                problems.report(e);
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_problem_wins() {
        let mut seen = 0;
        let mut log = |_: &CoreError| {
            seen += 1;
            true
        };
        let mut problems = Problems::new(&mut log);
        assert!(problems.report(CoreError::corruption("one")));
        assert!(problems.report(CoreError::wal_corruption("two")));
        let err = problems.finish(()).unwrap_err();
        assert!(matches!(err, CoreError::Corruption { .. }));
        assert_eq!(seen, 2);
    }

    #[test]
    fn callback_can_stop_early() {
        let mut log = |_: &CoreError| false;
        let mut problems = Problems::new(&mut log);
        assert!(!problems.report(CoreError::corruption("one")));
        assert!(problems.stopped());
        assert!(!problems.report(CoreError::corruption("two")));
        assert!(problems.finish(()).is_err());
    }

    #[test]
    fn clean_run_returns_value() {
        let mut log = |_: &CoreError| true;
        let problems = Problems::new(&mut log);
        assert_eq!(problems.finish(7).unwrap(), 7);
    }
}
