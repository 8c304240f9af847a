//! Best-fit block allocator with coalescing and tail reclamation.

use super::{
    round_up, BlockHeader, FileHeader, ATOM, BLOCK_HEADER_SIZE, FILE_HEADER_SIZE, MAX_BLOCK_SIZE,
};
use crate::error::{CoreError, CoreResult};
use crate::types::BlockHandle;
use crate::verify::Problems;
use ordkv_storage::StorageBackend;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

const TAIL_PROBE_CHUNK: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockMeta {
    size: u64,
    free: bool,
    payload_len: u64,
}

impl BlockMeta {
    fn from_header(header: &BlockHeader) -> Self {
        Self {
            size: u64::from(header.size),
            free: header.is_free(),
            payload_len: u64::from(header.payload_len),
        }
    }
}

/// Space accounting for a database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocStats {
    /// File size in bytes.
    pub total_bytes: u64,
    /// Blocks holding entries.
    pub used_blocks: u64,
    /// Bytes in used blocks, headers included.
    pub used_bytes: u64,
    /// Reusable blocks.
    pub free_blocks: u64,
    /// Bytes in free blocks.
    pub free_bytes: u64,
    /// Number of entries in the database.
    pub entries: u64,
}

/// What [`BlockAllocator::open`] found on disk.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Every used block with its payload, in file order.
    pub used: Vec<(BlockHandle, Vec<u8>)>,
    /// Bytes of an incomplete final block that were cut off.
    pub torn_tail_bytes: u64,
    /// Free blocks merged into a neighbour or dropped from the tail.
    pub coalesced: usize,
}

/// Hands out, reads and frees blocks of a database file.
///
/// In-memory bookkeeping mirrors the on-disk chain: `blocks` maps every
/// block offset to its geometry and `free_index` orders free blocks by
/// `(size, offset)` for best-fit lookup. Disk is always written before the
/// bookkeeping changes, so an I/O error leaves both in the prior state.
pub struct BlockAllocator {
    backend: Box<dyn StorageBackend>,
    blocks: BTreeMap<u64, BlockMeta>,
    free_index: BTreeSet<(u64, u64)>,
    end: u64,
}

impl BlockAllocator {
    /// Formats an empty backend as a new database.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the backend is not empty, or an I/O error.
    pub fn create(mut backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        if backend.size()? != 0 {
            return Err(CoreError::invalid_format("cannot format a non-empty file"));
        }
        backend.write_at(0, &FileHeader::default().encode())?;
        Ok(Self {
            backend,
            blocks: BTreeMap::new(),
            free_index: BTreeSet::new(),
            end: FILE_HEADER_SIZE,
        })
    }

    /// Opens an existing database file and rebuilds the bookkeeping.
    ///
    /// A final block that was only partly written is cut off, adjacent free
    /// blocks are merged and trailing free space is returned to the file
    /// system, so the returned allocator always satisfies the chain
    /// invariants.
    ///
    /// # Errors
    ///
    /// `InvalidFormat` if the file is not a database, `Corruption` or
    /// `ChecksumMismatch` if the chain is damaged before its tail.
    pub fn open(mut backend: Box<dyn StorageBackend>) -> CoreResult<(Self, ScanReport)> {
        let size = backend.size()?;
        if size < FILE_HEADER_SIZE {
            return Err(CoreError::invalid_format(format!(
                "file too short for header: {size} bytes"
            )));
        }
        FileHeader::decode(&backend.read_at(0, FILE_HEADER_SIZE as usize)?)?;

        let mut report = ScanReport::default();
        let mut blocks = BTreeMap::new();
        let mut offset = FILE_HEADER_SIZE;
        let mut torn = false;

        while offset < size {
            let remaining = size - offset;
            if remaining < BLOCK_HEADER_SIZE {
                torn = true;
                break;
            }
            let raw = backend.read_at(offset, BLOCK_HEADER_SIZE as usize)?;
            let header = match BlockHeader::decode(&raw, offset) {
                Ok(header) => header,
                Err(_) if tail_is_zeroed(backend.as_ref(), offset, size)? => {
                    torn = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            if u64::from(header.size) > remaining {
                torn = true;
                break;
            }

            let meta = BlockMeta::from_header(&header);
            if !meta.free {
                let payload =
                    backend.read_at(offset + BLOCK_HEADER_SIZE, header.payload_len as usize)?;
                report.used.push((BlockHandle::new(offset), payload));
            }
            blocks.insert(offset, meta);
            offset += meta.size;
        }

        if torn {
            warn!(
                offset,
                discarded = size - offset,
                "discarding torn block at end of database file"
            );
            backend.truncate(offset)?;
            report.torn_tail_bytes = size - offset;
        }

        let mut alloc = Self {
            backend,
            blocks,
            free_index: BTreeSet::new(),
            end: offset,
        };
        report.coalesced = alloc.normalize()?;
        Ok((alloc, report))
    }

    /// Merges adjacent free blocks and drops trailing free space.
    fn normalize(&mut self) -> CoreResult<usize> {
        let mut merged = 0;
        let offsets: Vec<u64> = self.blocks.keys().copied().collect();
        let mut run: Option<(u64, u64)> = None;

        for off in offsets {
            let meta = self.blocks[&off];
            if !meta.free {
                self.flush_run(run.take())?;
                continue;
            }
            match run {
                Some((start, run_size)) if can_merge(run_size, meta.size) => {
                    run = Some((start, run_size + meta.size));
                    self.blocks.remove(&off);
                    merged += 1;
                }
                _ => {
                    self.flush_run(run.take())?;
                    run = Some((off, meta.size));
                }
            }
        }
        self.flush_run(run)?;

        let last = self.blocks.iter().next_back().map(|(&off, m)| (off, *m));
        if let Some((last, meta)) = last {
            if meta.free {
                debug!(offset = last, size = meta.size, "trimming trailing free space");
                self.backend.truncate(last)?;
                self.blocks.remove(&last);
                self.end = last;
                merged += 1;
            }
        }

        self.free_index = self
            .blocks
            .iter()
            .filter(|(_, m)| m.free)
            .map(|(&off, m)| (m.size, off))
            .collect();
        Ok(merged)
    }

    fn flush_run(&mut self, run: Option<(u64, u64)>) -> CoreResult<()> {
        let Some((off, size)) = run else {
            return Ok(());
        };
        let meta = self.blocks[&off];
        if meta.size != size {
            self.backend
                .write_at(off, &BlockHeader::free(size as u32).encode())?;
            self.blocks.insert(
                off,
                BlockMeta {
                    size,
                    free: true,
                    payload_len: 0,
                },
            );
        }
        Ok(())
    }

    /// Stores `payload` in a new block and returns its handle.
    ///
    /// Uses the smallest free block that fits, splitting off the unused
    /// remainder, and appends at EOF when nothing fits.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the payload cannot fit any block, or an I/O error.
    pub fn allocate(&mut self, payload: &[u8]) -> CoreResult<BlockHandle> {
        let need = block_size_for(payload.len())?;
        let header_bytes = |size: u64| BlockHeader::used(size as u32, payload.len() as u32).encode();

        let fit = self.free_index.range((need, 0)..).next().copied();
        if let Some((size, off)) = fit {
            let rest = size - need;
            let used_size = if rest >= ATOM { need } else { size };

            // The remainder's header lands inside the old free block, so the
            // chain stays readable until the used header below replaces it.
            if rest >= ATOM {
                self.backend
                    .write_at(off + need, &BlockHeader::free(rest as u32).encode())?;
            }
            let mut buf = Vec::with_capacity(BLOCK_HEADER_SIZE as usize + payload.len());
            buf.extend_from_slice(&header_bytes(used_size));
            buf.extend_from_slice(payload);
            self.backend.write_at(off, &buf)?;

            self.free_index.remove(&(size, off));
            if rest >= ATOM {
                self.blocks.insert(
                    off + need,
                    BlockMeta {
                        size: rest,
                        free: true,
                        payload_len: 0,
                    },
                );
                self.free_index.insert((rest, off + need));
            }
            self.blocks.insert(
                off,
                BlockMeta {
                    size: used_size,
                    free: false,
                    payload_len: payload.len() as u64,
                },
            );
            return Ok(BlockHandle::new(off));
        }

        let off = self.end;
        let mut buf = Vec::with_capacity(need as usize);
        buf.extend_from_slice(&header_bytes(need));
        buf.extend_from_slice(payload);
        buf.resize(need as usize, 0);
        self.backend.write_at(off, &buf)?;

        self.end += need;
        self.blocks.insert(
            off,
            BlockMeta {
                size: need,
                free: false,
                payload_len: payload.len() as u64,
            },
        );
        Ok(BlockHandle::new(off))
    }

    /// Reads the payload of a used block.
    ///
    /// # Errors
    ///
    /// `Corruption` if the handle does not name a used block, or the on-disk
    /// header disagrees with the bookkeeping.
    pub fn read(&self, handle: BlockHandle) -> CoreResult<Vec<u8>> {
        let off = handle.offset();
        let meta = self.used_meta(off)?;
        let mut raw = self
            .backend
            .read_at(off, (BLOCK_HEADER_SIZE + meta.payload_len) as usize)?;
        let header = BlockHeader::decode(&raw, off)?;
        if BlockMeta::from_header(&header) != meta {
            return Err(CoreError::corruption(format!(
                "block {handle} header disagrees with allocator"
            )));
        }
        Ok(raw.split_off(BLOCK_HEADER_SIZE as usize))
    }

    /// Returns a used block to the free pool.
    ///
    /// The block merges with free neighbours; if the result reaches EOF the
    /// file is truncated instead.
    ///
    /// # Errors
    ///
    /// `Corruption` if the handle does not name a used block, or an I/O error.
    pub fn free(&mut self, handle: BlockHandle) -> CoreResult<()> {
        let off = handle.offset();
        let meta = self.used_meta(off)?;

        let mut start = off;
        let mut size = meta.size;

        let next = self
            .blocks
            .get(&(off + meta.size))
            .filter(|n| n.free && can_merge(size, n.size))
            .map(|n| (off + meta.size, n.size));
        if let Some((_, next_size)) = next {
            size += next_size;
        }

        let prev = self
            .blocks
            .range(..off)
            .next_back()
            .filter(|(_, p)| p.free && can_merge(p.size, size))
            .map(|(&p_off, p)| (p_off, p.size));
        if let Some((prev_off, prev_size)) = prev {
            start = prev_off;
            size += prev_size;
        }

        let reaches_eof = start + size == self.end;
        if reaches_eof {
            debug!(offset = start, size, "returning tail block to file system");
            self.backend.truncate(start)?;
        } else {
            self.backend
                .write_at(start, &BlockHeader::free(size as u32).encode())?;
        }

        if let Some((next_off, next_size)) = next {
            self.blocks.remove(&next_off);
            self.free_index.remove(&(next_size, next_off));
        }
        if let Some((prev_off, prev_size)) = prev {
            self.free_index.remove(&(prev_size, prev_off));
        }
        self.blocks.remove(&off);

        if reaches_eof {
            self.blocks.remove(&start);
            self.end = start;
        } else {
            self.blocks.insert(
                start,
                BlockMeta {
                    size,
                    free: true,
                    payload_len: 0,
                },
            );
            self.free_index.insert((size, start));
        }
        Ok(())
    }

    fn used_meta(&self, off: u64) -> CoreResult<BlockMeta> {
        self.blocks
            .get(&off)
            .copied()
            .filter(|m| !m.free)
            .ok_or_else(|| CoreError::corruption(format!("no used block at {off:#x}")))
    }

    /// Flushes and syncs the database file.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        self.backend.sync()?;
        Ok(())
    }

    /// Current file size.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.end
    }

    /// Space accounting from the in-memory bookkeeping.
    #[must_use]
    pub fn stats(&self) -> AllocStats {
        let mut stats = AllocStats {
            total_bytes: self.end,
            ..AllocStats::default()
        };
        for meta in self.blocks.values() {
            if meta.free {
                stats.free_blocks += 1;
                stats.free_bytes += meta.size;
            } else {
                stats.used_blocks += 1;
                stats.used_bytes += meta.size;
            }
        }
        stats.entries = stats.used_blocks;
        stats
    }

    /// Walks the on-disk chain and checks it against the bookkeeping.
    ///
    /// Returns every used block read from disk so the caller can check the
    /// entries they hold. Structural problems go to `problems`; only I/O
    /// failures are returned as errors.
    pub(crate) fn verify(
        &self,
        problems: &mut Problems<'_>,
    ) -> CoreResult<Vec<(BlockHandle, Vec<u8>)>> {
        let mut used = Vec::new();
        let size = self.backend.size()?;

        if size != self.end
            && !problems.report(CoreError::corruption(format!(
                "file size {size} differs from allocator end {}",
                self.end
            )))
        {
            return Ok(used);
        }
        if size < FILE_HEADER_SIZE {
            problems.report(CoreError::corruption(format!(
                "file too short for header: {size} bytes"
            )));
            return Ok(used);
        }
        if let Err(e) = FileHeader::decode(&self.backend.read_at(0, FILE_HEADER_SIZE as usize)?) {
            if !problems.report(e) {
                return Ok(used);
            }
        }

        let mut on_disk = BTreeMap::new();
        let mut offset = FILE_HEADER_SIZE;
        let mut prev: Option<BlockMeta> = None;
        while offset < size {
            let remaining = size - offset;
            if remaining < BLOCK_HEADER_SIZE {
                problems.report(CoreError::corruption(format!(
                    "{remaining} stray bytes after last block at {offset:#x}"
                )));
                break;
            }
            let raw = self.backend.read_at(offset, BLOCK_HEADER_SIZE as usize)?;
            let header = match BlockHeader::decode(&raw, offset) {
                Ok(header) => header,
                Err(e) => {
                    problems.report(e);
                    break;
                }
            };
            let meta = BlockMeta::from_header(&header);
            if meta.size > remaining {
                problems.report(CoreError::corruption(format!(
                    "block at {offset:#x} of size {} runs past EOF",
                    meta.size
                )));
                break;
            }
            if let Some(p) = prev {
                if p.free
                    && meta.free
                    && can_merge(p.size, meta.size)
                    && !problems.report(CoreError::corruption(format!(
                        "adjacent free blocks at {offset:#x}"
                    )))
                {
                    return Ok(used);
                }
            }
            if !meta.free {
                let payload = self
                    .backend
                    .read_at(offset + BLOCK_HEADER_SIZE, meta.payload_len as usize)?;
                used.push((BlockHandle::new(offset), payload));
            }
            on_disk.insert(offset, meta);
            prev = Some(meta);
            offset += meta.size;
        }

        if prev.is_some_and(|p| p.free)
            && !problems.report(CoreError::corruption("trailing free block before EOF"))
        {
            return Ok(used);
        }

        if on_disk != self.blocks {
            let mismatch = on_disk
                .iter()
                .zip(self.blocks.iter())
                .find(|(a, b)| a != b)
                .map(|((&off, _), _)| off);
            let message = match mismatch {
                Some(off) => format!("allocator map disagrees with disk at {off:#x}"),
                None => format!(
                    "allocator map has {} blocks, disk has {}",
                    self.blocks.len(),
                    on_disk.len()
                ),
            };
            if !problems.report(CoreError::corruption(message)) {
                return Ok(used);
            }
        }

        let expected_free: BTreeSet<(u64, u64)> = self
            .blocks
            .iter()
            .filter(|(_, m)| m.free)
            .map(|(&off, m)| (m.size, off))
            .collect();
        if expected_free != self.free_index {
            problems.report(CoreError::corruption(format!(
                "free index holds {} blocks, map holds {}",
                self.free_index.len(),
                expected_free.len()
            )));
        }
        Ok(used)
    }

    /// Returns the backend so tests can damage the file.
    #[cfg(test)]
    pub(crate) fn backend_mut(&mut self) -> &mut dyn StorageBackend {
        self.backend.as_mut()
    }
}

impl std::fmt::Debug for BlockAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAllocator")
            .field("blocks", &self.blocks.len())
            .field("free", &self.free_index.len())
            .field("end", &self.end)
            .finish_non_exhaustive()
    }
}

fn block_size_for(payload_len: usize) -> CoreResult<u64> {
    let need = round_up(BLOCK_HEADER_SIZE + payload_len as u64);
    if need > MAX_BLOCK_SIZE {
        return Err(CoreError::invalid_argument(format!(
            "entry of {payload_len} bytes exceeds the maximum block size"
        )));
    }
    Ok(need)
}

fn can_merge(a: u64, b: u64) -> bool {
    a + b <= MAX_BLOCK_SIZE
}

/// True if every byte from `offset` to `size` is zero, the signature of a
/// file that was extended but whose data never reached the disk.
fn tail_is_zeroed(backend: &dyn StorageBackend, offset: u64, size: u64) -> CoreResult<bool> {
    let mut pos = offset;
    while pos < size {
        let len = (size - pos).min(TAIL_PROBE_CHUNK);
        if backend.read_at(pos, len as usize)?.iter().any(|&b| b != 0) {
            return Ok(false);
        }
        pos += len;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::Problems;
    use ordkv_storage::InMemoryBackend;

    fn fresh() -> BlockAllocator {
        BlockAllocator::create(Box::new(InMemoryBackend::new())).unwrap()
    }

    fn reopen(alloc: BlockAllocator) -> (BlockAllocator, ScanReport) {
        let size = alloc.size() as usize;
        let bytes = alloc.backend.read_at(0, size).unwrap();
        BlockAllocator::open(Box::new(InMemoryBackend::with_data(bytes))).unwrap()
    }

    fn assert_healthy(alloc: &BlockAllocator) {
        let mut log = |e: &CoreError| -> bool { panic!("unexpected problem: {e}") };
        let mut problems = Problems::new(&mut log);
        alloc.verify(&mut problems).unwrap();
        problems.finish(()).unwrap();
    }

    #[test]
    fn empty_file_is_header_only() {
        let alloc = fresh();
        assert_eq!(alloc.size(), FILE_HEADER_SIZE);
        assert_eq!(alloc.stats().entries, 0);
        assert_healthy(&alloc);
    }

    #[test]
    fn allocate_read_free_restores_baseline() {
        let mut alloc = fresh();
        let a = alloc.allocate(b"first payload").unwrap();
        let b = alloc.allocate(&[7u8; 100]).unwrap();
        assert_eq!(a.offset(), FILE_HEADER_SIZE);
        assert_eq!(alloc.read(a).unwrap(), b"first payload");
        assert_eq!(alloc.read(b).unwrap(), vec![7u8; 100]);
        assert_eq!(alloc.size() % ATOM, 0);
        assert_healthy(&alloc);

        alloc.free(a).unwrap();
        assert_eq!(alloc.stats().free_blocks, 1);
        assert_healthy(&alloc);

        alloc.free(b).unwrap();
        assert_eq!(alloc.size(), FILE_HEADER_SIZE);
        assert_eq!(alloc.stats(), AllocStats {
            total_bytes: FILE_HEADER_SIZE,
            ..AllocStats::default()
        });
        assert_healthy(&alloc);
    }

    #[test]
    fn best_fit_splits_free_block() {
        let mut alloc = fresh();
        let big = alloc.allocate(&[1u8; 200]).unwrap();
        let _guard = alloc.allocate(b"keeps the tail used").unwrap();
        alloc.free(big).unwrap();

        let small = alloc.allocate(b"tiny").unwrap();
        assert_eq!(small, big);
        let stats = alloc.stats();
        assert_eq!(stats.used_blocks, 2);
        assert_eq!(stats.free_blocks, 1);
        assert_healthy(&alloc);
    }

    #[test]
    fn freeing_middle_blocks_coalesces() {
        let mut alloc = fresh();
        let handles: Vec<_> = (0..5u8).map(|i| alloc.allocate(&[i; 30]).unwrap()).collect();

        alloc.free(handles[1]).unwrap();
        alloc.free(handles[3]).unwrap();
        assert_eq!(alloc.stats().free_blocks, 2);
        alloc.free(handles[2]).unwrap();
        assert_eq!(alloc.stats().free_blocks, 1);
        assert_healthy(&alloc);

        alloc.free(handles[4]).unwrap();
        assert_eq!(alloc.stats().free_blocks, 0);
        assert_eq!(alloc.size(), handles[1].offset());
        assert_healthy(&alloc);
    }

    #[test]
    fn double_free_is_corruption() {
        let mut alloc = fresh();
        let a = alloc.allocate(b"x").unwrap();
        let _b = alloc.allocate(b"y").unwrap();
        alloc.free(a).unwrap();
        assert!(matches!(alloc.free(a), Err(CoreError::Corruption { .. })));
        assert!(matches!(alloc.read(a), Err(CoreError::Corruption { .. })));
    }

    #[test]
    fn reopen_rebuilds_same_layout() {
        let mut alloc = fresh();
        let a = alloc.allocate(b"one").unwrap();
        let b = alloc.allocate(b"two").unwrap();
        let c = alloc.allocate(b"three").unwrap();
        alloc.free(b).unwrap();
        let before = alloc.stats();

        let (alloc, report) = reopen(alloc);
        assert_eq!(alloc.stats(), before);
        assert_eq!(report.torn_tail_bytes, 0);
        let handles: Vec<_> = report.used.iter().map(|(h, _)| *h).collect();
        assert_eq!(handles, vec![a, c]);
        assert_eq!(report.used[1].1, b"three");
        assert_healthy(&alloc);
    }

    #[test]
    fn torn_tail_block_is_cut_off() {
        let mut alloc = fresh();
        alloc.allocate(b"complete").unwrap();
        let good = alloc.size();
        alloc.allocate(&[9u8; 64]).unwrap();

        let bytes = alloc.backend.read_at(0, (good + 20) as usize).unwrap();
        let (alloc, report) =
            BlockAllocator::open(Box::new(InMemoryBackend::with_data(bytes))).unwrap();
        assert_eq!(report.torn_tail_bytes, 20);
        assert_eq!(alloc.size(), good);
        assert_eq!(report.used.len(), 1);
        assert_healthy(&alloc);
    }

    #[test]
    fn zeroed_tail_is_cut_off() {
        let mut alloc = fresh();
        alloc.allocate(b"complete").unwrap();
        let good = alloc.size();
        let mut bytes = alloc.backend.read_at(0, good as usize).unwrap();
        bytes.extend_from_slice(&[0u8; 48]);

        let (alloc, report) =
            BlockAllocator::open(Box::new(InMemoryBackend::with_data(bytes))).unwrap();
        assert_eq!(report.torn_tail_bytes, 48);
        assert_eq!(alloc.size(), good);
    }

    #[test]
    fn open_merges_adjacent_free_and_trims_tail() {
        let mut bytes = FileHeader::default().encode().to_vec();
        let mut used = BlockHeader::used(32, 4).encode().to_vec();
        used.extend_from_slice(b"data");
        used.resize(32, 0);
        bytes.extend_from_slice(&used);
        for _ in 0..2 {
            let mut free = BlockHeader::free(32).encode().to_vec();
            free.resize(32, 0);
            bytes.extend_from_slice(&free);
        }
        bytes.extend_from_slice(&used);
        let mut free = BlockHeader::free(48).encode().to_vec();
        free.resize(48, 0);
        bytes.extend_from_slice(&free);

        let (alloc, report) =
            BlockAllocator::open(Box::new(InMemoryBackend::with_data(bytes))).unwrap();
        assert_eq!(report.coalesced, 2);
        let stats = alloc.stats();
        assert_eq!(stats.used_blocks, 2);
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free_bytes, 64);
        assert_eq!(alloc.size(), FILE_HEADER_SIZE + 32 + 64 + 32);
        assert_healthy(&alloc);
    }

    #[test]
    fn damaged_block_in_middle_fails_open() {
        let mut alloc = fresh();
        let a = alloc.allocate(b"one").unwrap();
        alloc.allocate(b"two").unwrap();
        alloc.backend_mut().write_at(a.offset() + 5, &[0xEE]).unwrap();

        let bytes = alloc.backend.read_at(0, alloc.size() as usize).unwrap();
        let err = BlockAllocator::open(Box::new(InMemoryBackend::with_data(bytes))).unwrap_err();
        assert!(matches!(err, CoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn verify_reports_damage() {
        let mut alloc = fresh();
        let a = alloc.allocate(b"one").unwrap();
        alloc.allocate(b"two").unwrap();
        alloc.backend_mut().write_at(a.offset() + 5, &[0xEE]).unwrap();

        let mut seen = Vec::new();
        let mut log = |e: &CoreError| {
            seen.push(e.to_string());
            true
        };
        let mut problems = Problems::new(&mut log);
        alloc.verify(&mut problems).unwrap();
        assert!(problems.finish(()).unwrap_err().is_corruption());
        assert!(!seen.is_empty());
    }

    #[test]
    fn oversized_payload_rejected() {
        assert!(matches!(
            block_size_for(MAX_BLOCK_SIZE as usize),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert_eq!(block_size_for(0).unwrap(), 16);
        assert_eq!(block_size_for(1).unwrap(), 32);
    }
}
