//! Boundary-tag heap over a fixed arena.
//!
//! Block layout (all offsets relative to the arena start):
//!
//! ```text
//! | header u64 | payload ...                          | footer u64 |
//!   size|USED    (free blocks: next u64, prev u64)      == header
//! ```
//!
//! Sizes include both tags and are multiples of [`ALIGN`]. The first block
//! starts at offset 8, so every payload offset is 16-aligned. Free blocks
//! form an explicit doubly-linked list threaded through their payloads.
//! Neighbouring free blocks are merged on release, so two free blocks are
//! never physically adjacent.

use rlibc_membrane::metrics::{RuntimeMetrics, global_metrics};
use thiserror::Error;

use crate::error::AllocError;

/// Payload alignment and size granularity.
pub const ALIGN: usize = 16;

/// Smallest block: both tags plus the two free-list links.
pub const MIN_BLOCK: usize = 32;

const TAG: usize = 8;
const OVERHEAD: usize = 2 * TAG;
const USED: u64 = 1;
const FLAG_MASK: u64 = (ALIGN as u64) - 1;
const NIL: u64 = u64::MAX;

/// A structural inconsistency found by [`Heap::check_invariants`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("heap corruption at offset {offset:#x}: {reason}")]
pub struct HeapCorruption {
    pub offset: usize,
    pub reason: &'static str,
}

/// First-fit heap with eager coalescing.
///
/// Addresses handed out are payload offsets into the storage; the caller
/// turns them into pointers if it needs to.
#[derive(Debug)]
pub struct Heap<S> {
    storage: S,
    start: usize,
    end: usize,
    free_head: u64,
    live: usize,
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> Heap<S> {
    /// Format `storage` as a single free block.
    pub fn new(storage: S) -> Result<Self, AllocError> {
        let len = storage.as_ref().len();
        if len < TAG + MIN_BLOCK {
            return Err(AllocError::ArenaTooSmall(len));
        }
        let start = TAG;
        let end = start + (len - start) / ALIGN * ALIGN;
        let mut heap = Self {
            storage,
            start,
            end,
            free_head: NIL,
            live: 0,
        };
        heap.set_tags(start, end - start, false);
        heap.push_free(start);
        Ok(heap)
    }

    /// Allocate at least `size` bytes. Never grows the arena.
    pub fn allocate(&mut self, size: usize) -> Result<usize, AllocError> {
        let need = block_size_for(size)?;
        let mut cur = self.free_head;
        while cur != NIL {
            let block = cur as usize;
            let have = self.block_size(block);
            if have >= need {
                self.unlink_free(block);
                self.carve(block, have, need);
                self.live += 1;
                RuntimeMetrics::inc(&global_metrics().allocations);
                return Ok(block + TAG);
            }
            cur = self.next_free(block);
        }
        RuntimeMetrics::inc(&global_metrics().alloc_failures);
        Err(AllocError::OutOfMemory { requested: size })
    }

    /// `calloc`: allocate `count * size` zeroed bytes.
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<usize, AllocError> {
        let total = count.checked_mul(size).ok_or(AllocError::SizeOverflow)?;
        let addr = self.allocate(total)?;
        self.storage.as_mut()[addr..addr + total].fill(0);
        Ok(addr)
    }

    /// Return a block to the heap, merging it with free neighbours.
    ///
    /// An address that is not a live allocation is rejected and the heap
    /// is left as it was.
    pub fn release(&mut self, addr: usize) -> Result<(), AllocError> {
        let Some(mut block) = self.live_block(addr) else {
            RuntimeMetrics::inc(&global_metrics().invalid_frees);
            return Err(AllocError::InvalidPointer(addr));
        };
        let mut size = self.block_size(block);
        self.set_tags(block, size, false);

        let next = block + size;
        if next < self.end && !self.is_used(next) {
            self.unlink_free(next);
            size += self.block_size(next);
        }
        if block > self.start {
            let prev_footer = self.read_word(block - TAG);
            if prev_footer & USED == 0 {
                let prev_size = (prev_footer & !FLAG_MASK) as usize;
                block -= prev_size;
                self.unlink_free(block);
                size += prev_size;
            }
        }
        self.set_tags(block, size, false);
        self.push_free(block);
        self.live -= 1;
        RuntimeMetrics::inc(&global_metrics().frees);
        Ok(())
    }

    /// `realloc`. `None` allocates; a zero size releases and returns
    /// `None`. On failure the original allocation is untouched.
    pub fn resize(&mut self, addr: Option<usize>, size: usize) -> Result<Option<usize>, AllocError> {
        let Some(addr) = addr else {
            return self.allocate(size).map(Some);
        };
        if size == 0 {
            self.release(addr)?;
            return Ok(None);
        }
        let block = self.live_block(addr).ok_or(AllocError::InvalidPointer(addr))?;
        let have = self.block_size(block);
        let need = block_size_for(size)?;

        if need <= have {
            if have - need >= MIN_BLOCK {
                self.set_tags(block, need, true);
                self.free_tail(block + need, have - need);
            }
            return Ok(Some(addr));
        }

        let next = block + have;
        if next < self.end && !self.is_used(next) && have + self.block_size(next) >= need {
            let total = have + self.block_size(next);
            self.unlink_free(next);
            self.carve(block, total, need);
            return Ok(Some(addr));
        }

        let moved = self.allocate(size)?;
        let keep = (have - OVERHEAD).min(size);
        self.storage.as_mut().copy_within(addr..addr + keep, moved);
        self.release(addr)?;
        Ok(Some(moved))
    }

    /// Usable bytes behind a live address.
    pub fn usable_size(&self, addr: usize) -> Option<usize> {
        self.live_block(addr).map(|b| self.block_size(b) - OVERHEAD)
    }

    /// The payload of a live allocation.
    pub fn payload(&self, addr: usize) -> Option<&[u8]> {
        let usable = self.usable_size(addr)?;
        Some(&self.storage.as_ref()[addr..addr + usable])
    }

    pub fn payload_mut(&mut self, addr: usize) -> Option<&mut [u8]> {
        let usable = self.usable_size(addr)?;
        Some(&mut self.storage.as_mut()[addr..addr + usable])
    }

    /// Largest request that could succeed on an empty heap.
    pub fn max_allocation(&self) -> usize {
        self.end - self.start - OVERHEAD
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn free_block_count(&self) -> usize {
        self.free_blocks().count()
    }

    /// Usable size of the largest free block, 0 when the heap is full.
    pub fn largest_free_block(&self) -> usize {
        self.free_blocks()
            .map(|b| self.block_size(b) - OVERHEAD)
            .max()
            .unwrap_or(0)
    }

    /// Walk every block and the free list, checking tags, coverage,
    /// coalescing and list links.
    pub fn check_invariants(&self) -> Result<(), HeapCorruption> {
        let corrupt = |offset, reason| Err(HeapCorruption { offset, reason });
        let mut block = self.start;
        let mut prev_free = false;
        let mut free_seen = 0usize;
        let mut used_seen = 0usize;
        while block < self.end {
            let header = self.read_word(block);
            let size = (header & !FLAG_MASK) as usize;
            if header & FLAG_MASK & !USED != 0 {
                return corrupt(block, "reserved header bits set");
            }
            if size < MIN_BLOCK || block + size > self.end {
                return corrupt(block, "block size out of range");
            }
            if self.read_word(block + size - TAG) != header {
                return corrupt(block, "footer does not match header");
            }
            let free = header & USED == 0;
            if free && prev_free {
                return corrupt(block, "adjacent free blocks");
            }
            if free {
                free_seen += 1;
            } else {
                used_seen += 1;
            }
            prev_free = free;
            block += size;
        }
        if block != self.end {
            return corrupt(block, "blocks do not cover the arena");
        }
        if used_seen != self.live {
            return corrupt(self.start, "live count disagrees with used blocks");
        }

        let mut listed = 0usize;
        let mut prev = NIL;
        let mut cur = self.free_head;
        while cur != NIL {
            let b = cur as usize;
            if b < self.start || b >= self.end || listed > free_seen {
                return corrupt(b, "free list leaves the arena or loops");
            }
            if self.is_used(b) {
                return corrupt(b, "used block on the free list");
            }
            if self.prev_free(b) != prev {
                return corrupt(b, "free list back link mismatch");
            }
            listed += 1;
            prev = cur;
            cur = self.next_free(b);
        }
        if listed != free_seen {
            return corrupt(self.start, "free block missing from the free list");
        }
        Ok(())
    }

    /// The whole arena.
    pub fn bytes(&self) -> &[u8] {
        self.storage.as_ref()
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.storage.as_mut()
    }

    // --- block helpers ---

    /// Mark `block` (of `have` bytes) used at `need` bytes, returning any
    /// large enough remainder to the free list.
    fn carve(&mut self, block: usize, have: usize, need: usize) {
        if have - need >= MIN_BLOCK {
            self.set_tags(block, need, true);
            let rest = block + need;
            self.set_tags(rest, have - need, false);
            self.push_free(rest);
        } else {
            self.set_tags(block, have, true);
        }
    }

    /// Free a tail split off a shrinking block, merging with the block
    /// after it if that one is free.
    fn free_tail(&mut self, tail: usize, mut size: usize) {
        let after = tail + size;
        if after < self.end && !self.is_used(after) {
            self.unlink_free(after);
            size += self.block_size(after);
        }
        self.set_tags(tail, size, false);
        self.push_free(tail);
    }

    /// Header offset of the live block behind payload `addr`.
    fn live_block(&self, addr: usize) -> Option<usize> {
        if addr % ALIGN != 0 || addr < self.start + TAG || addr >= self.end {
            return None;
        }
        let block = addr - TAG;
        let header = self.read_word(block);
        if header & FLAG_MASK != USED {
            return None;
        }
        let size = (header & !FLAG_MASK) as usize;
        if size < MIN_BLOCK || block + size > self.end {
            return None;
        }
        (self.read_word(block + size - TAG) == header).then_some(block)
    }

    fn free_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        let mut cur = self.free_head;
        std::iter::from_fn(move || {
            (cur != NIL).then(|| {
                let b = cur as usize;
                cur = self.next_free(b);
                b
            })
        })
    }

    fn block_size(&self, block: usize) -> usize {
        (self.read_word(block) & !FLAG_MASK) as usize
    }

    fn is_used(&self, block: usize) -> bool {
        self.read_word(block) & USED != 0
    }

    fn set_tags(&mut self, block: usize, size: usize, used: bool) {
        let tag = size as u64 | u64::from(used);
        self.write_word(block, tag);
        self.write_word(block + size - TAG, tag);
    }

    fn next_free(&self, block: usize) -> u64 {
        self.read_word(block + TAG)
    }

    fn prev_free(&self, block: usize) -> u64 {
        self.read_word(block + 2 * TAG)
    }

    fn push_free(&mut self, block: usize) {
        let head = self.free_head;
        self.write_word(block + TAG, head);
        self.write_word(block + 2 * TAG, NIL);
        if head != NIL {
            self.write_word(head as usize + 2 * TAG, block as u64);
        }
        self.free_head = block as u64;
    }

    fn unlink_free(&mut self, block: usize) {
        let next = self.next_free(block);
        let prev = self.prev_free(block);
        if prev == NIL {
            self.free_head = next;
        } else {
            self.write_word(prev as usize + TAG, next);
        }
        if next != NIL {
            self.write_word(next as usize + 2 * TAG, prev);
        }
    }

    fn read_word(&self, at: usize) -> u64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.storage.as_ref()[at..at + TAG]);
        u64::from_ne_bytes(word)
    }

    fn write_word(&mut self, at: usize, value: u64) {
        self.storage.as_mut()[at..at + TAG].copy_from_slice(&value.to_ne_bytes());
    }
}

/// Block size for a request: payload plus tags, rounded up to [`ALIGN`].
fn block_size_for(size: usize) -> Result<usize, AllocError> {
    let padded = size
        .checked_add(OVERHEAD + ALIGN - 1)
        .ok_or(AllocError::SizeOverflow)?;
    Ok((padded & !(ALIGN - 1)).max(MIN_BLOCK))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap(len: usize) -> Heap<Vec<u8>> {
        Heap::new(vec![0u8; len]).unwrap()
    }

    #[test]
    fn test_tiny_arena_rejected() {
        assert_eq!(
            Heap::new(vec![0u8; 16]).unwrap_err(),
            AllocError::ArenaTooSmall(16)
        );
    }

    #[test]
    fn test_fresh_heap_is_one_free_block() {
        let h = heap(1024);
        assert_eq!(h.free_block_count(), 1);
        assert_eq!(h.largest_free_block(), h.max_allocation());
        assert_eq!(h.max_allocation(), 1008 - 16);
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_addresses_are_aligned_and_distinct() {
        let mut h = heap(4096);
        let a = h.allocate(1).unwrap();
        let b = h.allocate(17).unwrap();
        let c = h.allocate(0).unwrap();
        for addr in [a, b, c] {
            assert_eq!(addr % ALIGN, 0);
        }
        assert!(a != b && b != c && a != c);
        assert!(h.usable_size(b).unwrap() >= 17);
        assert_eq!(h.live_count(), 3);
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_payloads_do_not_overlap() {
        let mut h = heap(4096);
        let a = h.allocate(40).unwrap();
        let b = h.allocate(40).unwrap();
        h.payload_mut(a).unwrap().fill(0xaa);
        h.payload_mut(b).unwrap().fill(0xbb);
        assert!(h.payload(a).unwrap().iter().all(|&x| x == 0xaa));
        assert!(h.payload(b).unwrap().iter().all(|&x| x == 0xbb));
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_release_coalesces_both_sides() {
        let mut h = heap(4096);
        let a = h.allocate(64).unwrap();
        let b = h.allocate(64).unwrap();
        let c = h.allocate(64).unwrap();
        h.release(a).unwrap();
        h.release(c).unwrap();
        assert_eq!(h.free_block_count(), 2);
        h.release(b).unwrap();
        assert_eq!(h.free_block_count(), 1);
        assert_eq!(h.largest_free_block(), h.max_allocation());
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_full_arena_reuse() {
        let mut h = heap(2048);
        let max = h.max_allocation();
        let whole = h.allocate(max).unwrap();
        assert!(matches!(h.allocate(1), Err(AllocError::OutOfMemory { requested: 1 })));
        h.release(whole).unwrap();
        let again = h.allocate(max).unwrap();
        assert_eq!(again, whole);
    }

    #[test]
    fn test_fill_release_all_then_max_succeeds() {
        let mut h = heap(8192);
        let mut addrs = Vec::new();
        while let Ok(a) = h.allocate(100) {
            addrs.push(a);
        }
        assert!(!addrs.is_empty());
        // Release in an interleaved order to exercise both merge directions.
        for a in addrs.iter().step_by(2) {
            h.release(*a).unwrap();
        }
        for a in addrs.iter().skip(1).step_by(2) {
            h.release(*a).unwrap();
        }
        h.check_invariants().unwrap();
        assert_eq!(h.free_block_count(), 1);
        assert!(h.allocate(h.max_allocation()).is_ok());
    }

    #[test]
    fn test_oversized_request_fails() {
        let mut h = heap(1024);
        let max = h.max_allocation();
        assert!(h.allocate(max + 1).is_err());
        assert_eq!(h.allocate(usize::MAX), Err(AllocError::SizeOverflow));
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_double_release_detected() {
        let mut h = heap(1024);
        let a = h.allocate(32).unwrap();
        let _b = h.allocate(32).unwrap();
        h.release(a).unwrap();
        assert_eq!(h.release(a), Err(AllocError::InvalidPointer(a)));
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_double_release_after_merge_detected() {
        let mut h = heap(1024);
        let a = h.allocate(32).unwrap();
        let b = h.allocate(32).unwrap();
        h.release(a).unwrap();
        h.release(b).unwrap();
        assert!(h.release(b).is_err());
        assert!(h.release(a).is_err());
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_wild_release_rejected() {
        let mut h = heap(1024);
        let a = h.allocate(32).unwrap();
        assert!(h.release(a + 16).is_err());
        assert!(h.release(3).is_err());
        assert!(h.release(1 << 20).is_err());
        assert_eq!(h.live_count(), 1);
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_calloc_zeroes_reused_memory() {
        let mut h = heap(1024);
        let a = h.allocate(64).unwrap();
        h.payload_mut(a).unwrap().fill(0xff);
        h.release(a).unwrap();
        let z = h.allocate_zeroed(8, 8).unwrap();
        assert!(h.payload(z).unwrap()[..64].iter().all(|&x| x == 0));
    }

    #[test]
    fn test_calloc_overflow() {
        let mut h = heap(1024);
        assert_eq!(h.allocate_zeroed(usize::MAX, 2), Err(AllocError::SizeOverflow));
    }

    #[test]
    fn test_resize_null_and_zero() {
        let mut h = heap(1024);
        let a = h.resize(None, 24).unwrap().unwrap();
        assert_eq!(h.live_count(), 1);
        assert_eq!(h.resize(Some(a), 0).unwrap(), None);
        assert_eq!(h.live_count(), 0);
    }

    #[test]
    fn test_resize_shrinks_in_place() {
        let mut h = heap(1024);
        let a = h.allocate(200).unwrap();
        let b = h.resize(Some(a), 20).unwrap().unwrap();
        assert_eq!(a, b);
        assert!(h.usable_size(a).unwrap() < 200);
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_resize_grows_into_free_neighbour() {
        let mut h = heap(1024);
        let a = h.allocate(32).unwrap();
        h.payload_mut(a).unwrap()[..4].copy_from_slice(b"keep");
        let b = h.resize(Some(a), 300).unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(&h.payload(b).unwrap()[..4], b"keep");
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_resize_moves_and_preserves_contents() {
        let mut h = heap(2048);
        let a = h.allocate(32).unwrap();
        let _wall = h.allocate(32).unwrap();
        h.payload_mut(a).unwrap()[..6].copy_from_slice(b"moving");
        let b = h.resize(Some(a), 500).unwrap().unwrap();
        assert_ne!(a, b);
        assert_eq!(&h.payload(b).unwrap()[..6], b"moving");
        assert!(h.usable_size(a).is_none());
        assert_eq!(h.live_count(), 2);
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_failed_resize_leaves_original() {
        let mut h = heap(1024);
        let a = h.allocate(32).unwrap();
        let _wall = h.allocate(32).unwrap();
        h.payload_mut(a).unwrap()[..3].copy_from_slice(b"abc");
        assert!(h.resize(Some(a), 10_000).is_err());
        assert_eq!(&h.payload(a).unwrap()[..3], b"abc");
        assert_eq!(h.live_count(), 2);
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_check_invariants_detects_smashed_footer() {
        let mut h = heap(1024);
        let a = h.allocate(32).unwrap();
        let usable = h.usable_size(a).unwrap();
        // Overrun the payload by one byte into the footer.
        h.bytes_mut()[a + usable] ^= 0x10;
        let err = h.check_invariants().unwrap_err();
        assert_eq!(err.reason, "footer does not match header");
        assert!(h.release(a).is_err());
    }
}
