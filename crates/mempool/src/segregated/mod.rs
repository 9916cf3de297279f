//! Segregated free-list allocator.
//!
//! Requests up to a configurable ceiling are rounded up to a multiple of the
//! granularity and served from one free list per size class. An empty class
//! is refilled with a batch of cells carved from a shared bump arena; the
//! arena grows from the raw source when it cannot provide even one cell.
//! Requests above the ceiling are forwarded to the raw source unchanged.
//!
//! # Algorithm
//!
//! - **Allocation**: pop the head of the class list; if empty, *refill*.
//! - **Refill**: carve up to `batch_count` adjacent cells from the arena,
//!   return the first and thread the rest onto the class list.
//! - **Arena exhaustion**: if not even one cell fits, obtain a chunk of
//!   `2 * batch bytes + heap_size / 16` bytes (rounded to the granularity),
//!   push the unused tail of the old window onto the free list of the class
//!   whose size it equals, and retry.
//! - **Deallocation**: push the cell onto its class list. The caller supplies
//!   the size; the allocator keeps no per-cell metadata.
//!
//! # Usage Example
//!
//! ```rust
//! use mempool::segregated::SegregatedAllocator;
//!
//! let mut allocator = SegregatedAllocator::new();
//! let ptr = allocator.allocate(100).unwrap(); // served from the 128-byte class
//! unsafe {
//!     ptr.as_ptr().write_bytes(0x33, 100);
//!     allocator.deallocate(ptr, 100);
//! }
//! assert_eq!(allocator.allocate(100).unwrap(), ptr);
//! ```
//!
//! # Caller Contract
//!
//! Deallocating with a size from a different class than the allocation,
//! deallocating a pointer this allocator did not return, and double frees are
//! undefined behavior. Only cheap `debug_assert!`s guard against them.

use core::{alloc::Layout, ptr::NonNull};

pub use self::config::SegregatedConfig;
use self::{
    arena::{Arena, Fragment},
    free_list::{FreeList, FreeListTable},
};
use crate::{
    error::{AllocError, OutOfMemorySnafu},
    raw::{self, Global, RawAlloc},
};

mod arena;
mod config;
mod free_list;

/// Counters describing what an allocator has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegregatedStats {
    /// Number of times an empty class was refilled from the arena.
    pub refills: usize,
    /// Number of chunks obtained from the raw source for the arena.
    pub arena_growths: usize,
    /// Total arena bytes obtained from the raw source.
    pub heap_size: usize,
    /// Number of requests forwarded to the raw source.
    pub fallback_allocations: usize,
    /// Arena tails recycled as free cells when the arena moved on.
    pub salvaged_fragments: usize,
}

/// A size-class allocator over a bump arena.
///
/// Each instance owns its free lists and arena; instances are independent of
/// each other. The allocator is `Send` when its raw source is, and not
/// `Sync`: wrap it in a [`LockedAllocator`](crate::locked::LockedAllocator)
/// to share it between threads.
///
/// Dropping the allocator returns every arena chunk to the raw source.
/// Requests above the ceiling that are still outstanding are not tracked and
/// must be deallocated before the allocator is dropped.
pub struct SegregatedAllocator<R: RawAlloc = Global> {
    config: SegregatedConfig,
    lists: FreeListTable,
    arena: Arena,
    raw: R,
    stats: SegregatedStats,
}

unsafe impl<R> Send for SegregatedAllocator<R> where R: RawAlloc + Send {}

impl Default for SegregatedAllocator<Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl SegregatedAllocator<Global> {
    /// Creates an allocator with [`SegregatedConfig::DEFAULT`] backed by the
    /// global allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_config(SegregatedConfig::DEFAULT, Global)
    }
}

impl<R> SegregatedAllocator<R>
where
    R: RawAlloc,
{
    /// Creates an allocator with the given parameters and raw source.
    ///
    /// Nothing is requested from `raw` until the first allocation.
    #[must_use]
    pub const fn with_config(config: SegregatedConfig, raw: R) -> Self {
        Self {
            config,
            lists: FreeListTable::new(),
            arena: Arena::new(),
            raw,
            stats: SegregatedStats {
                refills: 0,
                arena_growths: 0,
                heap_size: 0,
                fallback_allocations: 0,
                salvaged_fragments: 0,
            },
        }
    }

    /// Returns the size-class parameters.
    #[must_use]
    pub const fn config(&self) -> &SegregatedConfig {
        &self.config
    }

    /// Returns the raw source backing the arena and oversized requests.
    #[must_use]
    pub const fn raw(&self) -> &R {
        &self.raw
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> SegregatedStats {
        SegregatedStats {
            arena_growths: self.arena.growths(),
            heap_size: self.arena.heap_size(),
            ..self.stats
        }
    }

    /// Current arena window `(start, end)` as addresses.
    ///
    /// `start` only moves forward within a chunk; both are zero before the
    /// first refill.
    #[must_use]
    pub fn arena_window(&self) -> (usize, usize) {
        self.arena.window()
    }

    /// Number of cells currently on the free list of class `index`.
    ///
    /// Walks the list; intended for diagnostics and tests.
    #[must_use]
    pub fn free_cells(&self, index: usize) -> usize {
        self.lists.lists().get(index).map_or(0, FreeList::len)
    }

    /// Allocates `bytes` bytes.
    ///
    /// Requests up to the ceiling are rounded up to their size class and are
    /// aligned to the granularity. Larger requests are forwarded to the raw
    /// source with the same alignment.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfMemory`] if the raw source refuses an arena
    /// chunk, the free-list table or a forwarded request. Existing free
    /// lists and the arena window stay valid in that case.
    pub fn allocate(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        if self.config.is_oversized(bytes) {
            let layout = raw::layout(bytes, self.config.granularity())?;
            return self.allocate_fallback(layout);
        }

        let index = self.config.class_index(bytes);
        let lists = self.lists.get_or_init(self.config.class_count(), &self.raw)?;
        if let Some(cell) = lists[index].pop() {
            return Ok(cell);
        }

        self.refill(self.config.round_up(bytes))
    }

    /// Returns memory obtained from [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - `ptr` was returned by `allocate` on this allocator
    /// - `bytes` falls in the same size class as the size passed to
    ///   `allocate` (for requests above the ceiling, it must be equal)
    /// - `ptr` has not been deallocated since and is not used afterwards
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, bytes: usize) {
        if self.config.is_oversized(bytes) {
            unsafe {
                let layout = Layout::from_size_align_unchecked(bytes, self.config.granularity());
                self.raw.deallocate(ptr, layout);
            }
            return;
        }

        debug_assert!(
            ptr.addr().get().is_multiple_of(self.config.granularity()),
            "pointer {ptr:p} was not carved by this allocator"
        );
        let index = self.config.class_index(bytes);
        unsafe { self.lists.lists_mut()[index].push(ptr) };
    }

    /// Allocates memory for `layout`.
    ///
    /// Layouts aligned to at most the granularity are served like
    /// [`allocate(layout.size())`](Self::allocate); stricter alignments are
    /// forwarded to the raw source.
    pub fn allocate_layout(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.align() > self.config.granularity() {
            return self.allocate_fallback(layout);
        }
        self.allocate(layout.size())
    }

    /// Returns memory obtained from [`allocate_layout`](Self::allocate_layout).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate_layout` on this allocator
    /// with the same `layout`, and must not be used afterwards.
    pub unsafe fn deallocate_layout(&mut self, ptr: NonNull<u8>, layout: Layout) {
        if layout.align() > self.config.granularity() {
            unsafe { self.raw.deallocate(ptr, layout) };
            return;
        }
        unsafe { self.deallocate(ptr, layout.size()) }
    }

    fn allocate_fallback(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.raw.allocate(layout)?;
        self.stats.fallback_allocations += 1;
        Ok(ptr)
    }

    /// Serves a request of `size` bytes (already rounded) from a fresh batch.
    fn refill(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let (chunk, count) = self.chunk_alloc(size, self.config.batch_count())?;
        self.stats.refills += 1;
        trace!("refill: {count} cells of {size} bytes at {chunk:p}");

        if count > 1 {
            let index = self.config.class_index(size);
            unsafe {
                let rest = chunk.add(size);
                self.lists.lists_mut()[index].push_run(rest, size, count - 1);
            }
        }
        Ok(chunk)
    }

    /// Carves up to `count` adjacent cells of `size` bytes from the arena.
    ///
    /// Returns the first cell and the number of cells actually carved, which
    /// is at least one.
    fn chunk_alloc(&mut self, size: usize, count: usize) -> Result<(NonNull<u8>, usize), AllocError> {
        let granularity = self.config.granularity();
        let needed = size
            .checked_mul(count)
            .ok_or_else(|| OutOfMemorySnafu { size, align: granularity }.build())?;

        loop {
            let available = self.arena.available();
            if available >= needed {
                return Ok((self.arena.bump(needed), count));
            }
            if available >= size {
                let count = available / size;
                return Ok((self.arena.bump(size * count), count));
            }

            let request = self
                .arena
                .growth_request(needed, granularity)
                .ok_or_else(|| OutOfMemorySnafu { size: needed, align: granularity }.build())?;
            if let Some(fragment) = self.arena.grow(request, granularity, &self.raw)? {
                self.salvage(fragment);
            }
        }
    }

    /// Recycles the tail of an abandoned arena window as a free cell.
    ///
    /// Every bump and every window size is a multiple of the granularity, and
    /// a tail is always smaller than the request that did not fit, so a tail
    /// is exactly one cell of some class.
    fn salvage(&mut self, fragment: Fragment) {
        let Fragment { start, len } = fragment;
        debug_assert!(
            len.is_multiple_of(self.config.granularity()) && !self.config.is_oversized(len),
            "arena tail of {len} bytes is not a cell"
        );
        let index = self.config.class_index(len);
        unsafe { self.lists.lists_mut()[index].push(start) };
        self.stats.salvaged_fragments += 1;
        trace!("salvaged {len} byte arena tail at {start:p} into class {index}");
    }
}

impl<R> Drop for SegregatedAllocator<R>
where
    R: RawAlloc,
{
    fn drop(&mut self) {
        unsafe {
            self.arena.release(&self.raw);
            self.lists.release(&self.raw);
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::vec::Vec;

    use super::*;
    use crate::raw::tests::CountingRaw;

    struct TestAllocator<'a> {
        allocator: SegregatedAllocator<&'a CountingRaw>,
    }

    impl TestAllocator<'_> {
        fn allocate(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
            let ptr = self.allocator.allocate(bytes)?;
            unsafe {
                ptr.write_bytes(0x33, bytes);
            }
            Ok(ptr)
        }

        unsafe fn deallocate(&mut self, ptr: NonNull<u8>, bytes: usize) {
            unsafe {
                for i in 0..bytes {
                    assert_eq!(ptr.add(i).read(), 0x33);
                }
                ptr.write_bytes(0x55, bytes);
                self.allocator.deallocate(ptr, bytes);
            }
        }
    }

    fn with_test_allocator<F>(config: SegregatedConfig, test_fn: F) -> CountingRaw
    where
        F: FnOnce(&mut TestAllocator<'_>),
    {
        let raw = CountingRaw::default();
        {
            let mut allocator = TestAllocator {
                allocator: SegregatedAllocator::with_config(config, &raw),
            };
            test_fn(&mut allocator);
        }
        raw
    }

    #[test]
    fn test_basic_allocation() {
        with_test_allocator(SegregatedConfig::DEFAULT, |allocator| unsafe {
            let ptr = allocator.allocate(100).unwrap();
            assert_eq!(ptr.addr().get() % 64, 0);
            allocator.deallocate(ptr, 100);
        });
    }

    #[test]
    fn test_first_refill_carves_a_batch() {
        with_test_allocator(SegregatedConfig::DEFAULT, |allocator| {
            let first = allocator.allocate(100).unwrap();
            let stats = allocator.allocator.stats();
            assert_eq!(stats.refills, 1);
            assert_eq!(stats.arena_growths, 1);
            // 2 * (20 * 128) bytes, nothing obtained before
            assert_eq!(stats.heap_size, 5120);
            assert_eq!(allocator.allocator.free_cells(1), 19);

            let second = allocator.allocate(128).unwrap();
            assert_eq!(second.addr().get(), first.addr().get() + 128);
            assert_eq!(allocator.allocator.free_cells(1), 18);
        });
    }

    #[test]
    fn test_refill_batches() {
        with_test_allocator(SegregatedConfig::DEFAULT, |allocator| {
            for _ in 0..25 {
                allocator.allocate(64).unwrap();
            }
            let stats = allocator.allocator.stats();
            assert_eq!(stats.refills, 2);
            assert_eq!(stats.arena_growths, 1);
            assert_eq!(allocator.allocator.free_cells(0), 15);
            let (start, end) = allocator.allocator.arena_window();
            assert_eq!(start, end);
        });
    }

    #[test]
    fn test_lifo_reuse() {
        with_test_allocator(SegregatedConfig::DEFAULT, |allocator| unsafe {
            let a = allocator.allocate(200).unwrap();
            let b = allocator.allocate(200).unwrap();
            allocator.deallocate(a, 200);
            allocator.deallocate(b, 200);
            assert_eq!(allocator.allocate(200).unwrap(), b);
            assert_eq!(allocator.allocate(200).unwrap(), a);
        });
    }

    #[test]
    fn test_deallocate_with_same_class_size() {
        with_test_allocator(SegregatedConfig::DEFAULT, |allocator| unsafe {
            let ptr = allocator.allocator.allocate(70).unwrap();
            allocator.allocator.deallocate(ptr, 128);
            assert_eq!(allocator.allocator.allocate(100).unwrap(), ptr);
        });
    }

    #[test]
    fn test_classes_are_independent() {
        with_test_allocator(SegregatedConfig::DEFAULT, |allocator| unsafe {
            let small = allocator.allocate(64).unwrap();
            let large = allocator.allocate(1000).unwrap();
            allocator.deallocate(small, 64);

            let other = allocator.allocate(1000).unwrap();
            assert_ne!(other, small);
            assert_ne!(other, large);
            assert_eq!(allocator.allocate(1).unwrap(), small);
        });
    }

    #[test]
    fn test_partial_batch_from_remaining_window() {
        let config = SegregatedConfig::new(64, 4096, 4).unwrap();
        with_test_allocator(config, |allocator| {
            // first growth: 2 * 4 * 64 = 512 bytes, 256 carved
            allocator.allocate(64).unwrap();
            assert_eq!(allocator.allocator.arena.available(), 256);

            // 192-byte cells: only one fits in the remaining 256 bytes
            allocator.allocate(192).unwrap();
            let stats = allocator.allocator.stats();
            assert_eq!(stats.refills, 2);
            assert_eq!(stats.arena_growths, 1);
            assert_eq!(allocator.allocator.free_cells(2), 0);
            assert_eq!(allocator.allocator.arena.available(), 64);
        });
    }

    #[test]
    fn test_arena_tail_is_salvaged() {
        let config = SegregatedConfig::new(64, 4096, 4).unwrap();
        with_test_allocator(config, |allocator| {
            allocator.allocate(64).unwrap();
            allocator.allocate(192).unwrap();
            assert_eq!(allocator.allocator.arena.available(), 64);

            // 128-byte cells do not fit in the 64-byte tail
            allocator.allocate(128).unwrap();
            let stats = allocator.allocator.stats();
            assert_eq!(stats.arena_growths, 2);
            assert_eq!(stats.salvaged_fragments, 1);
            // 3 cells from the first batch plus the salvaged tail
            assert_eq!(allocator.allocator.free_cells(0), 4);
        });
    }

    #[test]
    fn test_growth_accelerates() {
        let config = SegregatedConfig::new(64, 4096, 2).unwrap();
        with_test_allocator(config, |allocator| {
            let mut sizes = Vec::new();
            let mut last_heap = 0;
            for _ in 0..64 {
                allocator.allocate(4096).unwrap();
                let heap = allocator.allocator.stats().heap_size;
                if heap != last_heap {
                    sizes.push(heap - last_heap);
                    last_heap = heap;
                }
            }
            assert!(sizes.len() > 2);
            assert!(sizes.windows(2).all(|pair| pair[1] >= pair[0]));
            assert!(sizes.last().unwrap() > sizes.first().unwrap());
        });
    }

    #[test]
    fn test_oversized_requests_bypass_classes() {
        let raw = with_test_allocator(SegregatedConfig::DEFAULT, |allocator| unsafe {
            let ptr = allocator.allocate(65537).unwrap();
            assert_eq!(ptr.addr().get() % 64, 0);
            let stats = allocator.allocator.stats();
            assert_eq!(stats.fallback_allocations, 1);
            assert_eq!(stats.refills, 0);
            assert_eq!(stats.heap_size, 0);
            allocator.deallocate(ptr, 65537);
            assert_eq!(allocator.allocator.raw().live_bytes.get(), 0);
        });
        assert_eq!(raw.allocations.get(), 1);
        assert_eq!(raw.deallocations.get(), 1);
    }

    #[test]
    fn test_ceiling_is_served_by_last_class() {
        with_test_allocator(SegregatedConfig::DEFAULT, |allocator| unsafe {
            let ptr = allocator.allocate(65536).unwrap();
            let stats = allocator.allocator.stats();
            assert_eq!(stats.fallback_allocations, 0);
            assert_eq!(stats.refills, 1);
            allocator.deallocate(ptr, 65536);
            assert_eq!(allocator.allocator.free_cells(1023), 20);
        });
    }

    #[test]
    fn test_over_aligned_layout_uses_raw_source() {
        with_test_allocator(SegregatedConfig::DEFAULT, |allocator| unsafe {
            let layout = Layout::from_size_align(64, 4096).unwrap();
            let ptr = allocator.allocator.allocate_layout(layout).unwrap();
            assert_eq!(ptr.addr().get() % 4096, 0);
            assert_eq!(allocator.allocator.stats().fallback_allocations, 1);
            allocator.allocator.deallocate_layout(ptr, layout);

            let layout = Layout::from_size_align(64, 16).unwrap();
            let ptr = allocator.allocator.allocate_layout(layout).unwrap();
            assert_eq!(allocator.allocator.stats().fallback_allocations, 1);
            allocator.allocator.deallocate_layout(ptr, layout);
        });
    }

    #[test]
    fn test_zero_byte_request() {
        with_test_allocator(SegregatedConfig::DEFAULT, |allocator| unsafe {
            let ptr = allocator.allocator.allocate(0).unwrap();
            allocator.allocator.deallocate(ptr, 0);
            assert_eq!(allocator.allocator.allocate(64).unwrap(), ptr);
        });
    }

    #[test]
    fn test_out_of_memory_keeps_state() {
        let raw = CountingRaw::with_limit(16 * 1024);
        let mut allocator = SegregatedAllocator::with_config(SegregatedConfig::DEFAULT, &raw);
        let small = allocator.allocate(64).unwrap();
        let window = allocator.arena_window();
        let stats = allocator.stats();

        assert!(matches!(
            allocator.allocate(8192),
            Err(AllocError::OutOfMemory { .. })
        ));
        assert_eq!(allocator.arena_window(), window);
        assert_eq!(allocator.stats(), stats);

        unsafe { allocator.deallocate(small, 64) };
        assert_eq!(allocator.allocate(64).unwrap(), small);
        assert_eq!(allocator.free_cells(0), 19);
    }

    #[test]
    fn test_refused_fallback_keeps_state() {
        let raw = CountingRaw::with_limit(64 * 1024);
        let mut allocator = SegregatedAllocator::with_config(SegregatedConfig::DEFAULT, &raw);
        let small = allocator.allocate(64).unwrap();
        let window = allocator.arena_window();
        let stats = allocator.stats();
        let allocations = raw.allocations.get();

        assert!(matches!(
            allocator.allocate(65_537 * 2),
            Err(AllocError::OutOfMemory { size: 131_074, .. })
        ));
        assert_eq!(allocator.stats().fallback_allocations, 0);
        assert_eq!(allocator.stats(), stats);
        assert_eq!(allocator.arena_window(), window);
        assert_eq!(raw.allocations.get(), allocations);

        let next = allocator.allocate(64).unwrap();
        assert_ne!(next, small);
        unsafe {
            allocator.deallocate(next, 64);
            allocator.deallocate(small, 64);
        }
    }

    #[test]
    fn test_drop_releases_all_chunks() {
        let raw = with_test_allocator(SegregatedConfig::DEFAULT, |allocator| {
            for size in [64, 128, 1000, 4000, 30000, 65536] {
                for _ in 0..30 {
                    allocator.allocate(size).unwrap();
                }
            }
            assert!(allocator.allocator.stats().arena_growths > 1);
        });
        assert_eq!(raw.allocations.get(), raw.deallocations.get());
        assert_eq!(raw.live_bytes.get(), 0);
    }

    #[test]
    fn test_untouched_allocator_requests_nothing() {
        let raw = with_test_allocator(SegregatedConfig::DEFAULT, |_| {});
        assert_eq!(raw.allocations.get(), 0);
    }
}
