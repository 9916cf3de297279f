//! Typed slab pool.
//!
//! A [`SlabPool`] hands out storage for exactly one `T` per call. It carves
//! fixed-size blocks obtained from a [`RawAlloc`] source into uniform slots
//! and recycles released slots through an intrusive free list before it
//! advances its bump cursor.
//!
//! # Memory Layout
//!
//! ```text
//! Block (BLOCK_SIZE bytes, aligned to the slot alignment):
//! ┌───────────────┬─────────┬────────┬────────┬─────┬────────┬──────────┐
//! │ prev block    │ padding │ slot 0 │ slot 1 │ ... │ slot n │ unused   │
//! │ (*mut u8)     │         │        │        │     │        │ tail     │
//! └───────────────┴─────────┴────────┴────────┴─────┴────────┴──────────┘
//! ```
//!
//! A slot is `max(size_of::<T>(), size_of::<*mut u8>())` bytes aligned to the
//! stricter of the two alignments. A free slot stores the address of the next
//! free slot in its first word. The block headers form a chain that is only
//! walked when the pool is dropped.
//!
//! # Ownership
//!
//! The pool owns *storage*, not *objects*. Dropping a pool releases every
//! block without running the destructor of any value still living in a
//! slot. Callers must [`destroy`](SlabPool::destroy) live values before the
//! pool goes away, or accept that their destructors never run.
//!
//! # Usage Example
//!
//! ```rust
//! use mempool::slab_pool::SlabPool;
//!
//! let mut pool = SlabPool::<u64>::new();
//! let slot = pool.allocate().unwrap();
//! unsafe {
//!     pool.construct(slot, 42);
//!     assert_eq!(*slot.as_ref(), 42);
//!     pool.destroy(slot);
//!     pool.deallocate(slot);
//! }
//! ```

use core::{
    alloc::Layout,
    marker::PhantomData,
    mem::{self, ManuallyDrop},
    ptr::{self, NonNull},
};

use crate::{
    error::AllocError,
    raw::{Global, RawAlloc},
};

/// Block size used when none is given.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Storage unit of a [`SlabPool`].
///
/// While a slot is handed out it holds a `T`; while it sits on the free list
/// only `next` is meaningful.
#[repr(C)]
union Slot<T> {
    value: ManuallyDrop<T>,
    next: *mut Slot<T>,
}

/// A pool of same-sized slots for values of type `T`.
///
/// `BLOCK_SIZE` is the number of bytes requested from the raw source each
/// time the pool runs out of fresh slots. It must be large enough to hold
/// the block link header and at least one slot; smaller sizes are rejected
/// at compile time.
///
/// The pool is intentionally not `Clone`: blocks are owned by exactly one
/// pool. It is `Send` when `T` and the source are, and not `Sync`.
pub struct SlabPool<T, const BLOCK_SIZE: usize = DEFAULT_BLOCK_SIZE, R: RawAlloc = Global> {
    /// Most recently allocated block, head of the teardown chain.
    current_block: *mut u8,
    /// Next fresh slot in `current_block`.
    current_slot: *mut u8,
    /// Exclusive bound for `current_slot`.
    last_slot: *mut u8,
    /// Head of the recycled slot list.
    free_slots: *mut Slot<T>,
    blocks: usize,
    raw: R,
    _marker: PhantomData<T>,
}

unsafe impl<T, const BLOCK_SIZE: usize, R> Send for SlabPool<T, BLOCK_SIZE, R>
where
    T: Send,
    R: RawAlloc + Send,
{
}

impl<T, const BLOCK_SIZE: usize> Default for SlabPool<T, BLOCK_SIZE, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const BLOCK_SIZE: usize> SlabPool<T, BLOCK_SIZE, Global> {
    /// Creates an empty pool backed by the global allocator.
    ///
    /// No memory is requested until the first [`allocate`](Self::allocate).
    #[must_use]
    pub const fn new() -> Self {
        Self::with_raw(Global)
    }
}

impl<T, const BLOCK_SIZE: usize, R> SlabPool<T, BLOCK_SIZE, R>
where
    R: RawAlloc,
{
    const LINK_SIZE: usize = size_of::<*mut u8>();

    /// Width of one slot in bytes.
    pub const SLOT_SIZE: usize = size_of::<Slot<T>>();

    const SLOT_ALIGN: usize = align_of::<Slot<T>>();

    /// Offset of the first slot from the block base.
    ///
    /// Blocks are aligned to the slot alignment, so the padding after the
    /// link header is the same for every block.
    const FIRST_SLOT_OFFSET: usize = Self::LINK_SIZE.next_multiple_of(Self::SLOT_ALIGN);

    /// Number of slots carved from each block.
    pub const SLOTS_PER_BLOCK: usize = (BLOCK_SIZE - Self::FIRST_SLOT_OFFSET) / Self::SLOT_SIZE;

    const BLOCK_LAYOUT: Layout = match Layout::from_size_align(BLOCK_SIZE, Self::SLOT_ALIGN) {
        Ok(layout) => layout,
        Err(_) => panic!("Failed to create block layout"),
    };

    /// Creates an empty pool that obtains its blocks from `raw`.
    #[must_use]
    pub const fn with_raw(raw: R) -> Self {
        const {
            assert!(
                BLOCK_SIZE >= Self::FIRST_SLOT_OFFSET + Self::SLOT_SIZE,
                "BLOCK_SIZE cannot hold the block header and one slot"
            );
        }
        Self {
            current_block: ptr::null_mut(),
            current_slot: ptr::null_mut(),
            last_slot: ptr::null_mut(),
            free_slots: ptr::null_mut(),
            blocks: 0,
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the raw source backing this pool.
    pub const fn raw(&self) -> &R {
        &self.raw
    }

    /// Returns the number of blocks currently owned by the pool.
    #[must_use]
    pub const fn blocks(&self) -> usize {
        self.blocks
    }

    /// Allocates storage for one `T`.
    ///
    /// The most recently released slot is reused first. Otherwise the next
    /// fresh slot of the current block is returned, and a new block is
    /// requested from the raw source when the current one is exhausted.
    ///
    /// The returned storage is uninitialized.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfMemory`] if a new block is needed and the
    /// raw source refuses it. The pool is left unchanged in that case.
    pub fn allocate(&mut self) -> Result<NonNull<T>, AllocError> {
        if let Some(slot) = NonNull::new(self.free_slots) {
            self.free_slots = unsafe { (*slot.as_ptr()).next };
            return Ok(slot.cast());
        }

        if self.current_slot >= self.last_slot {
            self.allocate_block()?;
        }

        let slot = self.current_slot;
        unsafe {
            self.current_slot = slot.add(Self::SLOT_SIZE);
            Ok(NonNull::new_unchecked(slot).cast())
        }
    }

    /// Returns a slot to the pool.
    ///
    /// The slot is pushed onto the free list and will be the next one handed
    /// out by [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - `ptr` was returned by [`allocate`](Self::allocate) on this pool
    /// - `ptr` has not been deallocated since it was allocated
    /// - any value stored in the slot has already been destroyed or moved
    ///   out, and the slot is not accessed afterwards
    pub unsafe fn deallocate(&mut self, ptr: NonNull<T>) {
        let slot = ptr.as_ptr().cast::<Slot<T>>();
        unsafe {
            (&raw mut (*slot).next).write(self.free_slots);
        }
        self.free_slots = slot;
    }

    /// Advisory upper bound on the number of slots the pool could ever hand
    /// out. Not enforced by [`allocate`](Self::allocate).
    #[must_use]
    pub const fn max_size(&self) -> usize {
        (BLOCK_SIZE - Self::LINK_SIZE) / Self::SLOT_SIZE * (usize::MAX / BLOCK_SIZE)
    }

    /// Moves `value` into the slot at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a slot allocated from this pool that does not
    /// currently hold a live value.
    pub unsafe fn construct(&self, ptr: NonNull<T>, value: T) {
        unsafe { ptr.write(value) }
    }

    /// Runs the destructor of the value at `ptr`, leaving the slot allocated.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a slot allocated from this pool holding a live
    /// value, which must not be used afterwards.
    pub unsafe fn destroy(&self, ptr: NonNull<T>) {
        unsafe { ptr.drop_in_place() }
    }

    /// Returns the address of a live value.
    pub fn address(&self, value: &T) -> NonNull<T> {
        NonNull::from(value)
    }

    /// Requests a new block and points the bump cursor at its first slot.
    ///
    /// The previous block address is stored in the first word of the new
    /// block so that [`Drop`] can find every block.
    fn allocate_block(&mut self) -> Result<(), AllocError> {
        let block = self.raw.allocate(Self::BLOCK_LAYOUT)?.as_ptr();
        unsafe {
            #[expect(clippy::cast_ptr_alignment)]
            block.cast::<*mut u8>().write(self.current_block);
            self.current_slot = block.add(Self::FIRST_SLOT_OFFSET);
            // One past the highest address at which a whole slot still fits.
            self.last_slot = block.add(BLOCK_SIZE - Self::SLOT_SIZE + 1);
        }
        self.current_block = block;
        self.blocks += 1;

        debug!(
            "slab pool: block #{} at {block:p} ({} slots of {} bytes)",
            self.blocks,
            Self::SLOTS_PER_BLOCK,
            Self::SLOT_SIZE
        );
        Ok(())
    }
}

impl<T, const BLOCK_SIZE: usize, R> Drop for SlabPool<T, BLOCK_SIZE, R>
where
    R: RawAlloc,
{
    fn drop(&mut self) {
        let mut block = self.current_block;
        while let Some(current) = NonNull::new(block) {
            unsafe {
                #[expect(clippy::cast_ptr_alignment)]
                let prev = current.as_ptr().cast::<*mut u8>().read();
                self.raw.deallocate(current, Self::BLOCK_LAYOUT);
                block = prev;
            }
        }
        self.blocks = 0;
    }
}

const _: () = assert!(mem::size_of::<Slot<u8>>() == mem::size_of::<*mut u8>());
