//! Intrusive free lists of fixed-size cells.
//!
//! # Aliasing and alignment contract
//!
//! A cell on a free list is owned by that list and by nothing else. Its first
//! machine word is reinterpreted as a [`Cell`] holding the address of the
//! next free cell; the remaining bytes are left untouched. This is sound
//! because:
//!
//! - every cell is at least one pointer wide (granularity >= pointer width),
//! - every cell starts at a multiple of the granularity from a chunk base
//!   aligned to the granularity, which is a power of two no smaller than the
//!   pointer alignment,
//! - a cell is never reachable from a list while it is handed out.
//!
//! All raw reinterpretation of freed memory in the segregated allocator goes
//! through this module.

use core::{alloc::Layout, ptr, ptr::NonNull, slice};

use crate::{
    error::{AllocError, OutOfMemorySnafu},
    raw::RawAlloc,
};

/// Link word stored in the first bytes of a free cell.
#[repr(C)]
struct Cell {
    next: *mut Cell,
}

/// One singly linked LIFO list of free cells.
#[repr(transparent)]
#[derive(Debug)]
pub(crate) struct FreeList {
    head: *mut Cell,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Pops the most recently pushed cell.
    pub(crate) fn pop(&mut self) -> Option<NonNull<u8>> {
        let cell = NonNull::new(self.head)?;
        self.head = unsafe { (*cell.as_ptr()).next };
        Some(cell.cast())
    }

    /// Pushes `cell`, overwriting its first word with the current head.
    ///
    /// # Safety
    ///
    /// `cell` must satisfy the module-level contract and must not already be
    /// on any list.
    pub(crate) unsafe fn push(&mut self, cell: NonNull<u8>) {
        #[expect(clippy::cast_ptr_alignment)]
        let cell = cell.as_ptr().cast::<Cell>();
        unsafe {
            (&raw mut (*cell).next).write(self.head);
        }
        self.head = cell;
    }

    /// Threads `count` consecutive cells of `cell_size` bytes starting at
    /// `first` onto the list, in address order.
    ///
    /// After the call, `first` is the head and the last cell of the run links
    /// to the previous head.
    ///
    /// # Safety
    ///
    /// The range `first..first + cell_size * count` must consist of cells
    /// that satisfy the module-level contract and are on no list.
    pub(crate) unsafe fn push_run(&mut self, first: NonNull<u8>, cell_size: usize, count: usize) {
        debug_assert!(count > 0);
        #[expect(clippy::cast_ptr_alignment)]
        let first = first.as_ptr().cast::<Cell>();
        let mut current = first;
        unsafe {
            for _ in 1..count {
                let next = current.byte_add(cell_size);
                (&raw mut (*current).next).write(next);
                current = next;
            }
            (&raw mut (*current).next).write(self.head);
        }
        self.head = first;
    }

    /// Walks the list and counts its cells.
    pub(crate) fn len(&self) -> usize {
        let mut len = 0;
        let mut cell = self.head;
        while !cell.is_null() {
            len += 1;
            cell = unsafe { (*cell).next };
        }
        len
    }
}

/// Array of free lists, one per size class.
///
/// The array is obtained from the raw source on first use so that an
/// allocator can be built in a `const` context and used as a global
/// allocator.
#[derive(Debug)]
pub(crate) struct FreeListTable {
    lists: *mut FreeList,
    len: usize,
}

impl FreeListTable {
    pub(crate) const fn new() -> Self {
        Self {
            lists: ptr::null_mut(),
            len: 0,
        }
    }

    fn layout(len: usize) -> Result<Layout, AllocError> {
        Layout::array::<FreeList>(len).ok().ok_or_else(|| {
            OutOfMemorySnafu {
                size: len.saturating_mul(size_of::<FreeList>()),
                align: align_of::<FreeList>(),
            }
            .build()
        })
    }

    /// Returns the lists, allocating `len` empty lists on first use.
    pub(crate) fn get_or_init<R>(&mut self, len: usize, raw: &R) -> Result<&mut [FreeList], AllocError>
    where
        R: RawAlloc,
    {
        if self.lists.is_null() {
            let lists = raw.allocate(Self::layout(len)?)?.cast::<FreeList>().as_ptr();
            for i in 0..len {
                unsafe { lists.add(i).write(FreeList::new()) };
            }
            self.lists = lists;
            self.len = len;
        }
        Ok(self.lists_mut())
    }

    /// Returns the lists, or an empty slice if none were allocated yet.
    pub(crate) fn lists_mut(&mut self) -> &mut [FreeList] {
        if self.lists.is_null() {
            return &mut [];
        }
        unsafe { slice::from_raw_parts_mut(self.lists, self.len) }
    }

    pub(crate) fn lists(&self) -> &[FreeList] {
        if self.lists.is_null() {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.lists, self.len) }
    }

    /// Returns the table memory to `raw`.
    ///
    /// # Safety
    ///
    /// `raw` must be the source the table was obtained from.
    pub(crate) unsafe fn release<R>(&mut self, raw: &R)
    where
        R: RawAlloc,
    {
        let Some(lists) = NonNull::new(self.lists) else {
            return;
        };
        if let Ok(layout) = Self::layout(self.len) {
            unsafe { raw.deallocate(lists.cast(), layout) };
        }
        self.lists = ptr::null_mut();
        self.len = 0;
    }
}
