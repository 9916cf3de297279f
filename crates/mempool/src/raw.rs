//! Raw memory sources.
//!
//! Both engines obtain their backing memory through [`RawAlloc`], and the
//! segregated allocator forwards requests above its ceiling to the same
//! source. The default source is [`Global`], which forwards to whatever
//! global allocator the final program uses. Programs that install a pool as
//! their `#[global_allocator]` must back it with a source that does not
//! recurse into that pool, such as [`System`] (available with the `std`
//! feature).

use core::{alloc::Layout, ptr::NonNull};

use crate::error::{AllocError, OutOfMemorySnafu};

/// A source of raw, uninitialized memory.
///
/// # Safety
///
/// Implementations must return regions that are valid for reads and writes
/// of `layout.size()` bytes, aligned to `layout.align()`, and not aliased by
/// any other live allocation until they are passed back to
/// [`deallocate`](Self::deallocate).
pub unsafe trait RawAlloc {
    /// Obtains a region described by `layout`.
    ///
    /// `layout.size()` must be nonzero.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Returns a region previously obtained from [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this source with the
    /// same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

unsafe impl<R> RawAlloc for &R
where
    R: RawAlloc + ?Sized,
{
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

/// Forwards to the program's global allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

unsafe impl RawAlloc for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() > 0);
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or_else(|| out_of_memory(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

#[cfg(feature = "std")]
pub use std::alloc::System;

#[cfg(feature = "std")]
unsafe impl RawAlloc for System {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        use std::alloc::GlobalAlloc as _;

        debug_assert!(layout.size() > 0);
        let ptr = unsafe { self.alloc(layout) };
        NonNull::new(ptr).ok_or_else(|| out_of_memory(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        use std::alloc::GlobalAlloc as _;

        unsafe { self.dealloc(ptr.as_ptr(), layout) }
    }
}

#[track_caller]
pub(crate) fn out_of_memory(layout: Layout) -> AllocError {
    warn!(
        "system allocator refused {} bytes (align {})",
        layout.size(),
        layout.align()
    );
    OutOfMemorySnafu {
        size: layout.size(),
        align: layout.align(),
    }
    .build()
}

/// Builds a layout, reporting an unrepresentable request as out of memory.
#[track_caller]
pub(crate) fn layout(size: usize, align: usize) -> Result<Layout, AllocError> {
    Layout::from_size_align(size, align)
        .ok()
        .ok_or_else(|| OutOfMemorySnafu { size, align }.build())
}
