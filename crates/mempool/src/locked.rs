//! Shared segregated allocator.
//!
//! [`LockedAllocator`] puts a [`SegregatedAllocator`] behind a spin lock so
//! that several threads can allocate from the same size classes, and
//! implements [`GlobalAlloc`] so that it can be installed as a program's
//! global allocator:
//!
//! ```rust
//! use mempool::{
//!     locked::LockedAllocator,
//!     raw::System,
//!     segregated::{SegregatedAllocator, SegregatedConfig},
//! };
//!
//! #[global_allocator]
//! static ALLOCATOR: LockedAllocator<System> = LockedAllocator::new(
//!     SegregatedAllocator::with_config(SegregatedConfig::DEFAULT, System),
//! );
//!
//! fn main() {
//!     let v = vec![1_u32, 2, 3];
//!     assert_eq!(v.iter().sum::<u32>(), 6);
//!     assert!(ALLOCATOR.stats().refills > 0);
//! }
//! ```
//!
//! A global allocator must be backed by a raw source that does not itself
//! call the global allocator, hence [`System`](crate::raw::System) above.
//! For the same reason, a logger installed in such a program must not
//! allocate, or the crate must be built without the `log` feature: log
//! records are emitted while the lock is held.

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
};

use spin::{Mutex, MutexGuard};

use crate::{
    error::AllocError,
    raw::{Global, RawAlloc},
    segregated::{SegregatedAllocator, SegregatedStats},
};

/// A [`SegregatedAllocator`] behind a spin lock.
pub struct LockedAllocator<R: RawAlloc = Global> {
    inner: Mutex<SegregatedAllocator<R>>,
}

impl<R> LockedAllocator<R>
where
    R: RawAlloc,
{
    /// Wraps `allocator` in a spin lock.
    #[must_use]
    pub const fn new(allocator: SegregatedAllocator<R>) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }

    /// Locks the allocator for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, SegregatedAllocator<R>> {
        self.inner.lock()
    }

    /// See [`SegregatedAllocator::allocate`].
    pub fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        self.inner.lock().allocate(bytes)
    }

    /// See [`SegregatedAllocator::deallocate`].
    ///
    /// # Safety
    ///
    /// Same contract as [`SegregatedAllocator::deallocate`].
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize) {
        unsafe { self.inner.lock().deallocate(ptr, bytes) }
    }

    /// Returns a snapshot of the wrapped allocator's counters.
    #[must_use]
    pub fn stats(&self) -> SegregatedStats {
        self.inner.lock().stats()
    }

    /// Consumes the lock and returns the wrapped allocator.
    #[must_use]
    pub fn into_inner(self) -> SegregatedAllocator<R> {
        self.inner.into_inner()
    }
}

impl Default for LockedAllocator<Global> {
    fn default() -> Self {
        Self::new(SegregatedAllocator::new())
    }
}

unsafe impl<R> GlobalAlloc for LockedAllocator<R>
where
    R: RawAlloc,
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.inner
            .lock()
            .allocate_layout(layout)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        unsafe { self.inner.lock().deallocate_layout(ptr, layout) }
    }
}
