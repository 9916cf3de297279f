//! Element-typed allocation interface for containers.
//!
//! Containers that manage their own storage talk to an allocator in units of
//! elements rather than bytes. [`ElementAllocator`] is that interface; it is
//! implemented by [`SlabPool`] (one element per call) and by
//! [`SegregatedElements`], a typed handle over a shared
//! [`LockedAllocator`].
//!
//! ```rust
//! use mempool::{
//!     adapter::{ElementAllocator, SegregatedElements},
//!     locked::LockedAllocator,
//! };
//!
//! let shared = LockedAllocator::default();
//! let mut ints = SegregatedElements::<u32>::new(&shared);
//! let buf = ints.allocate(16).unwrap();
//! unsafe {
//!     for i in 0..16 {
//!         ints.construct(buf.add(i), i as u32);
//!     }
//!     assert_eq!(*buf.add(15).as_ref(), 15);
//!     ints.deallocate(buf, 16);
//! }
//!
//! // Same shared allocator, different element type.
//! let mut points = ints.rebind::<(f64, f64)>();
//! let p = points.allocate(1).unwrap();
//! unsafe { points.deallocate(p, 1) };
//! ```

use core::{alloc::Layout, fmt, marker::PhantomData, ptr, ptr::NonNull};

use crate::{
    error::{AllocError, CapacityOverflowSnafu},
    locked::LockedAllocator,
    raw::{Global, RawAlloc},
    slab_pool::SlabPool,
};

/// Allocates storage for elements of one type.
///
/// Storage returned by [`allocate`](Self::allocate) is uninitialized;
/// [`construct`](Self::construct) and [`destroy`](Self::destroy) manage the
/// lifetime of the values placed in it.
pub trait ElementAllocator {
    /// Element type served by this allocator.
    type Value;

    /// An allocator of the same kind for elements of type `U`.
    type Rebind<U>: ElementAllocator<Value = U>;

    /// Allocates storage for `count` contiguous elements.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfMemory`] if the backing memory cannot be
    /// obtained, or [`AllocError::CapacityOverflow`] if `count` elements do
    /// not fit in the address space.
    fn allocate(&mut self, count: usize) -> Result<NonNull<Self::Value>, AllocError>;

    /// Releases storage obtained from [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator (or one
    /// that compares equal) with the same `count`, every value in it must
    /// already be destroyed, and it must not be used afterwards.
    unsafe fn deallocate(&mut self, ptr: NonNull<Self::Value>, count: usize);

    /// Advisory upper bound on the number of elements.
    fn max_size(&self) -> usize;

    /// Returns an equivalent allocator for elements of type `U`.
    fn rebind<U>(&self) -> Self::Rebind<U>;

    /// Moves `value` into the storage at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to allocated storage for one element that does not
    /// hold a live value.
    unsafe fn construct(&self, ptr: NonNull<Self::Value>, value: Self::Value) {
        unsafe { ptr.write(value) }
    }

    /// Drops the value at `ptr` in place.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live value, which must not be used afterwards.
    unsafe fn destroy(&self, ptr: NonNull<Self::Value>) {
        unsafe { ptr.drop_in_place() }
    }

    fn address(&self, value: &Self::Value) -> NonNull<Self::Value> {
        NonNull::from(value)
    }
}

impl<T, const BLOCK_SIZE: usize, R> ElementAllocator for SlabPool<T, BLOCK_SIZE, R>
where
    R: RawAlloc + Clone,
{
    type Value = T;
    type Rebind<U> = SlabPool<U, BLOCK_SIZE, R>;

    /// Allocates one slot. `count` must be 1.
    fn allocate(&mut self, count: usize) -> Result<NonNull<T>, AllocError> {
        debug_assert_eq!(count, 1, "a slab pool serves exactly one element per call");
        Self::allocate(self)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<T>, count: usize) {
        debug_assert_eq!(count, 1, "a slab pool serves exactly one element per call");
        unsafe { Self::deallocate(self, ptr) }
    }

    fn max_size(&self) -> usize {
        Self::max_size(self)
    }

    /// Returns a new, empty pool for `U` with the same block size and raw
    /// source. Slots are never shared between the two pools.
    fn rebind<U>(&self) -> SlabPool<U, BLOCK_SIZE, R> {
        SlabPool::with_raw(self.raw().clone())
    }
}

/// A typed, copyable handle over a shared [`LockedAllocator`].
///
/// `count` elements of `T` are served as one request of
/// `count * size_of::<T>()` bytes. Zero-sized requests never reach the
/// allocator and return a dangling, well-aligned pointer.
pub struct SegregatedElements<'a, T, R: RawAlloc = Global> {
    allocator: &'a LockedAllocator<R>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T, R> SegregatedElements<'a, T, R>
where
    R: RawAlloc,
{
    /// Creates a handle for elements of `T` over `allocator`.
    #[must_use]
    pub const fn new(allocator: &'a LockedAllocator<R>) -> Self {
        Self {
            allocator,
            _marker: PhantomData,
        }
    }

    /// Returns the shared allocator behind this handle.
    #[must_use]
    pub const fn allocator(&self) -> &'a LockedAllocator<R> {
        self.allocator
    }

    fn layout(count: usize) -> Result<Layout, AllocError> {
        Layout::array::<T>(count).ok().ok_or_else(|| {
            CapacityOverflowSnafu {
                count,
                elem_size: size_of::<T>(),
            }
            .build()
        })
    }
}

impl<T, R> Clone for SegregatedElements<'_, T, R>
where
    R: RawAlloc,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, R> Copy for SegregatedElements<'_, T, R> where R: RawAlloc {}

impl<T, R> PartialEq for SegregatedElements<'_, T, R>
where
    R: RawAlloc,
{
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.allocator, other.allocator)
    }
}

impl<T, R> Eq for SegregatedElements<'_, T, R> where R: RawAlloc {}

impl<T, R> fmt::Debug for SegregatedElements<'_, T, R>
where
    R: RawAlloc,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegregatedElements")
            .field("allocator", &ptr::from_ref(self.allocator))
            .field("elem_size", &size_of::<T>())
            .finish()
    }
}

impl<'a, T, R> ElementAllocator for SegregatedElements<'a, T, R>
where
    R: RawAlloc,
{
    type Value = T;
    type Rebind<U> = SegregatedElements<'a, U, R>;

    fn allocate(&mut self, count: usize) -> Result<NonNull<T>, AllocError> {
        let layout = Self::layout(count)?;
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }
        let ptr = self.allocator.lock().allocate_layout(layout)?;
        Ok(ptr.cast())
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<T>, count: usize) {
        let Ok(layout) = Self::layout(count) else {
            debug_assert!(false, "deallocating {count} elements that could never be allocated");
            return;
        };
        if layout.size() == 0 {
            return;
        }
        unsafe { self.allocator.lock().deallocate_layout(ptr.cast(), layout) }
    }

    fn max_size(&self) -> usize {
        (usize::MAX >> 1) / size_of::<T>().max(1)
    }

    fn rebind<U>(&self) -> SegregatedElements<'a, U, R> {
        SegregatedElements::new(self.allocator)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::rc::Rc;

    use super::*;
    use crate::segregated::{SegregatedAllocator, SegregatedConfig};

    /// Fills `count` elements through the adapter, checks them and releases
    /// the storage.
    fn fill_and_release<A>(allocator: &mut A, count: usize, value: impl Fn(usize) -> A::Value)
    where
        A: ElementAllocator,
        A::Value: PartialEq + core::fmt::Debug,
    {
        let buf = allocator.allocate(count).unwrap();
        unsafe {
            for i in 0..count {
                allocator.construct(buf.add(i), value(i));
            }
            for i in 0..count {
                assert_eq!(*buf.add(i).as_ref(), value(i));
                allocator.destroy(buf.add(i));
            }
            allocator.deallocate(buf, count);
        }
    }

    #[test]
    fn test_slab_pool_adapter() {
        let mut pool = SlabPool::<u64>::new();
        fill_and_release(&mut pool, 1, |i| i as u64 + 7);

        let slot = ElementAllocator::allocate(&mut pool, 1).unwrap();
        unsafe { ElementAllocator::deallocate(&mut pool, slot, 1) };
        assert_eq!(pool.blocks(), 1);
        assert_eq!(ElementAllocator::max_size(&pool), pool.max_size());
    }

    #[test]
    fn test_slab_pool_rebind_is_independent() {
        let mut pool = SlabPool::<u8>::new();
        let a = ElementAllocator::allocate(&mut pool, 1).unwrap();

        let mut wide = pool.rebind::<[u64; 4]>();
        assert_eq!(wide.blocks(), 0);
        fill_and_release(&mut wide, 1, |_| [1, 2, 3, 4]);
        assert_eq!(wide.blocks(), 1);
        assert_eq!(pool.blocks(), 1);

        unsafe { ElementAllocator::deallocate(&mut pool, a, 1) };
    }

    #[test]
    fn test_segregated_elements() {
        let shared = LockedAllocator::default();
        let mut ints = SegregatedElements::<u32>::new(&shared);
        fill_and_release(&mut ints, 100, |i| i as u32 * 3);
        fill_and_release(&mut ints, 20_000, |i| i as u32);

        let stats = shared.stats();
        assert_eq!(stats.refills, 1);
        assert_eq!(stats.fallback_allocations, 1);
    }

    #[test]
    fn test_segregated_elements_reuse_through_rebind() {
        let shared = LockedAllocator::default();
        let mut bytes = SegregatedElements::<u8>::new(&shared);
        let buf = bytes.allocate(100).unwrap();
        unsafe { bytes.deallocate(buf, 100) };

        // 6 * 16 = 96 bytes falls in the same 128-byte class
        let mut pairs = bytes.rebind::<(u64, u64)>();
        assert_eq!(pairs.allocate(6).unwrap().cast::<u8>(), buf);
        assert_eq!(pairs, bytes.rebind::<(u64, u64)>());
    }

    #[test]
    fn test_segregated_elements_zero_sized() {
        let shared = LockedAllocator::default();
        let mut units = SegregatedElements::<()>::new(&shared);
        let ptr = units.allocate(1000).unwrap();
        assert_eq!(ptr, NonNull::dangling());
        unsafe { units.deallocate(ptr, 1000) };

        let mut ints = units.rebind::<u64>();
        let ptr = ints.allocate(0).unwrap();
        unsafe { ints.deallocate(ptr, 0) };
        assert_eq!(shared.stats().refills, 0);
        assert_eq!(units.max_size(), usize::MAX >> 1);
    }

    #[test]
    fn test_segregated_elements_capacity_overflow() {
        let shared = LockedAllocator::default();
        let mut ints = SegregatedElements::<u64>::new(&shared);
        assert!(matches!(
            ints.allocate(usize::MAX / 4),
            Err(AllocError::CapacityOverflow { elem_size: 8, .. })
        ));
        assert_eq!(ints.max_size(), (usize::MAX >> 1) / 8);
    }

    #[test]
    fn test_segregated_elements_over_aligned() {
        #[derive(Debug, PartialEq)]
        #[repr(align(128))]
        struct Line([u8; 128]);

        let shared = LockedAllocator::new(SegregatedAllocator::with_config(
            SegregatedConfig::DEFAULT,
            Global,
        ));
        let mut lines = SegregatedElements::<Line>::new(&shared);
        let buf = lines.allocate(3).unwrap();
        assert_eq!(buf.addr().get() % 128, 0);
        unsafe { lines.deallocate(buf, 3) };
        assert_eq!(shared.stats().fallback_allocations, 1);
    }

    #[test]
    fn test_destroy_runs_drop() {
        let shared = LockedAllocator::default();
        let mut handles = SegregatedElements::<Rc<()>>::new(&shared);
        let marker = Rc::new(());
        let buf = handles.allocate(4).unwrap();
        unsafe {
            for i in 0..4 {
                handles.construct(buf.add(i), Rc::clone(&marker));
            }
            assert_eq!(Rc::strong_count(&marker), 5);
            for i in 0..4 {
                handles.destroy(buf.add(i));
            }
            handles.deallocate(buf, 4);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
    }
}
