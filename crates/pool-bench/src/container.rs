//! Minimal containers that obtain their storage from an [`ElementAllocator`].

use std::{
    alloc::Layout,
    marker::PhantomData,
    ops::{Index, IndexMut},
    ptr::{self, NonNull},
    slice,
};

use mempool::{
    AllocError, ElementAllocator, SlabPool,
    error::Location,
    raw::{RawAlloc as _, System},
};

/// A growable array over an element allocator.
pub struct PoolVec<A>
where
    A: ElementAllocator,
{
    ptr: NonNull<A::Value>,
    len: usize,
    cap: usize,
    alloc: A,
}

impl<A> PoolVec<A>
where
    A: ElementAllocator,
{
    pub fn new_in(alloc: A) -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            cap: 0,
            alloc,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[A::Value] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Resizes to `new_len`, filling new elements with clones of `value`.
    ///
    /// Storage is only reallocated when growing past the capacity, to at
    /// least twice the previous capacity.
    pub fn resize(&mut self, new_len: usize, value: A::Value) -> Result<(), AllocError>
    where
        A::Value: Clone,
    {
        if new_len <= self.len {
            while self.len > new_len {
                self.len -= 1;
                unsafe { self.alloc.destroy(self.ptr.add(self.len)) };
            }
            return Ok(());
        }

        if new_len > self.cap {
            self.grow(new_len.max(self.cap * 2))?;
        }
        while self.len < new_len {
            unsafe { self.alloc.construct(self.ptr.add(self.len), value.clone()) };
            self.len += 1;
        }
        Ok(())
    }

    fn grow(&mut self, cap: usize) -> Result<(), AllocError> {
        let ptr = self.alloc.allocate(cap)?;
        if self.cap > 0 {
            unsafe {
                ptr::copy_nonoverlapping(self.ptr.as_ptr(), ptr.as_ptr(), self.len);
                self.alloc.deallocate(self.ptr, self.cap);
            }
        }
        self.ptr = ptr;
        self.cap = cap;
        Ok(())
    }
}

impl<A> Index<usize> for PoolVec<A>
where
    A: ElementAllocator,
{
    type Output = A::Value;

    fn index(&self, index: usize) -> &A::Value {
        &self.as_slice()[index]
    }
}

impl<A> IndexMut<usize> for PoolVec<A>
where
    A: ElementAllocator,
{
    fn index_mut(&mut self, index: usize) -> &mut A::Value {
        unsafe { &mut slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len)[index] }
    }
}

impl<A> Drop for PoolVec<A>
where
    A: ElementAllocator,
{
    fn drop(&mut self) {
        for i in 0..self.len {
            unsafe { self.alloc.destroy(self.ptr.add(i)) };
        }
        if self.cap > 0 {
            unsafe { self.alloc.deallocate(self.ptr, self.cap) };
        }
    }
}

/// Element allocator that calls the system allocator directly.
///
/// Used as the baseline the pools are measured against.
pub struct SystemElements<T>(PhantomData<fn() -> T>);

impl<T> SystemElements<T> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SystemElements<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SystemElements<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SystemElements<T> {}

impl<T> ElementAllocator for SystemElements<T> {
    type Value = T;
    type Rebind<U> = SystemElements<U>;

    fn allocate(&mut self, count: usize) -> Result<NonNull<T>, AllocError> {
        let Ok(layout) = Layout::array::<T>(count) else {
            return Err(AllocError::CapacityOverflow {
                count,
                elem_size: size_of::<T>(),
                location: Location::default(),
            });
        };
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }
        Ok(System.allocate(layout)?.cast())
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<T>, count: usize) {
        let Ok(layout) = Layout::array::<T>(count) else {
            return;
        };
        if layout.size() > 0 {
            unsafe { System.deallocate(ptr.cast(), layout) }
        }
    }

    fn max_size(&self) -> usize {
        (usize::MAX >> 1) / size_of::<T>().max(1)
    }

    fn rebind<U>(&self) -> SystemElements<U> {
        SystemElements::new()
    }
}

/// Node of a [`PoolList`].
pub struct Node<T> {
    value: T,
    next: Option<NonNull<Node<T>>>,
}

/// A singly linked stack whose nodes live in a shared [`SlabPool`].
///
/// The list does not own its pool, so it must be [cleared](Self::clear)
/// with the same pool before either is dropped.
pub struct PoolList<T> {
    head: Option<NonNull<Node<T>>>,
    len: usize,
}

impl<T> Default for PoolList<T> {
    fn default() -> Self {
        Self { head: None, len: 0 }
    }
}

impl<T> PoolList<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.head.map(|node| unsafe { &mut (*node.as_ptr()).value })
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let mut node = self.head;
        std::iter::from_fn(move || {
            let current = node?;
            let current = unsafe { &*current.as_ptr() };
            node = current.next;
            Some(&current.value)
        })
    }

    /// Pushes or pops nodes at the front until the list holds `new_len`
    /// elements.
    pub fn resize<const B: usize>(
        &mut self,
        pool: &mut SlabPool<Node<T>, B>,
        new_len: usize,
        value: &T,
    ) -> Result<(), AllocError>
    where
        T: Clone,
    {
        while self.len > new_len {
            self.pop(pool);
        }
        while self.len < new_len {
            let node = pool.allocate()?;
            unsafe {
                pool.construct(
                    node,
                    Node {
                        value: value.clone(),
                        next: self.head,
                    },
                );
            }
            self.head = Some(node);
            self.len += 1;
        }
        Ok(())
    }

    pub fn clear<const B: usize>(&mut self, pool: &mut SlabPool<Node<T>, B>) {
        while self.len > 0 {
            self.pop(pool);
        }
    }

    fn pop<const B: usize>(&mut self, pool: &mut SlabPool<Node<T>, B>) {
        let Some(node) = self.head else {
            return;
        };
        unsafe {
            self.head = node.as_ref().next;
            pool.destroy(node);
            pool.deallocate(node);
        }
        self.len -= 1;
    }
}
