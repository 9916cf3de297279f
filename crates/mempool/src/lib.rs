//! Pool allocators for container storage.
//!
//! This crate provides two independent allocation engines that sit between a
//! container and the system allocator. Both are `no_std` compatible and only
//! depend on a [`RawAlloc`](raw::RawAlloc) source for their backing memory.
//!
//! # Available Allocators
//!
//! ## [`SlabPool`](slab_pool::SlabPool)
//!
//! A typed pool that serves exactly one `T` per call. Best suited for:
//!
//! - Node-based containers (lists, trees, maps)
//! - Many short-lived objects of a single type
//!
//! **Performance**: O(1) allocation and deallocation. A new block of
//! `BLOCK_SIZE` bytes is requested only when both the free list and the
//! current block are exhausted.
//!
//! ## [`SegregatedAllocator`](segregated::SegregatedAllocator)
//!
//! A byte-oriented allocator with one free list per size class. Best suited
//! for:
//!
//! - Growable arrays and buffers of many different sizes
//! - Workloads that repeatedly free and reallocate similar sizes
//!
//! **Performance**: O(1) for requests up to the ceiling once their class has
//! been refilled; requests above the ceiling cost one system allocation.
//!
//! # Usage Examples
//!
//! ## Basic `SlabPool` Usage
//!
//! ```rust
//! use mempool::slab_pool::SlabPool;
//!
//! let mut pool = SlabPool::<[u64; 2]>::new();
//! let a = pool.allocate().unwrap();
//! let b = pool.allocate().unwrap();
//! unsafe {
//!     pool.construct(a, [1, 2]);
//!     pool.construct(b, [3, 4]);
//!     pool.deallocate(a);
//! }
//! // The most recently released slot is reused first.
//! assert_eq!(pool.allocate().unwrap(), a);
//! ```
//!
//! ## Basic `SegregatedAllocator` Usage
//!
//! ```rust
//! use mempool::segregated::{SegregatedAllocator, SegregatedConfig};
//!
//! let config = SegregatedConfig::new(32, 4096, 8).unwrap();
//! let mut allocator = SegregatedAllocator::with_config(config, mempool::raw::Global);
//!
//! let small = allocator.allocate(24).unwrap(); // 32-byte class
//! let large = allocator.allocate(10_000).unwrap(); // forwarded to the raw source
//! unsafe {
//!     allocator.deallocate(small, 24);
//!     allocator.deallocate(large, 10_000);
//! }
//!
//! let stats = allocator.stats();
//! assert_eq!(stats.refills, 1);
//! assert_eq!(stats.fallback_allocations, 1);
//! ```
//!
//! # Design Considerations
//!
//! ## Memory Safety
//!
//! Deallocation is `unsafe` in both engines. Callers must ensure:
//!
//! - Memory is returned to the allocator it came from
//! - The segregated allocator is given a size in the same class as the
//!   original request
//! - No use-after-free or double-free
//!
//! Violations are only checked by `debug_assert!`s.
//!
//! ## Thread Safety
//!
//! Both engines are `Send` but not `Sync`. Use
//! [`LockedAllocator`](locked::LockedAllocator) to share a segregated
//! allocator between threads or to install it as the global allocator.
//!
//! ## Performance Characteristics
//!
//! | Allocator | Allocation | Deallocation | Per-allocation Overhead | Best Use Case |
//! |-----------|------------|--------------|-------------------------|---------------|
//! | `SlabPool` | O(1) | O(1) | none (slots are at least one pointer) | One type, one at a time |
//! | `SegregatedAllocator` | O(1)* | O(1)* | rounding to the granularity | Buffers of varying size |
//!
//! *For requests up to the ceiling (64 KiB by default)
//!
//! # Features
//!
//! - `log` (default): emit growth and refill events through the `log` facade.
//! - `std`: enables [`raw::System`] and `std::error::Error` for the error
//!   types.

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(feature = "log")]
macro_rules! log_event {
    ($level:ident, $($arg:tt)*) => {
        ::log::$level!($($arg)*)
    };
}

#[cfg(not(feature = "log"))]
macro_rules! log_event {
    ($level:ident, $($arg:tt)*) => {
        if false {
            let _ = ::core::format_args!($($arg)*);
        }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => {
        log_event!(trace, $($arg)*)
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        log_event!(debug, $($arg)*)
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        log_event!(warn, $($arg)*)
    };
}

pub mod adapter;
pub mod error;
pub mod locked;
pub mod raw;
pub mod segregated;
pub mod slab_pool;

pub use self::{
    adapter::{ElementAllocator, SegregatedElements},
    error::{AllocError, ConfigError},
    locked::LockedAllocator,
    segregated::{SegregatedAllocator, SegregatedConfig, SegregatedStats},
    slab_pool::SlabPool,
};
