//! Bump arena backing the size classes.
//!
//! The arena is a window `[start, end)` inside the most recent chunk obtained
//! from the raw source. Cells are carved by advancing `start`. When a request
//! no longer fits, a larger chunk is obtained and the window moves to it; the
//! unused tail of the old window is handed back to the caller so that it can
//! be reused as a free cell.
//!
//! ```text
//! Chunk:
//! ┌──────────────┬────────────────────────────┬───────────────────────┐
//! │ ChunkHeader  │ carved cells               │ window [start, end)   │
//! │ (padded)     │                            │                       │
//! └──────────────┴────────────────────────────┴───────────────────────┘
//! ```
//!
//! Chunks are never returned to the raw source while the arena is alive.
//! Each chunk header links to the previous chunk so that
//! [`Arena::release`] can return all of them at once.

use core::{alloc::Layout, ptr, ptr::NonNull};

use crate::{
    error::{AllocError, OutOfMemorySnafu},
    raw::{self, RawAlloc},
};

#[repr(C)]
struct ChunkHeader {
    prev: *mut ChunkHeader,
    layout: Layout,
}

/// An unused tail left behind when the arena moves to a new chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fragment {
    pub(crate) start: NonNull<u8>,
    pub(crate) len: usize,
}

#[derive(Debug)]
pub(crate) struct Arena {
    start: *mut u8,
    end: *mut u8,
    /// Total usable bytes ever obtained from the raw source.
    heap_size: usize,
    growths: usize,
    chunks: *mut ChunkHeader,
}

impl Arena {
    pub(crate) const fn new() -> Self {
        Self {
            start: ptr::null_mut(),
            end: ptr::null_mut(),
            heap_size: 0,
            growths: 0,
            chunks: ptr::null_mut(),
        }
    }

    /// Bytes left in the current window.
    pub(crate) fn available(&self) -> usize {
        self.end.addr() - self.start.addr()
    }

    pub(crate) fn heap_size(&self) -> usize {
        self.heap_size
    }

    pub(crate) fn growths(&self) -> usize {
        self.growths
    }

    /// Current window as addresses.
    pub(crate) fn window(&self) -> (usize, usize) {
        (self.start.addr(), self.end.addr())
    }

    /// Advances the watermark by `bytes` and returns the old position.
    ///
    /// The caller must have checked that `bytes` are [available].
    ///
    /// [available]: Self::available
    pub(crate) fn bump(&mut self, bytes: usize) -> NonNull<u8> {
        assert!(bytes > 0 && bytes <= self.available());
        let start = self.start;
        unsafe {
            self.start = start.add(bytes);
            NonNull::new_unchecked(start)
        }
    }

    /// Size of the next chunk when `needed` bytes did not fit.
    ///
    /// Twice the request plus a sixteenth of everything obtained so far,
    /// rounded to the granularity, so that growth accelerates under sustained
    /// demand. Returns `None` on arithmetic overflow.
    pub(crate) fn growth_request(&self, needed: usize, granularity: usize) -> Option<usize> {
        let history = (self.heap_size >> 4).checked_next_multiple_of(granularity)?;
        needed.checked_mul(2)?.checked_add(history)
    }

    /// Obtains a chunk with `bytes` usable bytes aligned to `align` and moves
    /// the window to it.
    ///
    /// On success returns the tail of the previous window, if any. On failure
    /// the arena is unchanged.
    pub(crate) fn grow<R>(
        &mut self,
        bytes: usize,
        align: usize,
        raw: &R,
    ) -> Result<Option<Fragment>, AllocError>
    where
        R: RawAlloc,
    {
        let header_size = size_of::<ChunkHeader>().next_multiple_of(align);
        let total = header_size
            .checked_add(bytes)
            .ok_or_else(|| OutOfMemorySnafu { size: bytes, align }.build())?;
        let layout = raw::layout(total, align.max(align_of::<ChunkHeader>()))?;
        let chunk = raw.allocate(layout)?;

        #[expect(clippy::cast_ptr_alignment)]
        let header = chunk.as_ptr().cast::<ChunkHeader>();
        unsafe {
            header.write(ChunkHeader {
                prev: self.chunks,
                layout,
            });
        }
        self.chunks = header;

        let fragment = NonNull::new(self.start)
            .filter(|_| self.available() > 0)
            .map(|start| Fragment {
                start,
                len: self.available(),
            });

        unsafe {
            self.start = chunk.as_ptr().add(header_size);
            self.end = self.start.add(bytes);
        }
        self.heap_size += bytes;
        self.growths += 1;

        debug!(
            "arena: chunk #{} of {bytes} bytes at {:p}, heap size {}",
            self.growths,
            self.start,
            self.heap_size
        );
        Ok(fragment)
    }

    /// Returns every chunk to `raw` and resets the arena.
    ///
    /// # Safety
    ///
    /// `raw` must be the source the chunks were obtained from, and no cell
    /// carved from the arena may be used afterwards.
    pub(crate) unsafe fn release<R>(&mut self, raw: &R)
    where
        R: RawAlloc,
    {
        let mut chunk = self.chunks;
        while let Some(current) = NonNull::new(chunk) {
            unsafe {
                let ChunkHeader { prev, layout } = current.as_ptr().read();
                raw.deallocate(current.cast(), layout);
                chunk = prev;
            }
        }
        *self = Self::new();
    }
}
