//! Error types shared by the allocation engines.

use core::{fmt, panic};

use snafu::{GenerateImplicitData, Snafu};

/// Source location captured when an error value is built.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(&'static panic::Location<'static>);

impl Location {
    /// Returns the file in which the error was raised.
    #[must_use]
    pub fn file(&self) -> &'static str {
        self.0.file()
    }

    /// Returns the line on which the error was raised.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.0.line()
    }
}

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Errors reported by the allocation engines.
///
/// Only growth and fallback paths can fail. Free-list pops and bump
/// allocation inside an already obtained region never produce an error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AllocError {
    /// The system allocator could not provide `size` bytes aligned to
    /// `align`, or the request itself could not be expressed as a layout.
    #[snafu(display("out of memory: cannot obtain {size} bytes aligned to {align}"))]
    OutOfMemory {
        size: usize,
        align: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// `count` elements of `elem_size` bytes do not fit in `usize`.
    #[snafu(display("capacity overflow: {count} elements of {elem_size} bytes"))]
    CapacityOverflow {
        count: usize,
        elem_size: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Errors reported when validating a [`SegregatedConfig`].
///
/// [`SegregatedConfig`]: crate::segregated::SegregatedConfig
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("granularity {granularity} is not a power of two"))]
    GranularityNotPowerOfTwo {
        granularity: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("granularity {granularity} is smaller than a pointer ({min} bytes)"))]
    GranularityTooSmall {
        granularity: usize,
        min: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("ceiling {ceiling} is not a nonzero multiple of granularity {granularity}"))]
    InvalidCeiling {
        ceiling: usize,
        granularity: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("batch count must be at least one"))]
    ZeroBatchCount {
        #[snafu(implicit)]
        location: Location,
    },
}
