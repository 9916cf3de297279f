//! Size-class parameters of the segregated allocator.

use snafu::ensure;

use crate::error::{
    ConfigError, GranularityNotPowerOfTwoSnafu, GranularityTooSmallSnafu, InvalidCeilingSnafu,
    ZeroBatchCountSnafu,
};

/// Tuning parameters of a [`SegregatedAllocator`](super::SegregatedAllocator).
///
/// Requests are rounded up to a multiple of `granularity`; every multiple up
/// to and including `ceiling` has its own free list. Requests above `ceiling`
/// bypass the size classes. `batch_count` is the number of cells carved from
/// the arena when a class runs dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegregatedConfig {
    granularity: usize,
    ceiling: usize,
    batch_count: usize,
}

impl Default for SegregatedConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl SegregatedConfig {
    /// 64-byte granularity, 64 KiB ceiling (1024 classes), batches of 20.
    pub const DEFAULT: Self = Self {
        granularity: 64,
        ceiling: 65536,
        batch_count: 20,
    };

    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// - `granularity` must be a power of two no smaller than a pointer, so
    ///   that every cell can hold a free-list link and rounding is a mask.
    /// - `ceiling` must be a nonzero multiple of `granularity`.
    /// - `batch_count` must be at least one.
    pub fn new(granularity: usize, ceiling: usize, batch_count: usize) -> Result<Self, ConfigError> {
        ensure!(
            granularity.is_power_of_two(),
            GranularityNotPowerOfTwoSnafu { granularity }
        );
        ensure!(
            granularity >= size_of::<*mut u8>(),
            GranularityTooSmallSnafu {
                granularity,
                min: size_of::<*mut u8>(),
            }
        );
        ensure!(
            ceiling > 0 && ceiling.is_multiple_of(granularity),
            InvalidCeilingSnafu {
                ceiling,
                granularity
            }
        );
        ensure!(batch_count > 0, ZeroBatchCountSnafu);
        Ok(Self {
            granularity,
            ceiling,
            batch_count,
        })
    }

    /// Returns a copy with a different granularity.
    pub fn with_granularity(self, granularity: usize) -> Result<Self, ConfigError> {
        Self::new(granularity, self.ceiling, self.batch_count)
    }

    /// Returns a copy with a different ceiling.
    pub fn with_ceiling(self, ceiling: usize) -> Result<Self, ConfigError> {
        Self::new(self.granularity, ceiling, self.batch_count)
    }

    /// Returns a copy with a different refill batch size.
    pub fn with_batch_count(self, batch_count: usize) -> Result<Self, ConfigError> {
        Self::new(self.granularity, self.ceiling, batch_count)
    }

    #[must_use]
    pub const fn granularity(&self) -> usize {
        self.granularity
    }

    #[must_use]
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    #[must_use]
    pub const fn batch_count(&self) -> usize {
        self.batch_count
    }

    /// Number of size classes.
    #[must_use]
    pub const fn class_count(&self) -> usize {
        self.ceiling / self.granularity
    }

    /// Rounds `bytes` up to the next multiple of the granularity.
    ///
    /// A zero-byte request is treated as a one-byte request.
    #[must_use]
    pub const fn round_up(&self, bytes: usize) -> usize {
        let bytes = if bytes == 0 { 1 } else { bytes };
        (bytes + self.granularity - 1) & !(self.granularity - 1)
    }

    /// Returns the size class serving a request of `bytes` bytes.
    ///
    /// The result is only meaningful for `bytes <= ceiling`.
    #[must_use]
    pub const fn class_index(&self, bytes: usize) -> usize {
        let bytes = if bytes == 0 { 1 } else { bytes };
        bytes.div_ceil(self.granularity) - 1
    }

    /// Returns the cell size of size class `index`.
    #[must_use]
    pub const fn class_size(&self, index: usize) -> usize {
        (index + 1) * self.granularity
    }

    /// Returns `true` if requests of `bytes` bytes bypass the size classes.
    #[must_use]
    pub const fn is_oversized(&self, bytes: usize) -> bool {
        bytes > self.ceiling
    }
}
