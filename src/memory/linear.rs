//! Bump allocator for short-lived scratch memory.
//!
//! Allocation is a pointer bump; individual frees are not supported. The
//! whole arena is released at once with `reset`, which invalidates every
//! outstanding allocation (the broker's handle table is what makes that
//! safe for callers).

use crate::error::{Error, ErrorKind, Result};
use crate::memory::allocator::{align_up, AllocatorKind, AllocatorStats, RegionAllocator};

/// Bump allocator over a fixed arena.
#[derive(Debug)]
pub struct LinearAllocator {
    total: usize,
    cursor: usize,
    peak: usize,
    live: usize,
}

impl LinearAllocator {
    /// Creates an arena of `total` bytes.
    #[must_use]
    pub const fn new(total: usize) -> Self {
        Self {
            total,
            cursor: 0,
            peak: 0,
            live: 0,
        }
    }

    /// Number of outstanding allocations since the last reset.
    #[must_use]
    pub const fn live(&self) -> usize {
        self.live
    }
}

impl RegionAllocator for LinearAllocator {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Linear
    }

    fn total(&self) -> usize {
        self.total
    }

    fn used(&self) -> usize {
        self.cursor
    }

    fn allocate(&mut self, size: usize, align: usize) -> Result<usize> {
        let offset = align_up(self.cursor, align);
        let end = offset.checked_add(size).ok_or_else(|| {
            Error::new(ErrorKind::InvalidParameters, "allocation size overflow")
        })?;
        if end > self.total {
            return Err(Error::new(ErrorKind::OutOfMemory, "arena exhausted"));
        }
        self.cursor = end;
        self.peak = self.peak.max(self.cursor);
        self.live += 1;
        Ok(offset)
    }

    fn free(&mut self, _offset: usize, _size: usize) -> Result<()> {
        Err(Error::new(
            ErrorKind::FeatureNotSupported,
            "linear allocations are freed by arena reset",
        ))
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        self.live = 0;
        Ok(())
    }

    fn supports(&self, size: usize, align: usize) -> bool {
        align_up(0, align) + size <= self.total
    }

    fn largest_free_block(&self) -> usize {
        self.total - self.cursor
    }

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            kind: AllocatorKind::Linear,
            total: self.total,
            used: self.cursor,
            free: self.total - self.cursor,
            peak: self.peak,
            allocation_count: self.live,
            largest_free_block: self.largest_free_block(),
            fragmentation_pct: 0.0,
        }
    }
}
