//! Fixed-block pool allocator.
//!
//! Every block has the same size, so allocation and free are O(1) list
//! operations and fragmentation is structurally zero. Requests larger than
//! the block size are not supported here; the broker routes them elsewhere.

use crate::error::{Error, ErrorKind, Result};
use crate::memory::allocator::{AllocatorKind, AllocatorStats, RegionAllocator};

/// Pool of fixed-size blocks.
#[derive(Debug)]
pub struct PoolAllocator {
    block_size: usize,
    block_count: usize,
    free: Vec<usize>,
    peak_blocks: usize,
}

impl PoolAllocator {
    /// Creates a pool of `block_count` blocks of `block_size` bytes.
    ///
    /// `block_size` must be a nonzero multiple of the largest supported
    /// alignment it should serve; blocks are laid out back to back from
    /// offset 0, so a power-of-two block size keeps every block aligned.
    pub fn new(block_size: usize, block_count: usize) -> Result<Self> {
        if block_size == 0 || block_count == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "pool dimensions must be nonzero",
            ));
        }
        // Free blocks are popped from the back; seed in reverse so the
        // first allocation lands at offset 0.
        let free = (0..block_count).rev().map(|i| i * block_size).collect();
        Ok(Self {
            block_size,
            block_count,
            free,
            peak_blocks: 0,
        })
    }

    /// The fixed block size.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    fn used_blocks(&self) -> usize {
        self.block_count - self.free.len()
    }
}

impl RegionAllocator for PoolAllocator {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Pool
    }

    fn total(&self) -> usize {
        self.block_size * self.block_count
    }

    fn used(&self) -> usize {
        self.used_blocks() * self.block_size
    }

    fn allocate(&mut self, size: usize, align: usize) -> Result<usize> {
        if !self.supports(size, align) {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "request does not fit the pool block shape",
            ));
        }
        let offset = self
            .free
            .pop()
            .ok_or_else(|| Error::new(ErrorKind::OutOfMemory, "pool exhausted"))?;
        self.peak_blocks = self.peak_blocks.max(self.used_blocks());
        Ok(offset)
    }

    fn free(&mut self, offset: usize, _size: usize) -> Result<()> {
        if offset % self.block_size != 0 || offset >= self.total() {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "offset is not a pool block",
            ));
        }
        if self.free.contains(&offset) {
            return Err(Error::new(ErrorKind::InvalidState, "pool block double free"));
        }
        self.free.push(offset);
        Ok(())
    }

    fn supports(&self, size: usize, align: usize) -> bool {
        size <= self.block_size && self.block_size % align == 0
    }

    fn largest_free_block(&self) -> usize {
        if self.free.is_empty() {
            0
        } else {
            self.block_size
        }
    }

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            kind: AllocatorKind::Pool,
            total: self.total(),
            used: self.used(),
            free: self.free.len() * self.block_size,
            peak: self.peak_blocks * self.block_size,
            allocation_count: self.used_blocks(),
            largest_free_block: self.largest_free_block(),
            fragmentation_pct: 0.0,
        }
    }
}
