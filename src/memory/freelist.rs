//! General-purpose first-fit free-list allocator.
//!
//! Allocation walks the free list (O(n)); free is a push (O(1)).
//! Adjacent free spans are merged lazily by [`RegionAllocator::defragment`],
//! which reshapes the free list without moving live allocations.

use crate::error::{Error, ErrorKind, Result};
use crate::memory::allocator::{align_up, AllocatorKind, AllocatorStats, RegionAllocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    offset: usize,
    size: usize,
}

/// First-fit free-list allocator.
#[derive(Debug)]
pub struct FreeListAllocator {
    total: usize,
    free: Vec<Span>,
    used: usize,
    peak: usize,
    allocation_count: usize,
}

impl FreeListAllocator {
    /// Creates an allocator over `total` bytes.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            free: vec![Span {
                offset: 0,
                size: total,
            }],
            used: 0,
            peak: 0,
            allocation_count: 0,
        }
    }

    /// Fragmentation ratio in percent: 0 when the free space is one span.
    #[must_use]
    pub fn fragmentation_pct(&self) -> f32 {
        let free_total: usize = self.free.iter().map(|s| s.size).sum();
        if free_total == 0 {
            return 0.0;
        }
        let largest = self.free.iter().map(|s| s.size).max().unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        let pct = (1.0 - largest as f32 / free_total as f32) * 100.0;
        pct
    }
}

impl RegionAllocator for FreeListAllocator {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::FreeList
    }

    fn total(&self) -> usize {
        self.total
    }

    fn used(&self) -> usize {
        self.used
    }

    fn allocate(&mut self, size: usize, align: usize) -> Result<usize> {
        for i in 0..self.free.len() {
            let span = self.free[i];
            let aligned = align_up(span.offset, align);
            let padding = aligned - span.offset;
            if span.size < padding + size {
                continue;
            }
            // Carve the span: padding stays free, the tail goes back.
            let tail_offset = aligned + size;
            let tail_size = span.size - padding - size;
            self.free.swap_remove(i);
            if padding > 0 {
                self.free.push(Span {
                    offset: span.offset,
                    size: padding,
                });
            }
            if tail_size > 0 {
                self.free.push(Span {
                    offset: tail_offset,
                    size: tail_size,
                });
            }
            self.used += size;
            self.peak = self.peak.max(self.used);
            self.allocation_count += 1;
            return Ok(aligned);
        }
        Err(Error::new(ErrorKind::OutOfMemory, "free list exhausted"))
    }

    fn free(&mut self, offset: usize, size: usize) -> Result<()> {
        if offset + size > self.total {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "range outside the managed region",
            ));
        }
        self.free.push(Span { offset, size });
        self.used = self.used.saturating_sub(size);
        self.allocation_count = self.allocation_count.saturating_sub(1);
        Ok(())
    }

    fn supports(&self, size: usize, align: usize) -> bool {
        align_up(0, align) + size <= self.total
    }

    fn largest_free_block(&self) -> usize {
        self.free.iter().map(|s| s.size).max().unwrap_or(0)
    }

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            kind: AllocatorKind::FreeList,
            total: self.total,
            used: self.used,
            free: self.free.iter().map(|s| s.size).sum(),
            peak: self.peak,
            allocation_count: self.allocation_count,
            largest_free_block: self.largest_free_block(),
            fragmentation_pct: self.fragmentation_pct(),
        }
    }

    fn supports_defrag(&self) -> bool {
        true
    }

    fn defragment(&mut self) -> Result<usize> {
        if self.free.len() < 2 {
            return Ok(0);
        }
        self.free.sort_unstable_by_key(|s| s.offset);
        let mut merged = Vec::with_capacity(self.free.len());
        let mut merges = 0;
        let mut current = self.free[0];
        for span in &self.free[1..] {
            if current.offset + current.size == span.offset {
                current.size += span.size;
                merges += 1;
            } else {
                merged.push(current);
                current = *span;
            }
        }
        merged.push(current);
        self.free = merged;
        Ok(merges)
    }
}
