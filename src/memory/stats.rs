//! Broker-level memory statistics.
//!
//! The live counters are relaxed atomics bumped on every allocate and
//! deallocate; readers may trail writers by at most one operation. The
//! snapshot combines them with a walk of the per-allocator stats for the
//! shape-dependent figures (fragmentation, largest free span).

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub struct StatCounters {
    used: AtomicU64,
    peak: AtomicU64,
    allocation_count: AtomicU64,
    total_allocations: AtomicU64,
}

impl StatCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful allocation of `size` bytes.
    pub fn record_alloc(&self, size: usize) {
        let used = self
            .used
            .fetch_add(size as u64, Ordering::Relaxed)
            .saturating_add(size as u64);
        self.peak.fetch_max(used, Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a free of `size` bytes.
    pub fn record_free(&self, size: usize) {
        self.used.fetch_sub(size as u64, Ordering::Relaxed);
        self.allocation_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Records a wholesale release of `size` bytes across `count`
    /// allocations (arena reset).
    pub fn record_reset(&self, size: usize, count: usize) {
        self.used.fetch_sub(size as u64, Ordering::Relaxed);
        self.allocation_count
            .fetch_sub(count as u64, Ordering::Relaxed);
    }

    /// Bytes currently allocated.
    #[must_use]
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    /// High-water mark of used bytes.
    #[must_use]
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Number of live allocations.
    #[must_use]
    pub fn allocation_count(&self) -> u64 {
        self.allocation_count.load(Ordering::Relaxed)
    }

    /// Number of allocations ever made.
    #[must_use]
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations.load(Ordering::Relaxed)
    }
}

/// Point-in-time broker statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryStats {
    /// Total managed bytes (bounded regions plus system budget).
    pub total: u64,
    /// Bytes currently allocated.
    pub used: u64,
    /// Bytes currently free.
    pub free: u64,
    /// High-water mark of used bytes.
    pub peak: u64,
    /// Number of live allocations.
    pub allocation_count: u64,
    /// Worst per-allocator fragmentation percentage.
    pub fragmentation_pct: f32,
    /// Largest free span across allocators.
    pub largest_free_block: u64,
    /// Used bytes over peak bytes; 1.0 with no history.
    pub efficiency: f32,
}
