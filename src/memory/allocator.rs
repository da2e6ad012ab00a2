//! The allocator contract and allocation descriptors.
//!
//! Allocators in the core are *bookkeeping engines*: each arbitrates the
//! byte range of a region it owns and hands out offsets, never raw
//! pointers. The broker (see [`crate::memory`]) turns offsets into
//! generation-counted handles plus numeric addresses, so a stale reference
//! fails with `InvalidHandle` instead of touching reused memory.
//!
//! The allocator set is closed:
//!
//! | Kind | Alloc | Free | Invariant |
//! |---|---|---|---|
//! | Linear | O(1) | only via `reset` | contiguous; reset invalidates all outstanding allocations |
//! | Stack | O(1) | LIFO | freeing out of order is `InvalidFreeOrder` (surfaced as `InvalidState`) |
//! | Pool | O(1) | O(1) | fixed block size, zero fragmentation |
//! | Buddy | O(log n) | O(log n) | power-of-two blocks, buddies coalesce on free |
//! | FreeList | O(n) | O(1) | general-purpose, tracks fragmentation |
//! | System | host | host | delegates to the host allocator |

use crate::error::{Error, ErrorKind, Result};
use crate::types::handle::{Handle, HandleKind};
use core::fmt;
use serde::{Deserialize, Serialize};

/// The closed set of allocator strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AllocatorKind {
    /// Bump allocation, freed wholesale by `reset`.
    Linear,
    /// LIFO allocation with strict free ordering.
    Stack,
    /// Fixed-size blocks, zero fragmentation.
    Pool,
    /// Power-of-two buddy system.
    Buddy,
    /// General-purpose free list.
    FreeList,
    /// Host allocator delegation.
    System,
}

impl AllocatorKind {
    /// Every strategy, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Linear,
        Self::Stack,
        Self::Pool,
        Self::Buddy,
        Self::FreeList,
        Self::System,
    ];

    /// Returns the strategy name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Stack => "stack",
            Self::Pool => "pool",
            Self::Buddy => "buddy",
            Self::FreeList => "freelist",
            Self::System => "system",
        }
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Memory classes used for routing allocations to regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MemoryType {
    /// No routing preference.
    #[default]
    General,
    /// GPU-visible memory.
    Video,
    /// DMA-capable audio memory.
    Audio,
    /// Short-lived scratch memory (routed to a linear arena).
    Temporary,
    /// Fixed-size pooled memory.
    Pooled,
    /// Memory shareable across execution contexts.
    Shared,
}

/// Allocation behavior flags.
///
/// A plain bit set; combine with [`MemoryFlags::with`] or `union`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MemoryFlags(pub u16);

impl MemoryFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// May be cached.
    pub const CACHEABLE: Self = Self(1 << 0);
    /// Must live in an executable region.
    pub const EXECUTABLE: Self = Self(1 << 1);
    /// Survives across frames.
    pub const PERSISTENT: Self = Self(1 << 2);
    /// Must be reachable by DMA.
    pub const DMA_CAPABLE: Self = Self(1 << 3);
    /// Shareable across execution contexts.
    pub const SHARED: Self = Self(1 << 4);
    /// Short-lived scratch.
    pub const TEMPORARY: Self = Self(1 << 5);
    /// Never reclaimed under pressure; may consume the emergency reserve.
    pub const CRITICAL: Self = Self(1 << 6);
    /// Zero-initialized before the allocation is returned.
    pub const ZERO: Self = Self(1 << 7);

    /// True if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of the two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Alias for [`MemoryFlags::union`], reads well in builder chains.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        self.union(other)
    }
}

impl fmt::Debug for MemoryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(MemoryFlags, &str); 8] = [
            (MemoryFlags::CACHEABLE, "CACHEABLE"),
            (MemoryFlags::EXECUTABLE, "EXECUTABLE"),
            (MemoryFlags::PERSISTENT, "PERSISTENT"),
            (MemoryFlags::DMA_CAPABLE, "DMA_CAPABLE"),
            (MemoryFlags::SHARED, "SHARED"),
            (MemoryFlags::TEMPORARY, "TEMPORARY"),
            (MemoryFlags::CRITICAL, "CRITICAL"),
            (MemoryFlags::ZERO, "ZERO"),
        ];
        write!(f, "MemoryFlags(")?;
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "NONE")?;
        }
        write!(f, ")")
    }
}

/// The discrete set of supported alignments.
pub const SUPPORTED_ALIGNMENTS: [usize; 6] = [1, 4, 16, 32, 256, 4096];

/// Validates an alignment against the supported set.
pub fn check_alignment(align: usize) -> Result<()> {
    if SUPPORTED_ALIGNMENTS.contains(&align) {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::UnsupportedAlignment,
            "alignment outside the supported set",
        ))
    }
}

/// Rounds `offset` up to the next multiple of `align`.
///
/// `align` must be a power of two.
#[must_use]
pub const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

/// Handle kind tag for allocations.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationTag;

impl HandleKind for AllocationTag {
    const NAME: &'static str = "allocation";
}

/// A generation-counted reference to a live allocation.
pub type AllocationHandle = Handle<AllocationTag>;

/// Identifies an allocator instance within the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocatorId(pub u16);

/// A request for memory.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    /// Requested size in bytes. Must be nonzero.
    pub size: usize,
    /// Requested alignment; must be in the supported set.
    pub align: usize,
    /// Routing class.
    pub memory_type: MemoryType,
    /// Behavior flags.
    pub flags: MemoryFlags,
    /// Try this strategy first if it supports the request.
    pub preferred: Option<AllocatorKind>,
    /// Permit rerouting to the system allocator and other regions on
    /// failure.
    pub allow_fallback: bool,
}

impl AllocationRequest {
    /// A request with default routing: general memory, alignment 4.
    #[must_use]
    pub const fn new(size: usize) -> Self {
        Self {
            size,
            align: 4,
            memory_type: MemoryType::General,
            flags: MemoryFlags::NONE,
            preferred: None,
            allow_fallback: true,
        }
    }

    /// Sets the alignment.
    #[must_use]
    pub const fn with_align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    /// Sets the routing class.
    #[must_use]
    pub const fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }

    /// Sets behavior flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: MemoryFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Prefers a specific strategy.
    #[must_use]
    pub const fn prefer(mut self, kind: AllocatorKind) -> Self {
        self.preferred = Some(kind);
        self
    }

    /// Forbids rerouting on failure.
    #[must_use]
    pub const fn no_fallback(mut self) -> Self {
        self.allow_fallback = false;
        self
    }
}

/// A live allocation descriptor.
///
/// `addr` is a numeric address inside the owning region's range; byte
/// access goes through the broker with the handle, which is how stale
/// references are caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Generation-counted reference; invalid after `deallocate`.
    pub handle: AllocationHandle,
    /// Numeric address; `addr % align == 0`.
    pub addr: usize,
    /// Usable size in bytes.
    pub size: usize,
    /// Granted alignment.
    pub align: usize,
    /// Behavior flags in effect.
    pub flags: MemoryFlags,
    /// Routing class the allocation landed in.
    pub memory_type: MemoryType,
    /// The allocator instance that owns the bytes.
    pub allocator: AllocatorId,
}

/// Point-in-time counters for one allocator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocatorStats {
    /// Strategy of the allocator.
    pub kind: AllocatorKind,
    /// Total managed bytes.
    pub total: usize,
    /// Bytes currently allocated.
    pub used: usize,
    /// Bytes currently free.
    pub free: usize,
    /// High-water mark of `used`.
    pub peak: usize,
    /// Number of live allocations.
    pub allocation_count: usize,
    /// Largest single free span.
    pub largest_free_block: usize,
    /// Fragmentation percentage (0 when the free space is one span).
    pub fragmentation_pct: f32,
}

impl AllocatorStats {
    /// Allocation efficiency: used bytes over touched bytes.
    #[must_use]
    pub fn efficiency(&self) -> f32 {
        if self.peak == 0 {
            1.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let ratio = self.used as f32 / self.peak as f32;
            ratio
        }
    }
}

/// The bookkeeping contract every region allocator implements.
///
/// Offsets are region-relative. Implementations never touch backing bytes;
/// zeroing and byte access are broker concerns.
pub trait RegionAllocator: Send {
    /// The strategy implemented.
    fn kind(&self) -> AllocatorKind;

    /// Total bytes managed.
    fn total(&self) -> usize;

    /// Bytes currently allocated.
    fn used(&self) -> usize;

    /// Reserves `size` bytes at `align` and returns the offset.
    fn allocate(&mut self, size: usize, align: usize) -> Result<usize>;

    /// Releases the range previously returned for `(offset, size)`.
    fn free(&mut self, offset: usize, size: usize) -> Result<()>;

    /// Releases every outstanding allocation at once.
    ///
    /// Only the linear strategy supports this.
    fn reset(&mut self) -> Result<()> {
        Err(Error::new(
            ErrorKind::FeatureNotSupported,
            "reset is only supported by linear allocators",
        ))
    }

    /// True if a request of this shape could ever succeed here.
    fn supports(&self, size: usize, align: usize) -> bool;

    /// Largest free span currently available.
    fn largest_free_block(&self) -> usize;

    /// Point-in-time counters.
    fn stats(&self) -> AllocatorStats;

    /// True if [`RegionAllocator::defragment`] does anything here.
    fn supports_defrag(&self) -> bool {
        false
    }

    /// Cooperatively reshapes free space without moving live allocations.
    ///
    /// Returns the number of free spans merged.
    fn defragment(&mut self) -> Result<usize> {
        Err(Error::new(
            ErrorKind::FeatureNotSupported,
            "defragmentation not supported by this allocator",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_boundary() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 4), 20);
    }

    #[test]
    fn alignment_set_is_closed() {
        for align in SUPPORTED_ALIGNMENTS {
            assert!(check_alignment(align).is_ok());
        }
        for align in [0, 2, 8, 64, 128, 512, 1024, 2048, 8192] {
            assert_eq!(
                check_alignment(align).unwrap_err().kind(),
                ErrorKind::UnsupportedAlignment,
                "align {align} should be rejected"
            );
        }
    }

    #[test]
    fn flags_contain_and_union() {
        let flags = MemoryFlags::ZERO.with(MemoryFlags::CRITICAL);
        assert!(flags.contains(MemoryFlags::ZERO));
        assert!(flags.contains(MemoryFlags::CRITICAL));
        assert!(!flags.contains(MemoryFlags::EXECUTABLE));
        assert!(flags.contains(MemoryFlags::NONE));
    }

    #[test]
    fn flags_debug_lists_names() {
        let flags = MemoryFlags::DMA_CAPABLE.with(MemoryFlags::ZERO);
        let dbg = format!("{flags:?}");
        assert!(dbg.contains("DMA_CAPABLE"), "{dbg}");
        assert!(dbg.contains("ZERO"), "{dbg}");
        assert_eq!(format!("{:?}", MemoryFlags::NONE), "MemoryFlags(NONE)");
    }

    #[test]
    fn request_builder_chain() {
        let req = AllocationRequest::new(128)
            .with_align(16)
            .with_type(MemoryType::Audio)
            .with_flags(MemoryFlags::DMA_CAPABLE)
            .prefer(AllocatorKind::Pool)
            .no_fallback();
        assert_eq!(req.size, 128);
        assert_eq!(req.align, 16);
        assert_eq!(req.memory_type, MemoryType::Audio);
        assert_eq!(req.preferred, Some(AllocatorKind::Pool));
        assert!(!req.allow_fallback);
    }

    #[test]
    fn efficiency_bounds() {
        let stats = AllocatorStats {
            kind: AllocatorKind::FreeList,
            total: 1024,
            used: 512,
            free: 512,
            peak: 1024,
            allocation_count: 1,
            largest_free_block: 512,
            fragmentation_pct: 0.0,
        };
        assert!((stats.efficiency() - 0.5).abs() < f32::EPSILON);
    }
}
