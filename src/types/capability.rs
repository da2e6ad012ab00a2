//! Capability bits, masks, and the provider contract.
//!
//! Capabilities live in a fixed 128-slot bit namespace. The core claims the
//! low bits; each driver interface owns a sub-range it may extend without
//! colliding with the others. A [`CapabilityMask`] is a plain `u128` set
//! with const algebra, cheap to copy and compare.
//!
//! Providers — the platform itself and every active driver — answer
//! capability queries through [`CapabilityProvider`]. A provider must not
//! advertise a capability whose hardware dependency it cannot satisfy; it
//! advertises the bit only when the hardware exists or a software fallback
//! is registered.

use core::fmt;
use serde::{Deserialize, Serialize};

/// A named feature bit in the shared 128-slot namespace.
///
/// Bit layout: core 0–15, memory 16–31, graphics 32–47, audio 48–63,
/// input 64–79, file 80–95, network 96–111, performance 112–127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Capability {
    // ── Core (0–15) ─────────────────────────────────────────────────────
    /// Preemptive OS threads.
    Threading = 0,
    /// Native atomic operations.
    Atomics = 1,
    /// Sub-microsecond monotonic clock.
    HighResTimer = 2,
    /// Wall-clock time source.
    RealtimeClock = 3,
    /// Per-process CPU clock.
    ProcessClock = 4,
    /// Per-thread CPU clock.
    ThreadClock = 5,
    /// Hardware DMA transfer engine.
    DmaTransfer = 6,
    /// Write-combining store queues.
    StoreQueues = 7,
    /// Paged virtual memory.
    VirtualMemory = 8,
    /// Page-level memory protection.
    MemoryProtection = 9,
    /// Regions that may hold executable code.
    ExecutableMemory = 10,
    /// Memory shareable between execution contexts.
    SharedMemory = 11,

    // ── Memory (16–31) ──────────────────────────────────────────────────
    /// Dedicated video memory region.
    VideoMemory = 16,
    /// Dedicated audio memory region.
    AudioMemory = 17,
    /// Buddy allocation strategy available.
    BuddyAllocation = 18,
    /// Cooperative defragmentation available.
    Defragmentation = 19,

    // ── Graphics (32–47) ────────────────────────────────────────────────
    /// Linear framebuffer output.
    Framebuffer = 32,
    /// Hardware 3D rasterization.
    Hardware3D = 33,
    /// Display-list command submission.
    DisplayLists = 34,
    /// Hardware texture compression.
    TextureCompression = 35,

    // ── Audio (48–63) ───────────────────────────────────────────────────
    /// Basic PCM playback.
    BasicPcm = 48,
    /// Hardware DSP effects.
    HardwareDsp = 49,
    /// Multi-channel output.
    MultiChannelAudio = 50,

    // ── Input (64–79) ───────────────────────────────────────────────────
    /// Polled game controllers.
    Gamepad = 64,
    /// Keyboard input.
    Keyboard = 65,
    /// Pointer input.
    Pointer = 66,

    // ── File (80–95) ────────────────────────────────────────────────────
    /// Random-access persistent storage.
    RandomAccessStorage = 80,
    /// Removable media.
    RemovableMedia = 81,

    // ── Network (96–111) ────────────────────────────────────────────────
    /// Stream sockets.
    StreamSockets = 96,
    /// Datagram sockets.
    DatagramSockets = 97,

    // ── Performance (112–127) ───────────────────────────────────────────
    /// Hardware cycle counters.
    CycleCounters = 112,
    /// Cache hit/miss counters.
    CacheCounters = 113,
}

impl Capability {
    /// Returns the bit index of this capability.
    #[must_use]
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Returns the single-bit mask for this capability.
    #[must_use]
    pub const fn mask(self) -> CapabilityMask {
        CapabilityMask(1u128 << (self as u32))
    }
}

/// A set of capabilities over the shared 128-slot namespace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CapabilityMask(pub u128);

impl CapabilityMask {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// All core-range bits (0–15).
    pub const CORE_RANGE: Self = Self(0xFFFFu128);

    /// All memory-range bits (16–31).
    pub const MEMORY_RANGE: Self = Self(0xFFFFu128 << 16);

    /// All graphics-range bits (32–47).
    pub const GRAPHICS_RANGE: Self = Self(0xFFFFu128 << 32);

    /// All audio-range bits (48–63).
    pub const AUDIO_RANGE: Self = Self(0xFFFFu128 << 48);

    /// All input-range bits (64–79).
    pub const INPUT_RANGE: Self = Self(0xFFFFu128 << 64);

    /// All file-range bits (80–95).
    pub const FILE_RANGE: Self = Self(0xFFFFu128 << 80);

    /// All network-range bits (96–111).
    pub const NETWORK_RANGE: Self = Self(0xFFFFu128 << 96);

    /// All performance-range bits (112–127).
    pub const PERFORMANCE_RANGE: Self = Self(0xFFFFu128 << 112);

    /// Builds a mask from a list of capabilities.
    #[must_use]
    pub const fn of(caps: &[Capability]) -> Self {
        let mut bits = 0u128;
        let mut i = 0;
        while i < caps.len() {
            bits |= 1u128 << (caps[i] as u32);
            i += 1;
        }
        Self(bits)
    }

    /// True if the set contains `cap`.
    #[must_use]
    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & (1u128 << (cap as u32)) != 0
    }

    /// True if every bit of `other` is present in `self`.
    #[must_use]
    pub const fn contains_all(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set union.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set intersection.
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Bits in `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Adds a capability, returning the new mask.
    #[must_use]
    pub const fn with(self, cap: Capability) -> Self {
        Self(self.0 | (1u128 << (cap as u32)))
    }

    /// True if no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of set bits.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }
}

impl fmt::Debug for CapabilityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityMask({:#034x})", self.0)
    }
}

/// Coarse performance classification of a platform.
///
/// Tiers order from weakest to strongest; comparison is meaningful
/// (`tier >= PlatformTier::Standard`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum PlatformTier {
    /// 16 MB-class single-core targets.
    Minimal = 0,
    /// Constrained targets with some hardware assists.
    Limited = 1,
    /// Typical desktop or mobile baseline.
    #[default]
    Standard = 2,
    /// Multi-core with ample memory.
    High = 3,
    /// No practical constraints.
    Maximum = 4,
}

impl PlatformTier {
    /// Returns the tier name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Limited => "limited",
            Self::Standard => "standard",
            Self::High => "high",
            Self::Maximum => "maximum",
        }
    }
}

impl fmt::Display for PlatformTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Answers capability queries for a platform or driver.
pub trait CapabilityProvider: Send + Sync {
    /// True if the provider advertises `cap`.
    fn supports(&self, cap: Capability) -> bool {
        self.mask().contains(cap)
    }

    /// The full advertised capability set.
    fn mask(&self) -> CapabilityMask;

    /// The provider's platform tier.
    fn tier(&self) -> PlatformTier;

    /// True if a software emulation path exists for `cap`.
    fn has_fallback(&self, cap: Capability) -> bool;
}
