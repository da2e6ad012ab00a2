//! Platform probing and the immutable platform descriptor.
//!
//! [`PlatformInfo`] is built once — by [`PlatformProbe::detect`] on the
//! host, or from one of the named presets used by embedders targeting a
//! known device class — and never mutated afterwards. Everything downstream
//! (driver arbitration, threading-model selection, clock gating, allocator
//! routing) reads from it.
//!
//! The probe classifies the platform into a [`PlatformTier`] from core
//! count and physical memory unless the embedder overrides the tier
//! explicitly.

use crate::error::{Error, ErrorKind, Result};
use crate::memory::allocator::AllocatorKind;
use crate::thread::primitives::PrimitiveKind;
use crate::time::clock::ClockType;
use crate::types::capability::{Capability, CapabilityMask, CapabilityProvider, PlatformTier};
use serde::{Deserialize, Serialize};

/// Byte order of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

/// Immutable description of the platform the core is running on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Human-readable platform name, e.g. `"linux"`.
    pub platform_name: String,
    /// Target architecture, e.g. `"x86_64"`.
    pub arch: String,
    /// Number of logical CPU cores.
    pub cpu_cores: usize,
    /// Total physical memory in bytes.
    pub total_memory: u64,
    /// Page size in bytes.
    pub page_size: u32,
    /// Byte order.
    pub endian: Endianness,
    /// Performance tier.
    pub tier: PlatformTier,
    /// Capabilities the platform provides natively.
    pub capabilities: CapabilityMask,
    /// Capabilities for which a software fallback is registered.
    pub fallbacks: CapabilityMask,
    /// Clock sources the platform supports.
    pub clocks: Vec<ClockType>,
    /// Synchronization primitives the platform supports.
    pub sync_primitives: Vec<PrimitiveKind>,
    /// Allocator strategies the platform supports.
    pub allocators: Vec<AllocatorKind>,
}

impl PlatformInfo {
    /// True if the platform supports the given clock source.
    #[must_use]
    pub fn supports_clock(&self, clock: ClockType) -> bool {
        self.clocks.contains(&clock)
    }

    /// True if the platform supports the given primitive.
    #[must_use]
    pub fn supports_primitive(&self, kind: PrimitiveKind) -> bool {
        self.sync_primitives.contains(&kind)
    }

    /// True if the platform supports the given allocator strategy.
    #[must_use]
    pub fn supports_allocator(&self, kind: AllocatorKind) -> bool {
        self.allocators.contains(&kind)
    }
}

impl CapabilityProvider for PlatformInfo {
    fn mask(&self) -> CapabilityMask {
        self.capabilities
    }

    fn tier(&self) -> PlatformTier {
        self.tier
    }

    fn has_fallback(&self, cap: Capability) -> bool {
        self.fallbacks.contains(cap)
    }
}

/// Classifies a platform tier from core count and physical memory.
#[must_use]
pub fn classify_tier(cpu_cores: usize, total_memory: u64) -> PlatformTier {
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;
    if total_memory < 64 * MIB {
        PlatformTier::Minimal
    } else if total_memory < 256 * MIB || cpu_cores == 1 {
        PlatformTier::Limited
    } else if total_memory < 4 * GIB || cpu_cores <= 4 {
        PlatformTier::Standard
    } else if total_memory < 32 * GIB || cpu_cores <= 16 {
        PlatformTier::High
    } else {
        PlatformTier::Maximum
    }
}

/// Builder that assembles a [`PlatformInfo`], either by probing the host or
/// from a named preset.
#[derive(Debug, Clone)]
pub struct PlatformProbe {
    name: String,
    arch: String,
    cpu_cores: usize,
    total_memory: u64,
    page_size: u32,
    endian: Endianness,
    tier: Option<PlatformTier>,
    capabilities: CapabilityMask,
    fallbacks: CapabilityMask,
    clocks: Vec<ClockType>,
    sync_primitives: Vec<PrimitiveKind>,
    allocators: Vec<AllocatorKind>,
}

impl PlatformProbe {
    const HOST_ENDIAN: Endianness = if cfg!(target_endian = "big") {
        Endianness::Big
    } else {
        Endianness::Little
    };

    /// Probes the host platform.
    ///
    /// Core count comes from the standard library; physical memory is read
    /// from the OS where a std-only path exists and otherwise assumed to be
    /// 4 GiB (a conservative Standard-tier figure).
    #[must_use]
    pub fn detect() -> Self {
        let cpu_cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        let total_memory = host_total_memory().unwrap_or(4 * 1024 * 1024 * 1024);
        let mut caps = CapabilityMask::of(&[
            Capability::Atomics,
            Capability::HighResTimer,
            Capability::RealtimeClock,
            Capability::VirtualMemory,
            Capability::SharedMemory,
            Capability::BuddyAllocation,
            Capability::Defragmentation,
        ]);
        if cpu_cores > 1 {
            caps = caps.with(Capability::Threading);
        }
        Self {
            name: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            cpu_cores,
            total_memory,
            page_size: 4096,
            endian: Self::HOST_ENDIAN,
            tier: None,
            capabilities: caps,
            fallbacks: CapabilityMask::EMPTY,
            clocks: vec![
                ClockType::Monotonic,
                ClockType::Realtime,
                ClockType::HighResolution,
                ClockType::GameTimer,
                ClockType::ProfileTimer,
            ],
            sync_primitives: PrimitiveKind::ALL.to_vec(),
            allocators: AllocatorKind::ALL.to_vec(),
        }
    }

    /// Preset for a 16 MB-class single-core console target.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            name: "minimal".to_owned(),
            arch: "sh4".to_owned(),
            cpu_cores: 1,
            total_memory: 16 * 1024 * 1024,
            page_size: 4096,
            endian: Endianness::Little,
            tier: Some(PlatformTier::Minimal),
            capabilities: CapabilityMask::of(&[
                Capability::Atomics,
                Capability::StoreQueues,
                Capability::DmaTransfer,
                Capability::VideoMemory,
                Capability::AudioMemory,
                Capability::BasicPcm,
                Capability::Framebuffer,
            ]),
            fallbacks: CapabilityMask::EMPTY,
            clocks: vec![ClockType::Monotonic, ClockType::GameTimer],
            sync_primitives: vec![PrimitiveKind::RecursiveMutex, PrimitiveKind::Event],
            allocators: vec![
                AllocatorKind::Linear,
                AllocatorKind::Stack,
                AllocatorKind::Pool,
                AllocatorKind::System,
            ],
        }
    }

    /// Preset for a constrained target with cooperative scheduling.
    #[must_use]
    pub fn limited() -> Self {
        let mut probe = Self::minimal();
        probe.name = "limited".to_owned();
        probe.arch = "mips".to_owned();
        probe.total_memory = 64 * 1024 * 1024;
        probe.tier = Some(PlatformTier::Limited);
        probe.capabilities = probe
            .capabilities
            .with(Capability::HighResTimer)
            .with(Capability::BuddyAllocation);
        probe.clocks.push(ClockType::HighResolution);
        probe.sync_primitives = vec![
            PrimitiveKind::Mutex,
            PrimitiveKind::RecursiveMutex,
            PrimitiveKind::Semaphore,
            PrimitiveKind::Event,
        ];
        probe.allocators.push(AllocatorKind::Buddy);
        probe
    }

    /// Preset for a desktop-class target with every strategy available.
    #[must_use]
    pub fn maximum() -> Self {
        let mut probe = Self::detect();
        probe.name = "maximum".to_owned();
        probe.cpu_cores = probe.cpu_cores.max(8);
        probe.total_memory = probe.total_memory.max(32 * 1024 * 1024 * 1024);
        probe.tier = Some(PlatformTier::Maximum);
        probe.capabilities = probe
            .capabilities
            .with(Capability::Threading)
            .with(Capability::ProcessClock)
            .with(Capability::ThreadClock)
            .with(Capability::ExecutableMemory)
            .with(Capability::MemoryProtection);
        probe.clocks.push(ClockType::Process);
        probe.clocks.push(ClockType::Thread);
        probe
    }

    /// Overrides the platform name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the core count.
    #[must_use]
    pub fn with_cpu_cores(mut self, cores: usize) -> Self {
        self.cpu_cores = cores;
        self
    }

    /// Overrides total physical memory.
    #[must_use]
    pub fn with_total_memory(mut self, bytes: u64) -> Self {
        self.total_memory = bytes;
        self
    }

    /// Overrides the tier instead of classifying from cores and memory.
    #[must_use]
    pub const fn with_tier(mut self, tier: PlatformTier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Adds a capability to the advertised set.
    #[must_use]
    pub const fn with_capability(mut self, cap: Capability) -> Self {
        self.capabilities = self.capabilities.with(cap);
        self
    }

    /// Registers a software fallback for a capability.
    ///
    /// The capability is also added to the advertised set: a fallback makes
    /// the feature available even without the hardware.
    #[must_use]
    pub const fn with_fallback(mut self, cap: Capability) -> Self {
        self.fallbacks = self.fallbacks.with(cap);
        self.capabilities = self.capabilities.with(cap);
        self
    }

    /// Finishes the probe, classifying the tier if not overridden.
    pub fn finish(self) -> Result<PlatformInfo> {
        if self.cpu_cores == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "cpu core count must be nonzero",
            ));
        }
        if !self.page_size.is_power_of_two() {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "page size must be a power of two",
            ));
        }
        let tier = self
            .tier
            .unwrap_or_else(|| classify_tier(self.cpu_cores, self.total_memory));
        tracing::debug!(
            platform = %self.name,
            cores = self.cpu_cores,
            memory = self.total_memory,
            %tier,
            "platform probe complete"
        );
        Ok(PlatformInfo {
            platform_name: self.name,
            arch: self.arch,
            cpu_cores: self.cpu_cores,
            total_memory: self.total_memory,
            page_size: self.page_size,
            endian: self.endian,
            tier,
            capabilities: self.capabilities,
            fallbacks: self.fallbacks,
            clocks: self.clocks,
            sync_primitives: self.sync_primitives,
            allocators: self.allocators,
        })
    }
}

#[cfg(target_os = "linux")]
fn host_total_memory() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

#[cfg(not(target_os = "linux"))]
fn host_total_memory() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_produces_sane_host_info() {
        let info = PlatformProbe::detect().finish().expect("probe");
        assert!(info.cpu_cores >= 1);
        assert!(info.total_memory > 0);
        assert!(info.page_size.is_power_of_two());
        assert!(info.supports_clock(ClockType::Monotonic));
    }

    #[test]
    fn minimal_preset_is_minimal_tier() {
        let info = PlatformProbe::minimal().finish().expect("probe");
        assert_eq!(info.tier, PlatformTier::Minimal);
        assert_eq!(info.cpu_cores, 1);
        assert!(info.supports(Capability::BasicPcm));
        assert!(!info.supports(Capability::HardwareDsp));
        assert!(!info.supports(Capability::Threading));
    }

    #[test]
    fn tier_classification_boundaries() {
        const MIB: u64 = 1024 * 1024;
        const GIB: u64 = 1024 * MIB;
        assert_eq!(classify_tier(1, 16 * MIB), PlatformTier::Minimal);
        assert_eq!(classify_tier(1, 64 * MIB), PlatformTier::Limited);
        assert_eq!(classify_tier(2, 128 * MIB), PlatformTier::Limited);
        assert_eq!(classify_tier(4, GIB), PlatformTier::Standard);
        assert_eq!(classify_tier(8, 16 * GIB), PlatformTier::High);
        assert_eq!(classify_tier(32, 64 * GIB), PlatformTier::Maximum);
    }

    #[test]
    fn fallback_advertises_the_capability() {
        let info = PlatformProbe::minimal()
            .with_fallback(Capability::HardwareDsp)
            .finish()
            .expect("probe");
        assert!(info.supports(Capability::HardwareDsp));
        assert!(info.has_fallback(Capability::HardwareDsp));
        assert!(!info.has_fallback(Capability::BasicPcm));
    }

    #[test]
    fn zero_cores_rejected() {
        let err = PlatformProbe::minimal()
            .with_cpu_cores(0)
            .finish()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    }

    #[test]
    fn tier_override_wins_over_classification() {
        let info = PlatformProbe::detect()
            .with_cpu_cores(32)
            .with_total_memory(64 * 1024 * 1024 * 1024)
            .with_tier(PlatformTier::Limited)
            .finish()
            .expect("probe");
        assert_eq!(info.tier, PlatformTier::Limited);
    }

    #[test]
    fn platform_info_serde_roundtrip() {
        let info = PlatformProbe::minimal().finish().expect("probe");
        let json = serde_json::to_string(&info).expect("serialize");
        let back: PlatformInfo = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(info, back);
    }
}
