//! Memory broker: uniform allocation across typed regions and strategies.
//!
//! The broker owns a set of regions, each driven by one allocator from the
//! closed strategy set, and routes requests by [`MemoryType`]. Callers get
//! back an [`Allocation`] carrying a numeric address and a
//! generation-counted handle; all byte access goes through the broker with
//! the handle, so use-after-free is caught as `InvalidHandle` rather than
//! corrupting a reused range.
//!
//! # Allocation algorithm
//!
//! 1. Size is normalized up to the alignment; the alignment must be in the
//!    discrete supported set.
//! 2. A preferred strategy, when given and capable, is attempted first.
//! 3. Otherwise the request routes by type: video and audio to their
//!    regions, temporary to the linear arena, pooled to the pool, the rest
//!    to the system allocator.
//! 4. On failure with fallback allowed, the system allocator and then the
//!    remaining regions are tried.
//! 5. If everything failed, a `MemoryPressure` event is published, the
//!    pressure monitor re-evaluates (firing callbacks that may release
//!    memory), and the chain is retried once.
//! 6. Final failure is `OutOfMemory`.
//!
//! The configured emergency reserve is withheld from every allocation not
//! flagged `CRITICAL`.

pub mod allocator;
pub mod buddy;
pub mod freelist;
pub mod linear;
pub mod pool;
pub mod pressure;
pub mod region;
pub mod stack;
pub mod stats;
pub mod system;

pub use allocator::{
    Allocation, AllocationHandle, AllocationRequest, AllocatorId, AllocatorKind, AllocatorStats,
    MemoryFlags, MemoryType, RegionAllocator, SUPPORTED_ALIGNMENTS,
};
pub use pressure::{CallbackId, PressureInfo, PressureLevel, PressureMonitor, PressureThresholds};
pub use region::{MemoryRegion, RegionSpec};
pub use stats::{MemoryStats, StatCounters};

use crate::error::{Error, ErrorKind, Result};
use crate::event::{Event, EventCategory, EventPayload, EventSeverity, EventSink};
use crate::memory::allocator::{align_up, check_alignment, AllocationTag};
use crate::types::capability::Capability;
use crate::types::handle::HandleTable;
use crate::types::platform::PlatformInfo;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Placement flags that must be backed by region capabilities.
const PLACEMENT: MemoryFlags = MemoryFlags(
    MemoryFlags::EXECUTABLE.0 | MemoryFlags::DMA_CAPABLE.0 | MemoryFlags::SHARED.0,
);

#[derive(Debug, Clone, Copy)]
struct AllocRecord {
    allocator: AllocatorId,
    offset: usize,
    size: usize,
    align: usize,
    flags: MemoryFlags,
    memory_type: MemoryType,
}

struct Engine {
    region: MemoryRegion,
    kind: AllocatorKind,
    bounded: bool,
    allocator: Mutex<Box<dyn RegionAllocator>>,
    backing: Mutex<Vec<u8>>,
}

/// The memory façade.
pub struct MemoryBroker {
    engines: Vec<Engine>,
    allocations: Mutex<HandleTable<AllocationTag, AllocRecord>>,
    counters: StatCounters,
    used_bounded: AtomicU64,
    pressure_total: u64,
    emergency_reserve: usize,
    monitor: PressureMonitor,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    executable_ok: bool,
    epoch: Instant,
}

impl MemoryBroker {
    /// Builds a broker over explicit region specs.
    pub fn with_regions(
        platform: &PlatformInfo,
        specs: Vec<RegionSpec>,
        thresholds: PressureThresholds,
        emergency_reserve: usize,
    ) -> Result<Self> {
        thresholds.validate()?;
        if specs.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "at least one region is required",
            ));
        }
        let mut engines = Vec::with_capacity(specs.len());
        let mut pressure_total = 0u64;
        for (i, spec) in specs.into_iter().enumerate() {
            let index = u16::try_from(i)
                .map_err(|_| Error::new(ErrorKind::InvalidParameters, "too many regions"))?;
            if spec.allocator != AllocatorKind::System && spec.size > region::REGION_STRIDE {
                return Err(Error::new(
                    ErrorKind::InvalidParameters,
                    "region exceeds the address stride",
                ));
            }
            let boxed: Box<dyn RegionAllocator> = match spec.allocator {
                AllocatorKind::Linear => Box::new(linear::LinearAllocator::new(spec.size)),
                AllocatorKind::Stack => Box::new(stack::StackAllocator::new(spec.size)),
                AllocatorKind::Pool => {
                    let block = spec.pool_block.unwrap_or(256);
                    Box::new(pool::PoolAllocator::new(block, spec.size / block.max(1))?)
                }
                AllocatorKind::Buddy => {
                    let min_block = spec.buddy_min_block.unwrap_or(64);
                    Box::new(buddy::BuddyAllocator::new(spec.size, min_block)?)
                }
                AllocatorKind::FreeList => Box::new(freelist::FreeListAllocator::new(spec.size)),
                AllocatorKind::System => Box::new(system::SystemAllocator::new(spec.budget)),
            };
            let bounded = spec.allocator != AllocatorKind::System || spec.budget.is_some();
            if bounded {
                pressure_total += boxed.total() as u64;
            }
            let backing = if spec.allocator == AllocatorKind::System {
                Vec::new()
            } else {
                vec![0u8; spec.size]
            };
            engines.push(Engine {
                region: MemoryRegion {
                    index,
                    name: spec.name,
                    base: MemoryRegion::base_for(index),
                    size: boxed.total(),
                    memory_type: spec.memory_type,
                    capabilities: spec.capabilities,
                    managed: true,
                },
                kind: spec.allocator,
                bounded,
                allocator: Mutex::new(boxed),
                backing: Mutex::new(backing),
            });
        }
        Ok(Self {
            engines,
            allocations: Mutex::new(HandleTable::new()),
            counters: StatCounters::new(),
            used_bounded: AtomicU64::new(0),
            pressure_total,
            emergency_reserve,
            monitor: PressureMonitor::new(thresholds),
            sink: RwLock::new(None),
            executable_ok: platform.capabilities.contains(Capability::ExecutableMemory),
            epoch: Instant::now(),
        })
    }

    /// Builds the default region layout for a platform.
    pub fn standard(platform: &PlatformInfo) -> Result<Self> {
        Self::standard_with(platform, PressureThresholds::default(), 0)
    }

    /// Builds the default region layout with explicit pressure settings.
    pub fn standard_with(
        platform: &PlatformInfo,
        thresholds: PressureThresholds,
        emergency_reserve: usize,
    ) -> Result<Self> {
        const MIB: usize = 1024 * 1024;
        let mut specs = vec![
            RegionSpec::new("general", 4 * MIB, AllocatorKind::FreeList),
            RegionSpec::new("scratch", MIB, AllocatorKind::Linear)
                .with_type(MemoryType::Temporary),
            RegionSpec::new("pools", 256 * 1024, AllocatorKind::Pool)
                .with_type(MemoryType::Pooled)
                .with_pool_block(256),
            RegionSpec::new("system", 0, AllocatorKind::System),
        ];
        if platform.capabilities.contains(Capability::VideoMemory) {
            specs.push(
                RegionSpec::new("video_memory", 8 * MIB, AllocatorKind::FreeList)
                    .with_type(MemoryType::Video),
            );
        }
        if platform.capabilities.contains(Capability::AudioMemory) {
            specs.push(
                RegionSpec::new("audio_ram", 2 * MIB, AllocatorKind::FreeList)
                    .with_type(MemoryType::Audio)
                    .with_capabilities(MemoryFlags::DMA_CAPABLE),
            );
        }
        if platform.capabilities.contains(Capability::ExecutableMemory) {
            specs.push(
                RegionSpec::new("exec", MIB, AllocatorKind::FreeList)
                    .with_capabilities(MemoryFlags::EXECUTABLE),
            );
        }
        Self::with_regions(platform, specs, thresholds, emergency_reserve)
    }

    /// Wires the event sink used for pressure and fatal events.
    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.write() = Some(sink);
    }

    fn now_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn engine(&self, id: AllocatorId) -> Result<&Engine> {
        self.engines
            .get(id.0 as usize)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such allocator"))
    }

    fn placement_ok(&self, engine: &Engine, flags: MemoryFlags) -> bool {
        let wanted = MemoryFlags(flags.0 & PLACEMENT.0);
        if wanted.contains(MemoryFlags::EXECUTABLE) && !self.executable_ok {
            return false;
        }
        engine.region.capabilities.contains(wanted)
    }

    fn reserve_allows(&self, engine: &Engine, size: usize, flags: MemoryFlags) -> bool {
        if !engine.bounded || flags.contains(MemoryFlags::CRITICAL) || self.pressure_total == 0 {
            return true;
        }
        let used_after = self.used_bounded.load(Ordering::Relaxed) + size as u64;
        used_after <= self.pressure_total.saturating_sub(self.emergency_reserve as u64)
    }

    fn candidate_order(&self, req: &AllocationRequest) -> Vec<usize> {
        let mut order = Vec::new();
        let mut push = |i: usize, order: &mut Vec<usize>| {
            if !order.contains(&i) {
                order.push(i);
            }
        };
        if let Some(kind) = req.preferred {
            for (i, e) in self.engines.iter().enumerate() {
                if e.kind == kind {
                    push(i, &mut order);
                }
            }
        }
        let routed_type = match req.memory_type {
            MemoryType::Video => Some(MemoryType::Video),
            MemoryType::Audio => Some(MemoryType::Audio),
            MemoryType::Temporary => Some(MemoryType::Temporary),
            MemoryType::Pooled => Some(MemoryType::Pooled),
            MemoryType::General | MemoryType::Shared => None,
        };
        match routed_type {
            Some(t) => {
                for (i, e) in self.engines.iter().enumerate() {
                    if e.region.memory_type == t {
                        push(i, &mut order);
                    }
                }
            }
            None => {
                for (i, e) in self.engines.iter().enumerate() {
                    if e.kind == AllocatorKind::System {
                        push(i, &mut order);
                    }
                }
            }
        }
        if req.allow_fallback {
            for (i, e) in self.engines.iter().enumerate() {
                if e.kind == AllocatorKind::System {
                    push(i, &mut order);
                }
            }
            for i in 0..self.engines.len() {
                push(i, &mut order);
            }
        }
        order
    }

    fn try_engine(
        &self,
        index: usize,
        size: usize,
        align: usize,
        flags: MemoryFlags,
    ) -> Result<(AllocatorId, usize)> {
        let engine = &self.engines[index];
        if !self.placement_ok(engine, flags) {
            return Err(Error::new(
                ErrorKind::FeatureNotSupported,
                "region lacks the requested placement capability",
            ));
        }
        if !self.reserve_allows(engine, size, flags) {
            return Err(Error::new(
                ErrorKind::OutOfMemory,
                "emergency reserve withheld",
            ));
        }
        let mut alloc = engine.allocator.lock();
        if !alloc.supports(size, align) {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "request shape unsupported here",
            ));
        }
        let offset = alloc.allocate(size, align)?;
        let committed = alloc.total();
        drop(alloc);

        let mut backing = engine.backing.lock();
        if backing.len() < committed {
            backing.resize(committed, 0);
        }
        if flags.contains(MemoryFlags::ZERO) {
            backing[offset..offset + size].fill(0);
        }
        drop(backing);

        if engine.bounded {
            self.used_bounded.fetch_add(size as u64, Ordering::Relaxed);
        }
        let id = AllocatorId(u16::try_from(index).unwrap_or(u16::MAX));
        Ok((id, offset))
    }

    /// Allocates memory per the routing algorithm.
    pub fn allocate(&self, req: &AllocationRequest) -> Result<Allocation> {
        if req.size == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "allocation size must be nonzero",
            ));
        }
        check_alignment(req.align)?;
        let size = align_up(req.size, req.align);
        let order = self.candidate_order(req);
        if order.is_empty() {
            return Err(Error::new(ErrorKind::OutOfMemory, "no candidate regions"));
        }

        for attempt in 0..2 {
            let mut placement_only = true;
            for &index in &order {
                match self.try_engine(index, size, req.align, req.flags) {
                    Ok((id, offset)) => {
                        let record = AllocRecord {
                            allocator: id,
                            offset,
                            size,
                            align: req.align,
                            flags: req.flags,
                            memory_type: self.engines[index].region.memory_type,
                        };
                        let handle = self.allocations.lock().insert(record);
                        self.counters.record_alloc(size);
                        self.update_pressure();
                        return Ok(Allocation {
                            handle,
                            addr: self.engines[index].region.base + offset,
                            size,
                            align: req.align,
                            flags: req.flags,
                            memory_type: record.memory_type,
                            allocator: id,
                        });
                    }
                    Err(e) if e.kind() == ErrorKind::FeatureNotSupported => {}
                    Err(_) => placement_only = false,
                }
            }
            if placement_only {
                // Every candidate refused on placement, not capacity.
                return Err(Error::new(
                    ErrorKind::FeatureNotSupported,
                    "no region provides the requested placement",
                )
                .with_operation("allocate"));
            }
            if attempt == 0 {
                let info = self.update_pressure();
                self.publish_pressure(&info);
                // Pressure callbacks may have released memory; coalescing
                // the freed spans gives the retry a real chance.
                let _ = self.defragment();
            }
        }
        Err(Error::new(ErrorKind::OutOfMemory, "all allocation routes exhausted")
            .with_operation("allocate"))
    }

    /// Frees an allocation. The handle is invalid afterwards.
    pub fn deallocate(&self, handle: AllocationHandle) -> Result<()> {
        let record = {
            let mut table = self.allocations.lock();
            let record = *table.get(handle)?;
            if self.engine(record.allocator)?.kind == AllocatorKind::Linear {
                return Err(Error::new(
                    ErrorKind::FeatureNotSupported,
                    "linear allocations are freed by arena reset",
                )
                .with_operation("deallocate"));
            }
            table.remove(handle)?;
            record
        };
        let engine = self.engine(record.allocator)?;
        engine
            .allocator
            .lock()
            .free(record.offset, record.size)
            .map_err(|e| {
                tracing::error!(?handle, "allocator rejected a tracked free");
                Error::new(ErrorKind::InternalError, "allocator free failed").with_cause(e)
            })?;
        if engine.bounded {
            self.used_bounded
                .fetch_sub(record.size as u64, Ordering::Relaxed);
        }
        self.counters.record_free(record.size);
        self.update_pressure();
        Ok(())
    }

    /// Resets a linear arena, invalidating every allocation it held.
    pub fn reset_arena(&self, id: AllocatorId) -> Result<()> {
        let engine = self.engine(id)?;
        if engine.kind != AllocatorKind::Linear {
            return Err(Error::new(
                ErrorKind::FeatureNotSupported,
                "only linear arenas support reset",
            ));
        }
        let mut table = self.allocations.lock();
        let doomed: Vec<(AllocationHandle, usize)> = table
            .iter()
            .filter(|(_, r)| r.allocator == id)
            .map(|(h, r)| (h, r.size))
            .collect();
        let mut released = 0usize;
        for &(handle, size) in &doomed {
            table.remove(handle)?;
            released += size;
        }
        drop(table);
        engine.allocator.lock().reset()?;
        if engine.bounded {
            self.used_bounded
                .fetch_sub(released as u64, Ordering::Relaxed);
        }
        self.counters.record_reset(released, doomed.len());
        self.update_pressure();
        Ok(())
    }

    /// Resolves a handle back to its allocation descriptor.
    pub fn resolve(&self, handle: AllocationHandle) -> Result<Allocation> {
        let table = self.allocations.lock();
        let record = *table.get(handle)?;
        let engine = self.engine(record.allocator)?;
        Ok(Allocation {
            handle,
            addr: engine.region.base + record.offset,
            size: record.size,
            align: record.align,
            flags: record.flags,
            memory_type: record.memory_type,
            allocator: record.allocator,
        })
    }

    /// Copies bytes out of an allocation.
    pub fn read_bytes(&self, handle: AllocationHandle, offset: usize, buf: &mut [u8]) -> Result<()> {
        let record = *self.allocations.lock().get(handle)?;
        if offset + buf.len() > record.size {
            return Err(Error::new(ErrorKind::InvalidParameters, "read out of bounds"));
        }
        let engine = self.engine(record.allocator)?;
        let backing = engine.backing.lock();
        let start = record.offset + offset;
        buf.copy_from_slice(&backing[start..start + buf.len()]);
        Ok(())
    }

    /// Copies bytes into an allocation.
    pub fn write_bytes(&self, handle: AllocationHandle, offset: usize, data: &[u8]) -> Result<()> {
        let record = *self.allocations.lock().get(handle)?;
        if offset + data.len() > record.size {
            return Err(Error::new(ErrorKind::InvalidParameters, "write out of bounds"));
        }
        let engine = self.engine(record.allocator)?;
        let mut backing = engine.backing.lock();
        let start = record.offset + offset;
        backing[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Reads one byte of an allocation.
    pub fn read_byte(&self, handle: AllocationHandle, offset: usize) -> Result<u8> {
        let mut byte = [0u8];
        self.read_bytes(handle, offset, &mut byte)?;
        Ok(byte[0])
    }

    /// Runs cooperative defragmentation on every allocator that supports
    /// it; returns the total number of free spans merged.
    pub fn defragment(&self) -> Result<usize> {
        let mut merges = 0;
        for engine in &self.engines {
            let mut alloc = engine.allocator.lock();
            if alloc.supports_defrag() {
                merges += alloc.defragment()?;
            }
        }
        Ok(merges)
    }

    /// Region descriptors, with current commitment for system regions.
    #[must_use]
    pub fn regions(&self) -> Vec<MemoryRegion> {
        self.engines
            .iter()
            .map(|e| {
                let mut region = e.region.clone();
                region.size = e.allocator.lock().total();
                region
            })
            .collect()
    }

    /// Stats for a single allocator.
    pub fn allocator_stats(&self, id: AllocatorId) -> Result<AllocatorStats> {
        Ok(self.engine(id)?.allocator.lock().stats())
    }

    /// Broker-wide statistics. Counters are eventually consistent.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        let mut largest = 0u64;
        let mut worst_frag = 0.0f32;
        for engine in &self.engines {
            let s = engine.allocator.lock().stats();
            if s.kind != AllocatorKind::System {
                largest = largest.max(s.largest_free_block as u64);
            }
            worst_frag = worst_frag.max(s.fragmentation_pct);
        }
        let used = self.counters.used();
        let peak = self.counters.peak();
        #[allow(clippy::cast_precision_loss)]
        let efficiency = if peak == 0 { 1.0 } else { used as f32 / peak as f32 };
        MemoryStats {
            total: self.pressure_total,
            used,
            free: self.pressure_total.saturating_sub(self.used_bounded.load(Ordering::Relaxed)),
            peak,
            allocation_count: self.counters.allocation_count(),
            fragmentation_pct: worst_frag,
            largest_free_block: largest,
            efficiency,
        }
    }

    fn update_pressure(&self) -> PressureInfo {
        let used = self.used_bounded.load(Ordering::Relaxed);
        let available = self.pressure_total.saturating_sub(used);
        self.monitor.update(
            usize::try_from(available).unwrap_or(usize::MAX),
            usize::try_from(self.pressure_total).unwrap_or(usize::MAX),
            self.emergency_reserve,
            self.now_ns(),
        )
    }

    /// Re-evaluates pressure now, firing callbacks on a transition.
    pub fn check_pressure(&self) -> PressureInfo {
        self.update_pressure()
    }

    /// Current pressure level without re-evaluating.
    #[must_use]
    pub fn pressure_level(&self) -> PressureLevel {
        self.monitor.level()
    }

    /// Registers a rising-edge pressure callback.
    pub fn on_pressure(
        &self,
        min_level: PressureLevel,
        callback: impl FnMut(&PressureInfo) + Send + 'static,
    ) -> CallbackId {
        self.monitor.register(min_level, callback)
    }

    /// Registers a pressure callback that also hears falling edges.
    pub fn on_pressure_with_release(
        &self,
        min_level: PressureLevel,
        callback: impl FnMut(&PressureInfo) + Send + 'static,
    ) -> CallbackId {
        self.monitor.register_with_release(min_level, callback)
    }

    /// Removes a pressure callback.
    pub fn remove_pressure_callback(&self, id: CallbackId) -> Result<()> {
        self.monitor.unregister(id)
    }

    fn publish_pressure(&self, info: &PressureInfo) {
        let severity = match info.level {
            PressureLevel::Critical => EventSeverity::Critical,
            PressureLevel::High => EventSeverity::Error,
            PressureLevel::Medium => EventSeverity::Warning,
            PressureLevel::None | PressureLevel::Low => EventSeverity::Info,
        };
        if let Some(sink) = self.sink.read().as_ref() {
            sink.publish(Event::new(
                EventCategory::Resource,
                severity,
                "memory",
                EventPayload::MemoryPressure {
                    level: info.level,
                    available_bytes: info.available_bytes as u64,
                    pressure_ratio: info.pressure_ratio,
                },
            ));
        }
    }
}

impl core::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("regions", &self.engines.len())
            .field("used", &self.counters.used())
            .field("level", &self.monitor.level())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::platform::PlatformProbe;
    use std::sync::atomic::AtomicUsize;

    fn broker_with(specs: Vec<RegionSpec>, reserve: usize) -> MemoryBroker {
        let platform = PlatformProbe::detect().finish().expect("probe");
        MemoryBroker::with_regions(&platform, specs, PressureThresholds::default(), reserve)
            .expect("broker")
    }

    fn single_region_broker(total: usize) -> MemoryBroker {
        broker_with(
            vec![RegionSpec::new("general", total, AllocatorKind::FreeList)],
            0,
        )
    }

    #[test]
    fn allocate_respects_alignment() {
        let broker = single_region_broker(64 * 1024);
        for align in SUPPORTED_ALIGNMENTS {
            let alloc = broker
                .allocate(&AllocationRequest::new(24).with_align(align).no_fallback())
                .expect("alloc");
            assert_eq!(alloc.addr % align, 0, "align {align}");
            broker.deallocate(alloc.handle).expect("free");
        }
    }

    #[test]
    fn unsupported_alignment_is_rejected() {
        let broker = single_region_broker(4096);
        let err = broker
            .allocate(&AllocationRequest::new(8).with_align(64))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlignment);
    }

    #[test]
    fn zero_flag_zero_initializes_reused_range() {
        let broker = single_region_broker(4096);
        let a = broker
            .allocate(&AllocationRequest::new(64))
            .expect("alloc");
        broker.write_bytes(a.handle, 0, &[0xAB; 64]).expect("write");
        broker.deallocate(a.handle).expect("free");

        let b = broker
            .allocate(&AllocationRequest::new(64).with_flags(MemoryFlags::ZERO))
            .expect("alloc");
        assert_eq!(broker.read_byte(b.handle, 0).expect("read"), 0);
    }

    #[test]
    fn stale_handle_is_rejected_after_free() {
        let broker = single_region_broker(4096);
        let a = broker.allocate(&AllocationRequest::new(32)).expect("alloc");
        broker.deallocate(a.handle).expect("free");
        assert_eq!(
            broker.resolve(a.handle).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
        assert_eq!(
            broker.deallocate(a.handle).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
    }

    #[test]
    fn temporary_routes_to_linear_and_resets() {
        let broker = broker_with(
            vec![
                RegionSpec::new("general", 4096, AllocatorKind::FreeList),
                RegionSpec::new("scratch", 1024, AllocatorKind::Linear)
                    .with_type(MemoryType::Temporary),
            ],
            0,
        );
        let a = broker
            .allocate(
                &AllocationRequest::new(100)
                    .with_type(MemoryType::Temporary)
                    .no_fallback(),
            )
            .expect("alloc");
        let arena = a.allocator;
        assert_eq!(
            broker.deallocate(a.handle).unwrap_err().kind(),
            ErrorKind::FeatureNotSupported
        );
        broker.reset_arena(arena).expect("reset");
        assert_eq!(
            broker.resolve(a.handle).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
        assert_eq!(broker.stats().used, 0);
    }

    #[test]
    fn fallback_reroutes_to_system() {
        let broker = broker_with(
            vec![
                RegionSpec::new("tiny", 256, AllocatorKind::FreeList),
                RegionSpec::new("system", 0, AllocatorKind::System),
            ],
            0,
        );
        // Too big for the region, lands in system via fallback.
        let alloc = broker
            .allocate(&AllocationRequest::new(1024))
            .expect("alloc");
        assert_eq!(
            broker
                .allocator_stats(alloc.allocator)
                .expect("stats")
                .kind,
            AllocatorKind::System
        );
    }

    #[test]
    fn undersized_region_without_escape_is_out_of_memory() {
        let broker = broker_with(
            vec![RegionSpec::new("tiny", 256, AllocatorKind::FreeList)],
            0,
        );
        let err = broker.allocate(&AllocationRequest::new(1024)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    }

    #[test]
    fn executable_without_region_is_feature_not_supported() {
        let broker = single_region_broker(4096);
        let err = broker
            .allocate(&AllocationRequest::new(64).with_flags(MemoryFlags::EXECUTABLE))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeatureNotSupported);
    }

    #[test]
    fn emergency_reserve_withheld_from_normal_allocations() {
        let broker = broker_with(
            vec![RegionSpec::new("general", 1024, AllocatorKind::FreeList)],
            256,
        );
        // 800 > 1024 - 256: refused for a normal allocation.
        let err = broker.allocate(&AllocationRequest::new(800)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
        // A critical allocation may dip into the reserve.
        broker
            .allocate(&AllocationRequest::new(800).with_flags(MemoryFlags::CRITICAL))
            .expect("critical alloc");
    }

    #[test]
    fn pressure_callback_fires_on_rising_edges_only() {
        let broker = single_region_broker(1_000_000);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        broker.on_pressure(PressureLevel::Medium, move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        // 760 000 used: 24 % available, Medium, fires once.
        let a = broker
            .allocate(&AllocationRequest::new(760_000).with_align(1))
            .expect("alloc");
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Level unchanged: no second fire.
        let b = broker
            .allocate(&AllocationRequest::new(10).with_align(1))
            .expect("alloc");
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Falling edge: silent.
        broker.deallocate(b.handle).expect("free");
        broker.deallocate(a.handle).expect("free");
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Rising to High fires again.
        let _c = broker
            .allocate(&AllocationRequest::new(900_000).with_align(1))
            .expect("alloc");
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stats_track_usage() {
        let broker = single_region_broker(4096);
        let a = broker.allocate(&AllocationRequest::new(100)).expect("a");
        let _b = broker.allocate(&AllocationRequest::new(200)).expect("b");
        let stats = broker.stats();
        assert_eq!(stats.allocation_count, 2);
        assert!(stats.used >= 300);
        broker.deallocate(a.handle).expect("free");
        assert_eq!(broker.stats().allocation_count, 1);
    }

    #[test]
    fn standard_layout_builds_for_presets() {
        for platform in [
            PlatformProbe::minimal().finish().expect("probe"),
            PlatformProbe::detect().finish().expect("probe"),
        ] {
            let broker = MemoryBroker::standard(&platform).expect("broker");
            assert!(!broker.regions().is_empty());
        }
    }

    #[test]
    fn defragment_merges_freed_neighbors() {
        let broker = single_region_broker(4096);
        let a = broker.allocate(&AllocationRequest::new(128)).expect("a");
        let b = broker.allocate(&AllocationRequest::new(128)).expect("b");
        broker.deallocate(a.handle).expect("free a");
        broker.deallocate(b.handle).expect("free b");
        let merges = broker.defragment().expect("defrag");
        assert!(merges >= 1);
    }
}
