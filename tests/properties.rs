//! Property-style invariants over the core data structures.

use halcyon::memory::{
    AllocationRequest, AllocatorKind, PressureThresholds, RegionSpec, SUPPORTED_ALIGNMENTS,
};
use halcyon::types::handle::{HandleKind, HandleTable};
use halcyon::{
    Capability, CapabilityMask, ErrorKind, Event, EventCategory, EventFilter, EventPayload,
    EventSeverity, MemoryBroker, MemoryFlags, PlatformProbe,
};
use proptest::prelude::*;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct SlotTag;
impl HandleKind for SlotTag {
    const NAME: &'static str = "slot";
}

fn test_broker(total: usize) -> MemoryBroker {
    let platform = PlatformProbe::detect().finish().expect("probe");
    MemoryBroker::with_regions(
        &platform,
        vec![
            RegionSpec::new("general", total, AllocatorKind::FreeList),
            RegionSpec::new("buddy", 1 << 20, AllocatorKind::Buddy).with_buddy_min_block(64),
            RegionSpec::new("system", 0, AllocatorKind::System),
        ],
        PressureThresholds::default(),
        0,
    )
    .expect("broker")
}

proptest! {
    #[test]
    fn allocations_always_respect_alignment(
        sizes in proptest::collection::vec(1usize..4096, 1..24),
        align_picks in proptest::collection::vec(0usize..SUPPORTED_ALIGNMENTS.len(), 1..24),
    ) {
        let broker = test_broker(1 << 22);
        let mut live = Vec::new();
        for (size, pick) in sizes.iter().zip(align_picks.iter().cycle()) {
            let align = SUPPORTED_ALIGNMENTS[*pick];
            let alloc = broker
                .allocate(&AllocationRequest::new(*size).with_align(align))
                .expect("alloc");
            prop_assert_eq!(alloc.addr % align, 0);
            prop_assert!(alloc.size >= *size);
            live.push(alloc.handle);
        }
        for handle in live {
            broker.deallocate(handle).expect("free");
        }
        prop_assert_eq!(broker.stats().allocation_count, 0);
    }

    #[test]
    fn zero_flag_always_zeroes(
        rounds in 1usize..12,
        size in 1usize..512,
    ) {
        let broker = test_broker(1 << 20);
        for _ in 0..rounds {
            let dirty = broker
                .allocate(&AllocationRequest::new(size))
                .expect("alloc");
            let junk = vec![0xA5u8; size];
            broker.write_bytes(dirty.handle, 0, &junk).expect("write");
            broker.deallocate(dirty.handle).expect("free");

            let clean = broker
                .allocate(&AllocationRequest::new(size).with_flags(MemoryFlags::ZERO))
                .expect("alloc");
            prop_assert_eq!(broker.read_byte(clean.handle, 0).expect("read"), 0);
            broker.deallocate(clean.handle).expect("free");
        }
    }

    #[test]
    fn handle_table_never_resurrects(
        ops in proptest::collection::vec(0u8..3, 1..64),
    ) {
        let mut table: HandleTable<SlotTag, u32> = HandleTable::new();
        let mut live = Vec::new();
        let mut dead = Vec::new();
        let mut counter = 0u32;
        for op in ops {
            match op {
                0 => {
                    counter += 1;
                    live.push(table.insert(counter));
                }
                1 => {
                    if let Some(handle) = live.pop() {
                        table.remove(handle).expect("remove live");
                        dead.push(handle);
                    }
                }
                _ => {
                    for &handle in &live {
                        prop_assert!(table.get(handle).is_ok());
                    }
                    for &handle in &dead {
                        prop_assert_eq!(
                            table.get(handle).unwrap_err().kind(),
                            ErrorKind::InvalidHandle
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn capability_mask_algebra_laws(bits_a in any::<u128>(), bits_b in any::<u128>()) {
        let a = CapabilityMask(bits_a);
        let b = CapabilityMask(bits_b);
        // Union is commutative and contains both operands.
        prop_assert_eq!(a.union(b), b.union(a));
        prop_assert!(a.union(b).contains_all(a));
        prop_assert!(a.union(b).contains_all(b));
        // Intersection is a subset of both.
        prop_assert!(a.contains_all(a.intersection(b)));
        prop_assert!(b.contains_all(a.intersection(b)));
        // Difference removes exactly the other operand's bits.
        prop_assert!(a.difference(b).intersection(b).is_empty());
        prop_assert_eq!(a.difference(b).union(a.intersection(b)), a);
    }

    #[test]
    fn filter_severity_is_monotone(severity_index in 0u8..6) {
        let severities = [
            EventSeverity::Debug,
            EventSeverity::Info,
            EventSeverity::Warning,
            EventSeverity::Error,
            EventSeverity::Critical,
            EventSeverity::Fatal,
        ];
        let min = severities[severity_index as usize];
        let filter = EventFilter::any().min_severity(min);
        for severity in severities {
            let event = Event::new(
                EventCategory::Hardware,
                severity,
                "prop",
                EventPayload::None,
            );
            prop_assert_eq!(filter.matches(&event), severity >= min);
        }
    }
}

#[test]
fn capability_bits_are_unique() {
    let caps = [
        Capability::Threading,
        Capability::Atomics,
        Capability::HighResTimer,
        Capability::RealtimeClock,
        Capability::ProcessClock,
        Capability::ThreadClock,
        Capability::DmaTransfer,
        Capability::StoreQueues,
        Capability::VirtualMemory,
        Capability::MemoryProtection,
        Capability::ExecutableMemory,
        Capability::SharedMemory,
        Capability::VideoMemory,
        Capability::AudioMemory,
        Capability::BuddyAllocation,
        Capability::Defragmentation,
        Capability::Framebuffer,
        Capability::Hardware3D,
        Capability::DisplayLists,
        Capability::TextureCompression,
        Capability::BasicPcm,
        Capability::HardwareDsp,
        Capability::MultiChannelAudio,
        Capability::Gamepad,
        Capability::Keyboard,
        Capability::Pointer,
        Capability::RandomAccessStorage,
        Capability::RemovableMedia,
        Capability::StreamSockets,
        Capability::DatagramSockets,
        Capability::CycleCounters,
        Capability::CacheCounters,
    ];
    let mut bits: Vec<u32> = caps.iter().map(|c| c.bit()).collect();
    bits.sort_unstable();
    bits.dedup();
    assert_eq!(bits.len(), caps.len());
    assert!(bits.iter().all(|&b| b < 128));
}
