//! Resource coordinator: arbitration of shared hardware regions.
//!
//! Drivers never touch shared regions (video memory, audio RAM, store
//! queues, DMA channels) directly; they hold a [`Lease`] from the
//! coordinator. For any region, at any instant, either one exclusive lease
//! exists or any number of shared leases exist — never both.
//!
//! Deadlock is avoided structurally, not detected after the fact: every
//! region carries a fixed rank assigned at registration, and a holder may
//! only acquire regions in strictly increasing rank order. An out-of-order
//! acquire fails immediately with `LockOrderViolation` (fatal), leaving
//! every held lease intact.

use crate::error::{Error, ErrorKind, Result};
use crate::event::{Event, EventCategory, EventPayload, EventSeverity, EventSink};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifies a lease holder (a driver instance, usually).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HolderId(pub u64);

/// Token for a registered region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionToken(u16);

/// Lease sharing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseMode {
    /// Sole access.
    Exclusive,
    /// Concurrent read-style access.
    Shared,
}

/// A granted right-to-use for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    id: u64,
    /// The leased region.
    pub region: RegionToken,
    /// Who holds it.
    pub holder: HolderId,
    /// Sharing mode.
    pub mode: LeaseMode,
    /// The region's rank.
    pub rank: u32,
    /// Monotonic nanoseconds at grant.
    pub acquired_at_ns: u64,
}

struct RegionState {
    name: &'static str,
    rank: u32,
    exclusive: Option<u64>,
    shared: Vec<u64>,
    waiters: u32,
}

struct LeaseRecord {
    region: u16,
    holder: HolderId,
    mode: LeaseMode,
    rank: u32,
}

#[derive(Default)]
struct CoordState {
    regions: Vec<RegionState>,
    leases: HashMap<u64, LeaseRecord>,
    holders: HashMap<HolderId, Vec<u64>>,
    next_lease: u64,
}

/// Region usage counters for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionUsage {
    /// Region name.
    pub name: &'static str,
    /// Region rank.
    pub rank: u32,
    /// Live holders (1 for exclusive, N for shared).
    pub holders: u32,
    /// Acquires currently blocked on this region.
    pub waiters: u32,
}

/// The coordinator.
pub struct ResourceCoordinator {
    state: Mutex<CoordState>,
    released: Condvar,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    contention: AtomicU64,
    epoch: Instant,
}

impl ResourceCoordinator {
    /// Creates an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoordState::default()),
            released: Condvar::new(),
            sink: RwLock::new(None),
            contention: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Wires the event sink used for contention and fatal events.
    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.write() = Some(sink);
    }

    fn now_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Registers a region with its fixed rank. The name must be unique.
    pub fn register_region(&self, name: &'static str, rank: u32) -> Result<RegionToken> {
        let mut state = self.state.lock();
        if state.regions.iter().any(|r| r.name == name) {
            return Err(Error::new(ErrorKind::Duplicate, "region name already registered"));
        }
        let index = u16::try_from(state.regions.len())
            .map_err(|_| Error::new(ErrorKind::InvalidParameters, "too many regions"))?;
        state.regions.push(RegionState {
            name,
            rank,
            exclusive: None,
            shared: Vec::new(),
            waiters: 0,
        });
        Ok(RegionToken(index))
    }

    /// Looks a region up by name.
    pub fn region(&self, name: &str) -> Result<RegionToken> {
        let state = self.state.lock();
        state
            .regions
            .iter()
            .position(|r| r.name == name)
            .map(|i| RegionToken(u16::try_from(i).unwrap_or(u16::MAX)))
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such region"))
    }

    fn grantable(region: &RegionState, mode: LeaseMode) -> bool {
        match mode {
            LeaseMode::Exclusive => region.exclusive.is_none() && region.shared.is_empty(),
            LeaseMode::Shared => region.exclusive.is_none(),
        }
    }

    fn grant(
        state: &mut CoordState,
        region: RegionToken,
        holder: HolderId,
        mode: LeaseMode,
        rank: u32,
        now_ns: u64,
    ) -> Lease {
        state.next_lease += 1;
        let id = state.next_lease;
        let region_state = &mut state.regions[region.0 as usize];
        match mode {
            LeaseMode::Exclusive => region_state.exclusive = Some(id),
            LeaseMode::Shared => region_state.shared.push(id),
        }
        state.leases.insert(
            id,
            LeaseRecord {
                region: region.0,
                holder,
                mode,
                rank,
            },
        );
        state.holders.entry(holder).or_default().push(id);
        Lease {
            id,
            region,
            holder,
            mode,
            rank,
            acquired_at_ns: now_ns,
        }
    }

    fn publish_contention(&self, name: &'static str, holders: u32) {
        self.contention.fetch_add(1, Ordering::Relaxed);
        if let Some(sink) = self.sink.read().as_ref() {
            sink.publish(Event::new(
                EventCategory::Resource,
                EventSeverity::Warning,
                "resource-coordinator",
                EventPayload::ResourceContention {
                    region: name,
                    holders,
                },
            ));
        }
    }

    fn publish_fatal(&self) {
        if let Some(sink) = self.sink.read().as_ref() {
            sink.publish(Event::new(
                EventCategory::Resource,
                EventSeverity::Fatal,
                "resource-coordinator",
                EventPayload::Fatal {
                    kind: ErrorKind::LockOrderViolation,
                },
            ));
        }
    }

    /// Acquires a lease, blocking at most `timeout`.
    pub fn acquire(
        &self,
        region: RegionToken,
        holder: HolderId,
        mode: LeaseMode,
        timeout: Duration,
    ) -> Result<Lease> {
        self.acquire_with_cancel(region, holder, mode, timeout, None)
    }

    /// Acquires a lease with an optional cancellation flag.
    ///
    /// A cancelled acquire never issues the lease and leaves all state as
    /// it was before the call.
    pub fn acquire_with_cancel(
        &self,
        region: RegionToken,
        holder: HolderId,
        mode: LeaseMode,
        timeout: Duration,
        cancel: Option<&AtomicBool>,
    ) -> Result<Lease> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let (rank, name) = {
            let region_state = state
                .regions
                .get(region.0 as usize)
                .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such region"))?;
            (region_state.rank, region_state.name)
        };

        // Rank discipline is enforced before any waiting happens.
        let max_held = state
            .holders
            .get(&holder)
            .into_iter()
            .flatten()
            .filter_map(|id| state.leases.get(id))
            .map(|lease| lease.rank)
            .max();
        if let Some(max_held) = max_held {
            if rank <= max_held {
                drop(state);
                tracing::error!(
                    region = name,
                    rank,
                    held_rank = max_held,
                    "lease requested out of rank order"
                );
                self.publish_fatal();
                return Err(Error::new(
                    ErrorKind::LockOrderViolation,
                    "region rank is not above every held rank",
                )
                .with_operation("acquire"));
            }
        }

        loop {
            // Cancellation wins over a grant that raced the wakeup.
            if let Some(cancel) = cancel {
                if cancel.load(Ordering::SeqCst) {
                    return Err(Error::new(ErrorKind::Cancelled, "acquire cancelled")
                        .with_operation("acquire"));
                }
            }
            let region_state = &mut state.regions[region.0 as usize];
            if Self::grantable(region_state, mode) {
                let now = self.now_ns();
                return Ok(Self::grant(&mut state, region, holder, mode, rank, now));
            }
            region_state.waiters += 1;
            let timed_out = self.released.wait_until(&mut state, deadline).timed_out();
            state.regions[region.0 as usize].waiters =
                state.regions[region.0 as usize].waiters.saturating_sub(1);
            if timed_out {
                let holders = Self::holder_count(&state.regions[region.0 as usize]);
                drop(state);
                self.publish_contention(name, holders);
                return Err(Error::new(ErrorKind::Timeout, "lease acquire timed out")
                    .with_operation("acquire"));
            }
        }
    }

    fn holder_count(region: &RegionState) -> u32 {
        u32::from(region.exclusive.is_some())
            + u32::try_from(region.shared.len()).unwrap_or(u32::MAX)
    }

    /// Releases a lease. Double release is a warned no-op.
    pub fn release(&self, lease: &Lease) {
        let mut state = self.state.lock();
        let Some(record) = state.leases.remove(&lease.id) else {
            tracing::warn!(lease = lease.id, "double release of a lease");
            return;
        };
        let region_state = &mut state.regions[record.region as usize];
        match record.mode {
            LeaseMode::Exclusive => {
                if region_state.exclusive == Some(lease.id) {
                    region_state.exclusive = None;
                }
            }
            LeaseMode::Shared => region_state.shared.retain(|&id| id != lease.id),
        }
        if let Some(held) = state.holders.get_mut(&record.holder) {
            held.retain(|&id| id != lease.id);
            if held.is_empty() {
                state.holders.remove(&record.holder);
            }
        }
        drop(state);
        self.released.notify_all();
    }

    /// Upgrades the sole shared lease to exclusive.
    ///
    /// Fails with `Contended` while other shared holders exist.
    pub fn try_upgrade(&self, lease: &Lease) -> Result<Lease> {
        let mut state = self.state.lock();
        let record = state
            .leases
            .get(&lease.id)
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle, "lease is not live"))?;
        if record.mode != LeaseMode::Shared {
            return Err(Error::new(ErrorKind::InvalidState, "lease is not shared"));
        }
        let region_index = record.region as usize;
        let region_state = &state.regions[region_index];
        if region_state.shared != vec![lease.id] || region_state.exclusive.is_some() {
            return Err(Error::new(
                ErrorKind::Contended,
                "other shared holders present",
            )
            .with_operation("try_upgrade"));
        }
        let region_state = &mut state.regions[region_index];
        region_state.shared.clear();
        region_state.exclusive = Some(lease.id);
        if let Some(record) = state.leases.get_mut(&lease.id) {
            record.mode = LeaseMode::Exclusive;
        }
        Ok(Lease {
            mode: LeaseMode::Exclusive,
            ..*lease
        })
    }

    /// Usage counters for a region.
    pub fn usage(&self, region: RegionToken) -> Result<RegionUsage> {
        let state = self.state.lock();
        let region_state = state
            .regions
            .get(region.0 as usize)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such region"))?;
        Ok(RegionUsage {
            name: region_state.name,
            rank: region_state.rank,
            holders: Self::holder_count(region_state),
            waiters: region_state.waiters,
        })
    }

    /// Number of timed-out acquires so far.
    #[must_use]
    pub fn contention_count(&self) -> u64 {
        self.contention.load(Ordering::Relaxed)
    }
}

impl Default for ResourceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ResourceCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourceCoordinator")
            .field("regions", &state.regions.len())
            .field("live_leases", &state.leases.len())
            .finish()
    }
}
