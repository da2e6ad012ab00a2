//! Event bus: lock-free ingestion, filtered fan-out, batching.
//!
//! The bus sits at L2: it depends on nothing above the threading façade and
//! no driver depends on its internals. Producers publish value-typed events
//! into a fixed ring; a single consumer fans them out to subscribers.
//!
//! On preemptive platforms a dedicated dispatch thread drains the ring.
//! Everywhere else the embedder calls [`EventBus::pump`] from its main
//! loop; no dispatch happens otherwise.
//!
//! Lower layers (memory, resource coordination, the registry) publish
//! through the narrow [`EventSink`] trait, wired at assembly time, so the
//! bus itself never becomes a dependency of the layers below it.

pub mod event;
pub mod filter;
pub mod queue;
pub mod source;
pub mod subscription;

pub use event::{AttrValue, CategorySet, Event, EventCategory, EventPayload, EventSeverity};
pub use filter::EventFilter;
pub use queue::{EventQueue, OverflowPolicy};
pub use source::{EventSource, SourceState};
pub use subscription::{BatchPolicy, DeliveryMode, SubscriptionId, SubscriptionManager};

use crate::error::{Error, ErrorKind, Result};
use crate::thread::work::{WorkItem, WorkPriority, WorkQueue};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Narrow publication seam for layers below the bus.
pub trait EventSink: Send + Sync {
    /// Publishes an event; returns false if it was dropped.
    fn publish(&self, event: Event) -> bool;
}

/// Bus construction parameters.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Ring capacity.
    pub capacity: usize,
    /// Overflow policy.
    pub policy: OverflowPolicy,
    /// Batching, when enabled.
    pub batching: Option<BatchPolicy>,
    /// Spawn the dedicated dispatch thread (preemptive platforms only).
    pub dispatch_thread: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 2048,
            policy: OverflowPolicy::DropNewest,
            batching: None,
            dispatch_thread: false,
        }
    }
}

struct SourceSlot {
    source: Box<dyn EventSource>,
    state: SourceState,
}

struct BusShared {
    queue: EventQueue,
    subs: SubscriptionManager,
    sources: Mutex<Vec<SourceSlot>>,
    seq: AtomicU64,
    epoch: Instant,
    batching: Option<BatchPolicy>,
    running: AtomicBool,
    wake: Mutex<bool>,
    wake_cv: Condvar,
}

impl BusShared {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn stamp(&self, mut event: Event) -> Event {
        event.id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        if event.timestamp_ns == 0 {
            event.timestamp_ns = self.now_ns();
        }
        event
    }

    fn signal(&self) {
        let mut woken = self.wake.lock();
        *woken = true;
        self.wake_cv.notify_one();
    }

    /// Polls running sources and moves their events into the ring.
    fn poll_sources(&self) {
        let mut sources = self.sources.lock();
        for slot in sources.iter_mut() {
            if slot.state != SourceState::Running {
                continue;
            }
            while let Some(event) = slot.source.poll() {
                let stamped = self.stamp(event);
                self.queue.push(stamped);
            }
        }
    }

    /// One drain-and-dispatch cycle; returns events dispatched.
    fn dispatch_cycle(&self, max_events: usize) -> (usize, Vec<SubscriptionId>) {
        self.poll_sources();
        let mut drained = Vec::new();
        while drained.len() < max_events {
            match self.queue.pop() {
                Some(event) => drained.push(event),
                None => break,
            }
        }
        let now = self.now_ns();
        let mut pending = Vec::new();
        if !drained.is_empty() {
            pending = self.subs.dispatch(&drained, self.batching, now);
        }
        self.subs.flush_due(now);
        (drained.len(), pending)
    }
}

/// Handle given to push-based sources for direct ingestion.
#[derive(Clone)]
pub struct Ingest {
    shared: Arc<BusShared>,
}

impl Ingest {
    /// Enqueues an event; returns false if it was dropped.
    pub fn push(&self, event: Event) -> bool {
        let stamped = self.shared.stamp(event);
        let accepted = self.shared.queue.push(stamped);
        self.shared.signal();
        accepted
    }
}

impl core::fmt::Debug for Ingest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Ingest").finish_non_exhaustive()
    }
}

/// Identifies a registered event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceId(usize);

/// The event system façade.
pub struct EventBus {
    shared: Arc<BusShared>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
    work_queue: RwLock<Option<Arc<WorkQueue>>>,
}

impl EventBus {
    /// Builds a bus. With `dispatch_thread` set, a dedicated consumer
    /// drains the ring; otherwise callers must pump.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        let shared = Arc::new(BusShared {
            queue: EventQueue::new(config.capacity, config.policy),
            subs: SubscriptionManager::new(),
            sources: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            epoch: Instant::now(),
            batching: config.batching,
            running: AtomicBool::new(false),
            wake: Mutex::new(false),
            wake_cv: Condvar::new(),
        });
        let bus = Self {
            shared,
            worker: Mutex::new(None),
            work_queue: RwLock::new(None),
        };
        if config.dispatch_thread {
            bus.spawn_dispatcher();
        }
        bus
    }

    fn spawn_dispatcher(&self) {
        let shared = Arc::clone(&self.shared);
        shared.running.store(true, Ordering::SeqCst);
        let handle = std::thread::Builder::new()
            .name("halcyon-events".to_owned())
            .spawn(move || {
                while shared.running.load(Ordering::SeqCst) {
                    let (dispatched, pending) = shared.dispatch_cycle(256);
                    for id in pending {
                        shared.subs.drain_async(id);
                    }
                    if dispatched == 0 {
                        let deadline_gap = shared
                            .subs
                            .next_deadline()
                            .map(|d| d.saturating_sub(shared.now_ns()));
                        let timeout =
                            Duration::from_nanos(deadline_gap.unwrap_or(5_000_000).min(5_000_000));
                        let mut woken = shared.wake.lock();
                        if !*woken {
                            shared.wake_cv.wait_for(&mut woken, timeout);
                        }
                        *woken = false;
                    }
                }
            })
            .expect("spawn event dispatcher");
        *self.worker.lock() = Some(handle);
    }

    /// Wires the work queue used for async delivery.
    pub fn set_work_queue(&self, work: Arc<WorkQueue>) {
        *self.work_queue.write() = Some(work);
    }

    /// Registers a subscription.
    pub fn subscribe(
        &self,
        filter: EventFilter,
        delivery: DeliveryMode,
        callback: impl FnMut(&[Event]) + Send + 'static,
    ) -> SubscriptionId {
        self.shared.subs.subscribe(filter, delivery, callback)
    }

    /// Revokes a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.shared.subs.unsubscribe(id)
    }

    /// Drains and dispatches up to `max_events`. Returns the number
    /// dispatched.
    ///
    /// This is the only dispatch path on cooperative and single-threaded
    /// platforms.
    pub fn pump(&self, max_events: usize) -> usize {
        let (dispatched, pending) = self.shared.dispatch_cycle(max_events);
        let work = self.work_queue.read().clone();
        match work {
            Some(work) => {
                for id in pending {
                    let subs_shared = Arc::clone(&self.shared);
                    let item = WorkItem::new("event-async-delivery", WorkPriority::Normal, move || {
                        subs_shared.subs.drain_async(id);
                    });
                    if work.submit(item).is_err() {
                        self.shared.subs.drain_async(id);
                    }
                }
            }
            None => {
                self.shared.subs.drain_all_async();
            }
        }
        dispatched
    }

    /// Current ring depth.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Ring capacity.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Events lost to ring overflow.
    #[must_use]
    pub fn events_dropped(&self) -> u64 {
        self.shared.queue.events_dropped()
    }

    /// Registers and initializes a source.
    pub fn add_source(&self, mut source: Box<dyn EventSource>) -> Result<SourceId> {
        source.init()?;
        let mut sources = self.shared.sources.lock();
        sources.push(SourceSlot {
            source,
            state: SourceState::Ready,
        });
        Ok(SourceId(sources.len() - 1))
    }

    /// Starts every ready or stopped source.
    pub fn start_sources(&self) -> Result<()> {
        let ingest = Ingest {
            shared: Arc::clone(&self.shared),
        };
        let mut sources = self.shared.sources.lock();
        for slot in sources.iter_mut() {
            match slot.state {
                SourceState::Ready | SourceState::Stopped => {
                    slot.source.start(ingest.clone())?;
                    slot.state = SourceState::Running;
                }
                SourceState::Running => {}
                SourceState::Created | SourceState::Shutdown => {
                    return Err(Error::new(
                        ErrorKind::InvalidState,
                        "source cannot start from this state",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Stops every running source.
    pub fn stop_sources(&self) -> Result<()> {
        let mut sources = self.shared.sources.lock();
        for slot in sources.iter_mut() {
            if slot.state == SourceState::Running {
                slot.source.stop()?;
                slot.state = SourceState::Stopped;
            }
        }
        Ok(())
    }

    /// Lifecycle state of a source.
    pub fn source_state(&self, id: SourceId) -> Result<SourceState> {
        self.shared
            .sources
            .lock()
            .get(id.0)
            .map(|s| s.state)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such source"))
    }

    /// Stops the dispatcher and tears down sources.
    pub fn shutdown(&self) -> Result<()> {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.signal();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        let mut sources = self.shared.sources.lock();
        for slot in sources.iter_mut() {
            if slot.state == SourceState::Running {
                slot.source.stop()?;
                slot.state = SourceState::Stopped;
            }
            if slot.state != SourceState::Shutdown {
                slot.source.shutdown()?;
                slot.state = SourceState::Shutdown;
            }
        }
        Ok(())
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: Event) -> bool {
        let stamped = self.shared.stamp(event);
        let accepted = self.shared.queue.push(stamped);
        self.shared.signal();
        accepted
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("queued", &self.shared.queue.len())
            .field("dropped", &self.shared.queue.events_dropped())
            .field("subscriptions", &self.shared.subs.len())
            .finish()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.signal();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}
