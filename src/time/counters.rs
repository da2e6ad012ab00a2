//! Performance counter snapshots.
//!
//! Registered gauges are sampled on a polling interval into a bounded ring
//! of snapshots (newest evicts oldest). Sampling cost is bounded by the
//! number of enabled gauges times the per-read overhead of the timer.

use crate::error::{Error, ErrorKind, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Default snapshot ring depth.
pub const DEFAULT_RING_DEPTH: usize = 1024;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One sampled gauge value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSample {
    /// Gauge name.
    pub name: &'static str,
    /// Sampled value.
    pub value: u64,
}

/// All gauges sampled at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfSnapshot {
    /// Monotonic nanoseconds of the sample.
    pub timestamp_ns: u64,
    /// Gauge readings, in registration order.
    pub samples: Vec<CounterSample>,
}

type Gauge = Box<dyn Fn() -> u64 + Send>;

struct CounterState {
    gauges: Vec<(&'static str, Gauge)>,
    ring: VecDeque<PerfSnapshot>,
    last_poll_ns: Option<u64>,
}

/// Bounded ring of periodic performance snapshots.
pub struct PerfCounters {
    state: Mutex<CounterState>,
    capacity: usize,
    interval: Duration,
}

impl PerfCounters {
    /// Creates a ring with the default depth and interval.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_RING_DEPTH, DEFAULT_POLL_INTERVAL)
    }

    /// Creates a ring with explicit depth and polling interval.
    #[must_use]
    pub fn with_settings(capacity: usize, interval: Duration) -> Self {
        Self {
            state: Mutex::new(CounterState {
                gauges: Vec::new(),
                ring: VecDeque::with_capacity(capacity.max(1)),
                last_poll_ns: None,
            }),
            capacity: capacity.max(1),
            interval,
        }
    }

    /// Registers a gauge sampled on every snapshot.
    pub fn register_gauge(
        &self,
        name: &'static str,
        gauge: impl Fn() -> u64 + Send + 'static,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.gauges.iter().any(|(n, _)| *n == name) {
            return Err(Error::new(ErrorKind::Duplicate, "gauge name already registered"));
        }
        state.gauges.push((name, Box::new(gauge)));
        Ok(())
    }

    /// Number of registered gauges.
    #[must_use]
    pub fn gauge_count(&self) -> usize {
        self.state.lock().gauges.len()
    }

    /// Takes a snapshot now, regardless of the interval.
    pub fn sample(&self, now_ns: u64) -> PerfSnapshot {
        let mut state = self.state.lock();
        let samples = state
            .gauges
            .iter()
            .map(|(name, gauge)| CounterSample {
                name,
                value: gauge(),
            })
            .collect();
        let snapshot = PerfSnapshot {
            timestamp_ns: now_ns,
            samples,
        };
        if state.ring.len() == self.capacity {
            state.ring.pop_front();
        }
        state.ring.push_back(snapshot.clone());
        state.last_poll_ns = Some(now_ns);
        snapshot
    }

    /// Takes a snapshot only if the polling interval has elapsed.
    pub fn poll(&self, now_ns: u64) -> Option<PerfSnapshot> {
        let due = {
            let state = self.state.lock();
            state.last_poll_ns.is_none_or(|last| {
                now_ns.saturating_sub(last) >= u64::try_from(self.interval.as_nanos()).unwrap_or(u64::MAX)
            })
        };
        due.then(|| self.sample(now_ns))
    }

    /// The most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<PerfSnapshot> {
        self.state.lock().ring.back().cloned()
    }

    /// All retained snapshots, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<PerfSnapshot> {
        self.state.lock().ring.iter().cloned().collect()
    }

    /// Ring depth.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PerfCounters {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PerfCounters")
            .field("gauges", &state.gauges.len())
            .field("snapshots", &state.ring.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn gauges_sample_in_registration_order() {
        let counters = PerfCounters::new();
        counters.register_gauge("frames", || 60).expect("register");
        counters.register_gauge("draws", || 1200).expect("register");
        let snapshot = counters.sample(1_000);
        assert_eq!(snapshot.samples.len(), 2);
        assert_eq!(snapshot.samples[0].name, "frames");
        assert_eq!(snapshot.samples[1].value, 1200);
    }

    #[test]
    fn duplicate_gauge_rejected() {
        let counters = PerfCounters::new();
        counters.register_gauge("x", || 0).expect("register");
        assert_eq!(
            counters.register_gauge("x", || 1).unwrap_err().kind(),
            ErrorKind::Duplicate
        );
    }

    #[test]
    fn ring_evicts_oldest() {
        let counters = PerfCounters::with_settings(3, Duration::from_millis(100));
        for i in 0..5 {
            counters.sample(i * 1_000);
        }
        let snapshots = counters.snapshots();
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].timestamp_ns, 2_000);
        assert_eq!(counters.latest().expect("latest").timestamp_ns, 4_000);
    }

    #[test]
    fn poll_respects_interval() {
        let counters = PerfCounters::with_settings(16, Duration::from_millis(100));
        assert!(counters.poll(0).is_some(), "first poll always samples");
        assert!(counters.poll(50_000_000).is_none(), "interval not elapsed");
        assert!(counters.poll(100_000_000).is_some());
    }

    #[test]
    fn gauges_observe_live_values() {
        let counters = PerfCounters::new();
        let value = Arc::new(AtomicU64::new(1));
        let value2 = Arc::clone(&value);
        counters
            .register_gauge("live", move || value2.load(Ordering::Relaxed))
            .expect("register");
        assert_eq!(counters.sample(0).samples[0].value, 1);
        value.store(42, Ordering::Relaxed);
        assert_eq!(counters.sample(1).samples[0].value, 42);
    }
}
