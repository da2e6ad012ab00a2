//! Memory pressure levels and the level-triggered monitor.
//!
//! The level is a monotone function of available memory: as availability
//! falls through the configured thresholds the level rises through
//! `Low → Medium → High → Critical`. Callbacks fire on *rising* level
//! transitions only — once per transition, in registration order — unless a
//! callback opted into falling-edge notification at registration.
//!
//! Callbacks run synchronously on the thread whose allocation triggered the
//! transition. They must not allocate and must not re-enter the monitor.

use crate::error::{Error, ErrorKind, Result};
use core::fmt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Discretised memory-availability state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum PressureLevel {
    /// More than the low threshold available.
    #[default]
    None = 0,
    /// Availability at or below the low threshold.
    Low = 1,
    /// Availability at or below the medium threshold.
    Medium = 2,
    /// Availability at or below the high threshold.
    High = 3,
    /// Availability at or below the critical threshold.
    Critical = 4,
}

impl PressureLevel {
    /// Returns the level name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Availability-ratio thresholds for each level, as fractions of total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureThresholds {
    /// `Low` at or below this availability ratio.
    pub low: f32,
    /// `Medium` at or below this availability ratio.
    pub medium: f32,
    /// `High` at or below this availability ratio.
    pub high: f32,
    /// `Critical` at or below this availability ratio.
    pub critical: f32,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            low: 0.50,
            medium: 0.25,
            high: 0.10,
            critical: 0.05,
        }
    }
}

impl PressureThresholds {
    /// Validates that thresholds are in `(0, 1]` and strictly decreasing.
    pub fn validate(&self) -> Result<()> {
        let ordered = self.low > self.medium && self.medium > self.high && self.high > self.critical;
        let in_range = self.critical > 0.0 && self.low <= 1.0;
        if ordered && in_range {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::InvalidParameters,
                "pressure thresholds must be strictly decreasing within (0, 1]",
            ))
        }
    }

    /// Level for the given availability ratio.
    #[must_use]
    pub fn level_for(&self, available_ratio: f32) -> PressureLevel {
        if available_ratio <= self.critical {
            PressureLevel::Critical
        } else if available_ratio <= self.high {
            PressureLevel::High
        } else if available_ratio <= self.medium {
            PressureLevel::Medium
        } else if available_ratio <= self.low {
            PressureLevel::Low
        } else {
            PressureLevel::None
        }
    }
}

/// Snapshot handed to pressure callbacks and returned by queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureInfo {
    /// Current level.
    pub level: PressureLevel,
    /// Bytes still available across managed regions.
    pub available_bytes: usize,
    /// Bytes withheld for `CRITICAL` allocations.
    pub emergency_reserve: usize,
    /// Used fraction of total (`1.0 - available/total`).
    pub pressure_ratio: f32,
    /// True when reclaiming garbage would plausibly help.
    pub gc_recommended: bool,
    /// Monotonic nanoseconds of the last level transition.
    pub last_pressure_time_ns: u64,
}

/// Identifies a registered pressure callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type PressureCallback = Box<dyn FnMut(&PressureInfo) + Send>;

struct CallbackEntry {
    id: CallbackId,
    min_level: PressureLevel,
    notify_on_release: bool,
    callback: PressureCallback,
}

struct MonitorInner {
    thresholds: PressureThresholds,
    level: PressureLevel,
    last_transition_ns: u64,
    callbacks: Vec<CallbackEntry>,
    next_id: u64,
}

/// Level-triggered pressure monitor.
pub struct PressureMonitor {
    inner: Mutex<MonitorInner>,
}

impl PressureMonitor {
    /// Creates a monitor with the given thresholds.
    #[must_use]
    pub fn new(thresholds: PressureThresholds) -> Self {
        Self {
            inner: Mutex::new(MonitorInner {
                thresholds,
                level: PressureLevel::None,
                last_transition_ns: 0,
                callbacks: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Registers a callback that fires on rising transitions to
    /// `min_level` or above.
    pub fn register(
        &self,
        min_level: PressureLevel,
        callback: impl FnMut(&PressureInfo) + Send + 'static,
    ) -> CallbackId {
        self.register_inner(min_level, false, Box::new(callback))
    }

    /// Registers a callback that additionally fires on falling
    /// transitions out of its level range.
    pub fn register_with_release(
        &self,
        min_level: PressureLevel,
        callback: impl FnMut(&PressureInfo) + Send + 'static,
    ) -> CallbackId {
        self.register_inner(min_level, true, Box::new(callback))
    }

    fn register_inner(
        &self,
        min_level: PressureLevel,
        notify_on_release: bool,
        callback: PressureCallback,
    ) -> CallbackId {
        let mut inner = self.inner.lock();
        let id = CallbackId(inner.next_id);
        inner.next_id += 1;
        inner.callbacks.push(CallbackEntry {
            id,
            min_level,
            notify_on_release,
            callback,
        });
        id
    }

    /// Removes a registered callback.
    pub fn unregister(&self, id: CallbackId) -> Result<()> {
        let mut inner = self.inner.lock();
        let before = inner.callbacks.len();
        inner.callbacks.retain(|entry| entry.id != id);
        if inner.callbacks.len() == before {
            Err(Error::new(ErrorKind::NotFound, "no such pressure callback"))
        } else {
            Ok(())
        }
    }

    /// Current level without re-evaluating.
    #[must_use]
    pub fn level(&self) -> PressureLevel {
        self.inner.lock().level
    }

    /// Re-evaluates the level from current availability and fires
    /// callbacks on a transition.
    ///
    /// Runs on the caller; callbacks must not allocate or re-enter.
    pub fn update(
        &self,
        available: usize,
        total: usize,
        emergency_reserve: usize,
        now_ns: u64,
    ) -> PressureInfo {
        let mut inner = self.inner.lock();
        #[allow(clippy::cast_precision_loss)]
        let available_ratio = if total == 0 {
            1.0
        } else {
            available as f32 / total as f32
        };
        let new_level = inner.thresholds.level_for(available_ratio);
        let old_level = inner.level;
        if new_level != old_level {
            inner.level = new_level;
            inner.last_transition_ns = now_ns;
        }
        let info = PressureInfo {
            level: new_level,
            available_bytes: available,
            emergency_reserve,
            pressure_ratio: 1.0 - available_ratio,
            gc_recommended: new_level >= PressureLevel::High,
            last_pressure_time_ns: inner.last_transition_ns,
        };
        if new_level > old_level {
            tracing::debug!(from = %old_level, to = %new_level, "memory pressure rising");
            for entry in &mut inner.callbacks {
                if entry.min_level <= new_level {
                    (entry.callback)(&info);
                }
            }
        } else if new_level < old_level {
            for entry in &mut inner.callbacks {
                if entry.notify_on_release && entry.min_level <= old_level {
                    (entry.callback)(&info);
                }
            }
        }
        info
    }
}

impl fmt::Debug for PressureMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PressureMonitor")
            .field("level", &inner.level)
            .field("callbacks", &inner.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn level_thresholds_default() {
        let t = PressureThresholds::default();
        assert_eq!(t.level_for(0.8), PressureLevel::None);
        assert_eq!(t.level_for(0.50), PressureLevel::Low);
        assert_eq!(t.level_for(0.25), PressureLevel::Medium);
        assert_eq!(t.level_for(0.10), PressureLevel::High);
        assert_eq!(t.level_for(0.05), PressureLevel::Critical);
        assert_eq!(t.level_for(0.0), PressureLevel::Critical);
    }

    #[test]
    fn level_is_monotone_in_availability() {
        let t = PressureThresholds::default();
        let mut prev = PressureLevel::Critical;
        for i in 0..=100 {
            #[allow(clippy::cast_precision_loss)]
            let ratio = i as f32 / 100.0;
            let level = t.level_for(ratio);
            assert!(level <= prev, "level must not rise as availability rises");
            prev = level;
        }
    }

    #[test]
    fn rising_edge_fires_once() {
        let monitor = PressureMonitor::new(PressureThresholds::default());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        monitor.register(PressureLevel::Medium, move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        // 24 % available: Medium.
        monitor.update(240_000, 1_000_000, 0, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // Unchanged level: no further fire.
        monitor.update(239_000, 1_000_000, 0, 2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // Falling: no fire.
        monitor.update(999_000, 1_000_000, 0, 3);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // Rising straight to High fires the Medium callback again.
        monitor.update(100_000, 1_000_000, 0, 4);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn release_notification_is_opt_in() {
        let monitor = PressureMonitor::new(PressureThresholds::default());
        let releases = Arc::new(AtomicUsize::new(0));
        let releases2 = Arc::clone(&releases);
        monitor.register_with_release(PressureLevel::Low, move |info| {
            if info.level == PressureLevel::None {
                releases2.fetch_add(1, Ordering::SeqCst);
            }
        });
        monitor.update(300_000, 1_000_000, 0, 1);
        monitor.update(900_000, 1_000_000, 0, 2);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let monitor = PressureMonitor::new(PressureThresholds::default());
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            monitor.register(PressureLevel::Low, move |_| order.lock().push(tag));
        }
        monitor.update(100_000, 1_000_000, 0, 1);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unregister_removes_callback() {
        let monitor = PressureMonitor::new(PressureThresholds::default());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let id = monitor.register(PressureLevel::Low, move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        monitor.unregister(id).expect("unregister");
        assert_eq!(
            monitor.unregister(id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        monitor.update(100_000, 1_000_000, 0, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn threshold_validation() {
        assert!(PressureThresholds::default().validate().is_ok());
        let bad = PressureThresholds {
            low: 0.1,
            medium: 0.25,
            high: 0.10,
            critical: 0.05,
        };
        assert_eq!(
            bad.validate().unwrap_err().kind(),
            ErrorKind::InvalidParameters
        );
    }

    #[test]
    fn gc_recommended_at_high() {
        let monitor = PressureMonitor::new(PressureThresholds::default());
        let info = monitor.update(80_000, 1_000_000, 0, 1);
        assert_eq!(info.level, PressureLevel::High);
        assert!(info.gc_recommended);
    }
}
