//! Runtime configuration.
//!
//! A [`Configuration`] is built once through the builder and read-only
//! afterwards; nothing in the core mutates configuration at runtime.
//! Builder validation returns `InvalidParameters` instead of panicking.

use crate::error::{Error, ErrorKind, Result};
use crate::event::queue::OverflowPolicy;
use crate::event::subscription::BatchPolicy;
use crate::memory::pressure::PressureThresholds;
use crate::thread::model::ThreadingModel;
use crate::time::sleep::SleepStrategy;
use serde::{Deserialize, Serialize};

/// Scheduling priority for the event dispatch thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DispatcherPriority {
    /// Below normal.
    Low,
    /// Host default.
    #[default]
    Normal,
    /// Above normal.
    High,
}

/// Immutable runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Event ring capacity.
    pub event_queue_capacity: usize,
    /// Event ring overflow policy.
    pub event_overflow_policy: OverflowPolicy,
    /// Dispatcher batching switch.
    pub batching_enabled: bool,
    /// Events per batch when batching.
    pub batch_size: usize,
    /// Longest a batch waits before flushing.
    pub batch_timeout_ms: u64,
    /// Threading model override; `None` auto-detects.
    pub threading_model: Option<ThreadingModel>,
    /// Cooperative tick budget in microseconds.
    pub cooperative_quantum_us: u64,
    /// Memory pressure thresholds.
    pub pressure_thresholds: PressureThresholds,
    /// Default sleep strategy.
    pub sleep_strategy_default: SleepStrategy,
    /// Bytes withheld for `CRITICAL` allocations.
    pub emergency_reserve_bytes: usize,
    /// Event dispatch thread priority. Advisory: applied where the host
    /// exposes a thread-priority surface.
    pub dispatcher_thread_priority: DispatcherPriority,
    /// Worker pool size override; `None` uses `max(1, cores - 1)`.
    pub pool_size: Option<usize>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            event_queue_capacity: 2048,
            event_overflow_policy: OverflowPolicy::DropNewest,
            batching_enabled: false,
            batch_size: 16,
            batch_timeout_ms: 5,
            threading_model: None,
            cooperative_quantum_us: 1000,
            pressure_thresholds: PressureThresholds::default(),
            sleep_strategy_default: SleepStrategy::Adaptive,
            emergency_reserve_bytes: 0,
            dispatcher_thread_priority: DispatcherPriority::Normal,
            pool_size: None,
        }
    }
}

impl Configuration {
    /// Starts a builder from the defaults.
    #[must_use]
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder {
            config: Self::default(),
        }
    }

    /// Batching parameters, when batching is enabled.
    #[must_use]
    pub fn batching(&self) -> Option<BatchPolicy> {
        self.batching_enabled.then_some(BatchPolicy {
            size: self.batch_size,
            timeout_ns: self.batch_timeout_ms.saturating_mul(1_000_000),
        })
    }
}

/// Builder for [`Configuration`].
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    config: Configuration,
}

impl ConfigurationBuilder {
    /// Sets the event ring capacity.
    #[must_use]
    pub const fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.event_queue_capacity = capacity;
        self
    }

    /// Sets the event ring overflow policy.
    #[must_use]
    pub const fn event_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.event_overflow_policy = policy;
        self
    }

    /// Enables dispatcher batching.
    #[must_use]
    pub const fn batching(mut self, size: usize, timeout_ms: u64) -> Self {
        self.config.batching_enabled = true;
        self.config.batch_size = size;
        self.config.batch_timeout_ms = timeout_ms;
        self
    }

    /// Overrides threading model auto-detection.
    #[must_use]
    pub const fn threading_model(mut self, model: ThreadingModel) -> Self {
        self.config.threading_model = Some(model);
        self
    }

    /// Sets the cooperative tick budget.
    #[must_use]
    pub const fn cooperative_quantum_us(mut self, quantum_us: u64) -> Self {
        self.config.cooperative_quantum_us = quantum_us;
        self
    }

    /// Sets memory pressure thresholds.
    #[must_use]
    pub const fn pressure_thresholds(mut self, thresholds: PressureThresholds) -> Self {
        self.config.pressure_thresholds = thresholds;
        self
    }

    /// Sets the default sleep strategy.
    #[must_use]
    pub const fn sleep_strategy(mut self, strategy: SleepStrategy) -> Self {
        self.config.sleep_strategy_default = strategy;
        self
    }

    /// Withholds an emergency reserve from non-critical allocations.
    #[must_use]
    pub const fn emergency_reserve_bytes(mut self, bytes: usize) -> Self {
        self.config.emergency_reserve_bytes = bytes;
        self
    }

    /// Sets the dispatcher thread priority.
    #[must_use]
    pub const fn dispatcher_thread_priority(mut self, priority: DispatcherPriority) -> Self {
        self.config.dispatcher_thread_priority = priority;
        self
    }

    /// Overrides the worker pool size.
    #[must_use]
    pub const fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = Some(size);
        self
    }

    /// Validates and freezes the configuration.
    pub fn build(self) -> Result<Configuration> {
        let config = self.config;
        if config.event_queue_capacity == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "event queue capacity must be nonzero",
            ));
        }
        if config.batching_enabled && (config.batch_size == 0 || config.batch_timeout_ms == 0) {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "batching requires a nonzero size and timeout",
            ));
        }
        if config.cooperative_quantum_us == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "cooperative quantum must be nonzero",
            ));
        }
        if config.pool_size == Some(0) {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "pool size must be nonzero",
            ));
        }
        config.pressure_thresholds.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Configuration::default();
        assert_eq!(config.event_queue_capacity, 2048);
        assert_eq!(config.event_overflow_policy, OverflowPolicy::DropNewest);
        assert!(!config.batching_enabled);
        assert_eq!(config.cooperative_quantum_us, 1000);
        assert_eq!(config.sleep_strategy_default, SleepStrategy::Adaptive);
        assert_eq!(config.emergency_reserve_bytes, 0);
        assert!(config.batching().is_none());
    }

    #[test]
    fn builder_roundtrip() {
        let config = Configuration::builder()
            .event_queue_capacity(512)
            .event_overflow_policy(OverflowPolicy::DropOldest)
            .batching(8, 10)
            .threading_model(ThreadingModel::Cooperative)
            .cooperative_quantum_us(500)
            .emergency_reserve_bytes(4096)
            .pool_size(2)
            .build()
            .expect("build");
        assert_eq!(config.event_queue_capacity, 512);
        assert_eq!(config.event_overflow_policy, OverflowPolicy::DropOldest);
        let batching = config.batching().expect("batching");
        assert_eq!(batching.size, 8);
        assert_eq!(batching.timeout_ns, 10_000_000);
        assert_eq!(config.threading_model, Some(ThreadingModel::Cooperative));
        assert_eq!(config.pool_size, Some(2));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            Configuration::builder()
                .event_queue_capacity(0)
                .build()
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidParameters
        );
        assert_eq!(
            Configuration::builder()
                .batching(0, 5)
                .build()
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidParameters
        );
        assert_eq!(
            Configuration::builder()
                .cooperative_quantum_us(0)
                .build()
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidParameters
        );
        assert_eq!(
            Configuration::builder()
                .pool_size(0)
                .build()
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidParameters
        );
    }

    #[test]
    fn configuration_serde_roundtrip() {
        let config = Configuration::builder()
            .batching(4, 2)
            .build()
            .expect("build");
        let json = serde_json::to_string(&config).expect("serialize");
        let back: Configuration = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, back);
    }
}
