//! Core assembly: services bundle and the top-level `Hal`.
//!
//! [`CoreServices`] is the explicit context handed to every driver at
//! initialize — references to memory, time, thread, events, and resource
//! coordination. Nothing in the core is reachable through a global;
//! a driver has exactly the authority it was handed.
//!
//! [`Hal`] wires the layers together: probe → subsystems → event sinks →
//! registry. Teardown runs in reverse dependency order and collects
//! driver failures into one aggregate error without stopping early.

use crate::config::Configuration;
use crate::driver::{Driver, DriverFactory};
use crate::error::{Error, ErrorKind, Result};
use crate::event::{BusConfig, EventBus, EventSink};
use crate::memory::MemoryBroker;
use crate::registry::{DriverId, DriverRegistry, InterfaceName};
use crate::resource::ResourceCoordinator;
use crate::thread::{select_model, ThreadBroker, ThreadingModel};
use crate::time::{FrameTimer, PerfCounters, TimeSource};
use crate::types::capability::{Capability, CapabilityMask, CapabilityProvider, PlatformTier};
use crate::types::platform::{PlatformInfo, PlatformProbe};
use std::sync::Arc;
use std::time::Duration;

/// The service references a driver receives at initialize.
#[derive(Debug, Clone)]
pub struct CoreServices {
    /// Memory broker.
    pub memory: Arc<MemoryBroker>,
    /// Clock façade.
    pub time: Arc<TimeSource>,
    /// Threading façade.
    pub thread: Arc<ThreadBroker>,
    /// Event bus.
    pub events: Arc<EventBus>,
    /// Resource coordinator.
    pub resources: Arc<ResourceCoordinator>,
}

/// The assembled core.
pub struct Hal {
    platform: Arc<PlatformInfo>,
    config: Configuration,
    services: CoreServices,
    registry: DriverRegistry,
    counters: Arc<PerfCounters>,
}

impl Hal {
    /// Probes the host platform and assembles the core.
    pub fn new(config: Configuration) -> Result<Self> {
        let platform = PlatformProbe::detect().finish()?;
        Self::with_platform(platform, config)
    }

    /// Assembles the core over an explicit platform description.
    pub fn with_platform(platform: PlatformInfo, config: Configuration) -> Result<Self> {
        let model = select_model(&platform, config.threading_model)?;
        let platform = Arc::new(platform);

        let memory = Arc::new(MemoryBroker::standard_with(
            &platform,
            config.pressure_thresholds,
            config.emergency_reserve_bytes,
        )?);
        let time = Arc::new(TimeSource::for_platform(&platform));
        let thread = Arc::new(ThreadBroker::new(
            &platform,
            Some(model),
            Duration::from_micros(config.cooperative_quantum_us),
            config.pool_size,
        )?);
        let events = Arc::new(EventBus::new(BusConfig {
            capacity: config.event_queue_capacity,
            policy: config.event_overflow_policy,
            batching: config.batching(),
            dispatch_thread: model == ThreadingModel::Preemptive,
        }));
        let resources = Arc::new(ResourceCoordinator::new());

        // The bus is the only event sink; lower layers publish through it
        // without depending on it at construction time.
        let sink: Arc<dyn EventSink> = Arc::clone(&events) as Arc<dyn EventSink>;
        memory.set_event_sink(Arc::clone(&sink));
        resources.set_event_sink(Arc::clone(&sink));
        events.set_work_queue(thread.work());

        let registry = DriverRegistry::new(Arc::clone(&platform));
        registry.set_event_sink(sink);

        let services = CoreServices {
            memory,
            time,
            thread,
            events,
            resources,
        };
        tracing::info!(
            platform = %platform.platform_name,
            tier = %platform.tier,
            %model,
            "core assembled"
        );
        Ok(Self {
            platform,
            config,
            services,
            registry,
            counters: Arc::new(PerfCounters::new()),
        })
    }

    /// The probed platform.
    #[must_use]
    pub fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    /// The frozen configuration.
    #[must_use]
    pub const fn config(&self) -> &Configuration {
        &self.config
    }

    /// The service bundle drivers receive.
    #[must_use]
    pub const fn services(&self) -> &CoreServices {
        &self.services
    }

    /// The driver registry.
    #[must_use]
    pub const fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// The performance counter ring.
    #[must_use]
    pub fn counters(&self) -> Arc<PerfCounters> {
        Arc::clone(&self.counters)
    }

    /// Creates a frame timer over the core's clock.
    #[must_use]
    pub fn frame_timer(&self) -> FrameTimer {
        FrameTimer::new(Arc::clone(&self.services.time))
    }

    /// Registers a driver factory.
    pub fn register_driver(&self, factory: Arc<dyn DriverFactory>) -> Result<DriverId> {
        self.registry.register(factory)
    }

    /// Activates the best driver for an interface.
    pub fn activate(&self, interface: InterfaceName) -> Result<Arc<dyn Driver>> {
        self.registry.activate(interface, &self.services)
    }

    /// Drains and dispatches up to `max_events` queued events.
    ///
    /// Required on non-preemptive models; on preemptive ones the dispatch
    /// thread does this continuously.
    pub fn pump_events(&self, max_events: usize) -> usize {
        self.services.events.pump(max_events)
    }

    /// Runs cooperative work for one quantum.
    pub fn tick(&self) -> usize {
        self.services.thread.tick()
    }

    /// Sleeps with the configured default strategy.
    pub fn sleep(&self, duration: Duration) {
        self.services
            .time
            .sleep(duration, self.config.sleep_strategy_default);
    }

    /// Tears the core down: drivers (reverse dependency order), then the
    /// event bus, then the thread broker. Failures are collected; nothing
    /// is skipped.
    pub fn shutdown_all(&self) -> Result<()> {
        let mut first_failure: Option<Error> = None;
        let mut note = |result: Result<()>| {
            if let Err(e) = result {
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        };
        note(self.registry.shutdown_all());
        note(self.services.events.shutdown());
        note(self.services.thread.shutdown());
        match first_failure {
            None => Ok(()),
            Some(cause) => Err(Error::new(
                ErrorKind::DeviceError,
                "core shutdown reported failures",
            )
            .with_operation("shutdown_all")
            .with_cause(cause)),
        }
    }
}

impl CapabilityProvider for Hal {
    fn supports(&self, cap: Capability) -> bool {
        self.registry.supports(cap)
    }

    fn mask(&self) -> CapabilityMask {
        let mut mask = self.platform.capabilities;
        for interface in self.registry.active_interfaces() {
            if let Ok(driver) = self.registry.get(interface) {
                mask = mask.union(driver.capabilities());
            }
        }
        mask
    }

    fn tier(&self) -> PlatformTier {
        self.platform.tier
    }

    fn has_fallback(&self, cap: Capability) -> bool {
        self.registry.has_fallback(cap)
    }
}

impl core::fmt::Debug for Hal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hal")
            .field("platform", &self.platform.platform_name)
            .field("tier", &self.platform.tier)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::record::{DriverState, SemVer};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NullDriver {
        caps: CapabilityMask,
        fail_init: bool,
        initialized: AtomicBool,
    }

    impl Driver for NullDriver {
        fn initialize(&self, _platform: &PlatformInfo, _services: &CoreServices) -> Result<()> {
            if self.fail_init {
                return Err(Error::new(ErrorKind::DeviceError, "probe failed"));
            }
            self.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown(&self) -> Result<()> {
            Ok(())
        }

        fn capabilities(&self) -> CapabilityMask {
            self.caps
        }

        fn version(&self) -> SemVer {
            SemVer::new(1, 0, 0)
        }
    }

    struct NullFactory {
        interface: InterfaceName,
        name: &'static str,
        priority: u8,
        required: CapabilityMask,
        caps: CapabilityMask,
        fail_init: bool,
    }

    impl DriverFactory for NullFactory {
        fn interface(&self) -> InterfaceName {
            self.interface
        }

        fn driver_name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        fn required_capabilities(&self) -> CapabilityMask {
            self.required
        }

        fn create(&self) -> Arc<dyn Driver> {
            Arc::new(NullDriver {
                caps: self.caps,
                fail_init: self.fail_init,
                initialized: AtomicBool::new(false),
            })
        }
    }

    fn minimal_hal() -> Hal {
        let platform = PlatformProbe::minimal().finish().expect("probe");
        Hal::with_platform(platform, Configuration::default()).expect("hal")
    }

    fn audio_factory(
        name: &'static str,
        priority: u8,
        required: CapabilityMask,
    ) -> Arc<dyn DriverFactory> {
        Arc::new(NullFactory {
            interface: InterfaceName::Audio,
            name,
            priority,
            required,
            caps: required,
            fail_init: false,
        })
    }

    #[test]
    fn assembly_on_every_preset() {
        for platform in [
            PlatformProbe::minimal().finish().expect("probe"),
            PlatformProbe::limited().finish().expect("probe"),
            PlatformProbe::detect().finish().expect("probe"),
        ] {
            let hal = Hal::with_platform(platform, Configuration::default()).expect("hal");
            hal.shutdown_all().expect("shutdown");
        }
    }

    #[test]
    fn arbitration_skips_unsatisfied_candidates() {
        let hal = minimal_hal();
        hal.register_driver(audio_factory(
            "hw_dsp_driver",
            200,
            CapabilityMask::of(&[Capability::HardwareDsp]),
        ))
        .expect("register");
        hal.register_driver(audio_factory("sw_mixer", 50, CapabilityMask::EMPTY))
            .expect("register");

        hal.activate(InterfaceName::Audio).expect("activate");
        let records = hal.registry().list(InterfaceName::Audio);
        let active: Vec<_> = records
            .iter()
            .filter(|r| r.state == DriverState::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].driver_name, "sw_mixer");
    }

    #[test]
    fn failed_candidate_falls_through() {
        let hal = minimal_hal();
        hal.register_driver(Arc::new(NullFactory {
            interface: InterfaceName::Audio,
            name: "flaky",
            priority: 200,
            required: CapabilityMask::EMPTY,
            caps: CapabilityMask::EMPTY,
            fail_init: true,
        }))
        .expect("register");
        hal.register_driver(audio_factory("steady", 10, CapabilityMask::EMPTY))
            .expect("register");

        hal.activate(InterfaceName::Audio).expect("activate");
        let records = hal.registry().list(InterfaceName::Audio);
        let by_name = |name: &str| {
            records
                .iter()
                .find(|r| r.driver_name == name)
                .expect("record")
                .state
        };
        assert_eq!(by_name("flaky"), DriverState::Failed);
        assert_eq!(by_name("steady"), DriverState::Active);
    }

    #[test]
    fn no_candidates_is_no_suitable_driver() {
        let hal = minimal_hal();
        let err = hal.activate(InterfaceName::Network).map(|_| ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuitableDriver);
    }

    #[test]
    fn duplicate_registration_rejected_until_shutdown() {
        let hal = minimal_hal();
        hal.register_driver(audio_factory("sw_mixer", 50, CapabilityMask::EMPTY))
            .expect("register");
        assert_eq!(
            hal.register_driver(audio_factory("sw_mixer", 50, CapabilityMask::EMPTY))
                .unwrap_err()
                .kind(),
            ErrorKind::Duplicate
        );

        // register → shutdown → register succeeds.
        hal.activate(InterfaceName::Audio).expect("activate");
        hal.registry().shutdown(InterfaceName::Audio).expect("shutdown");
        hal.register_driver(audio_factory("sw_mixer", 50, CapabilityMask::EMPTY))
            .expect("re-register after shutdown");
    }

    #[test]
    fn active_driver_is_unique_and_o1() {
        let hal = minimal_hal();
        hal.register_driver(audio_factory("a", 10, CapabilityMask::EMPTY))
            .expect("register");
        hal.register_driver(audio_factory("b", 10, CapabilityMask::EMPTY))
            .expect("register");
        let first = hal.activate(InterfaceName::Audio).expect("activate");
        let second = hal.activate(InterfaceName::Audio).expect("idempotent");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(hal.registry().active_interfaces(), vec![InterfaceName::Audio]);
        // Lexicographic tie-break on equal priority.
        let records = hal.registry().list(InterfaceName::Audio);
        let active = records
            .iter()
            .find(|r| r.state == DriverState::Active)
            .expect("active");
        assert_eq!(active.driver_name, "a");
    }

    #[test]
    fn shutdown_all_is_idempotent() {
        let hal = minimal_hal();
        hal.register_driver(audio_factory("sw_mixer", 50, CapabilityMask::EMPTY))
            .expect("register");
        hal.activate(InterfaceName::Audio).expect("activate");
        hal.shutdown_all().expect("first shutdown");
        hal.shutdown_all().expect("second shutdown is a no-op");
    }

    #[test]
    fn capability_union_includes_active_drivers() {
        let hal = minimal_hal();
        assert!(!hal.supports(Capability::MultiChannelAudio));
        hal.register_driver(Arc::new(NullFactory {
            interface: InterfaceName::Audio,
            name: "mixer",
            priority: 1,
            required: CapabilityMask::EMPTY,
            caps: CapabilityMask::of(&[Capability::MultiChannelAudio]),
            fail_init: false,
        }))
        .expect("register");
        hal.activate(InterfaceName::Audio).expect("activate");
        assert!(hal.supports(Capability::MultiChannelAudio));
        assert!(hal.mask().contains(Capability::MultiChannelAudio));
    }

    #[test]
    fn lifecycle_events_reach_subscribers() {
        use crate::event::{DeliveryMode, EventCategory, EventFilter};
        use parking_lot::Mutex;

        let hal = minimal_hal();
        let states = Arc::new(Mutex::new(Vec::new()));
        let states2 = Arc::clone(&states);
        hal.services().events.subscribe(
            EventFilter::any().category(EventCategory::Driver),
            DeliveryMode::Sync,
            move |batch| {
                for event in batch {
                    if let crate::event::EventPayload::DriverLifecycle { state, .. } =
                        &event.payload
                    {
                        states2.lock().push(*state);
                    }
                }
            },
        );
        hal.register_driver(audio_factory("sw_mixer", 50, CapabilityMask::EMPTY))
            .expect("register");
        hal.activate(InterfaceName::Audio).expect("activate");
        hal.registry().shutdown(InterfaceName::Audio).expect("shutdown");
        hal.pump_events(64);
        assert_eq!(
            *states.lock(),
            vec![DriverState::Active, DriverState::Shutdown]
        );
    }
}
