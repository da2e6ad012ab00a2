//! Driver registry: interface-name lookup, priority arbitration,
//! lifecycle.
//!
//! Each interface slot binds at most one Active driver. Activation walks
//! the registered candidates whose required capabilities the platform
//! satisfies, highest priority first (names break ties lexicographically),
//! and falls through to the next candidate when initialization fails. The
//! registry publishes lifecycle events for every transition and tears
//! drivers down in reverse dependency order.

pub mod record;

pub use record::{DriverId, DriverRecord, DriverState, InterfaceName, SemVer};

use crate::driver::{Driver, DriverFactory};
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::event::{Event, EventCategory, EventPayload, EventSeverity, EventSink};
use crate::services::CoreServices;
use crate::types::capability::{Capability, CapabilityProvider};
use crate::types::platform::PlatformInfo;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct RecordSlot {
    record: DriverRecord,
    factory: Arc<dyn DriverFactory>,
    instance: Option<Arc<dyn Driver>>,
}

#[derive(Default)]
struct RegistryInner {
    slots: Vec<RecordSlot>,
    active: HashMap<InterfaceName, usize>,
}

/// The driver registry.
pub struct DriverRegistry {
    platform: Arc<PlatformInfo>,
    inner: RwLock<RegistryInner>,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
}

impl DriverRegistry {
    /// Creates an empty registry over a probed platform.
    #[must_use]
    pub fn new(platform: Arc<PlatformInfo>) -> Self {
        Self {
            platform,
            inner: RwLock::new(RegistryInner::default()),
            sink: RwLock::new(None),
        }
    }

    /// Wires the event sink for lifecycle events.
    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.write() = Some(sink);
    }

    fn publish_lifecycle(&self, interface: InterfaceName, driver: &'static str, state: DriverState) {
        let severity = match state {
            DriverState::Failed => EventSeverity::Error,
            _ => EventSeverity::Info,
        };
        if let Some(sink) = self.sink.read().as_ref() {
            sink.publish(Event::new(
                EventCategory::Driver,
                severity,
                "driver-registry",
                EventPayload::DriverLifecycle {
                    interface,
                    driver,
                    state,
                },
            ));
        }
    }

    /// Registers a driver factory.
    ///
    /// Registration is idempotent on `{interface, driver_name}` over a
    /// driver's lifetime: a live record with the same pair is `Duplicate`,
    /// but a `Shutdown` record does not block re-registration.
    pub fn register(&self, factory: Arc<dyn DriverFactory>) -> Result<DriverId> {
        let interface = factory.interface();
        let name = factory.driver_name();
        let mut inner = self.inner.write();
        if inner.slots.iter().any(|slot| {
            slot.record.interface == interface
                && slot.record.driver_name == name
                && slot.record.state != DriverState::Shutdown
        }) {
            return Err(Error::new(ErrorKind::Duplicate, "driver already registered")
                .with_driver(name)
                .with_operation("register"));
        }
        let id = DriverId(u32::try_from(inner.slots.len()).unwrap_or(u32::MAX) + 1);
        let record = DriverRecord {
            id,
            interface,
            driver_name: name,
            priority: factory.priority(),
            required: factory.required_capabilities(),
            version: factory.version(),
            state: DriverState::Registered,
        };
        tracing::debug!(interface = %interface, driver = name, "driver registered");
        inner.slots.push(RecordSlot {
            record,
            factory,
            instance: None,
        });
        Ok(id)
    }

    /// Activates the best candidate for an interface.
    ///
    /// Returns the already-Active driver if one is bound. Candidates whose
    /// initialization fails transition to `Failed` and the next candidate
    /// is tried; when none succeed the result is `NoSuitableDriver`.
    pub fn activate(
        &self,
        interface: InterfaceName,
        services: &CoreServices,
    ) -> Result<Arc<dyn Driver>> {
        if let Ok(active) = self.get(interface) {
            return Ok(active);
        }
        let candidates: Vec<(usize, &'static str)> = {
            let inner = self.inner.read();
            let mut candidates: Vec<(usize, u8, &'static str)> = inner
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| {
                    slot.record.interface == interface
                        && slot.record.state == DriverState::Registered
                        && self
                            .platform
                            .capabilities
                            .contains_all(slot.record.required)
                })
                .map(|(i, slot)| (i, slot.record.priority, slot.record.driver_name))
                .collect();
            candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(b.2)));
            candidates.into_iter().map(|(i, _, name)| (i, name)).collect()
        };

        for (index, name) in candidates {
            let factory = {
                let inner = self.inner.read();
                Arc::clone(&inner.slots[index].factory)
            };
            let driver = factory.create();
            match driver.initialize(&self.platform, services) {
                Ok(()) => {
                    let mut inner = self.inner.write();
                    inner.slots[index].record.state = DriverState::Active;
                    inner.slots[index].instance = Some(Arc::clone(&driver));
                    inner.active.insert(interface, index);
                    drop(inner);
                    tracing::info!(interface = %interface, driver = name, "driver active");
                    self.publish_lifecycle(interface, name, DriverState::Active);
                    return Ok(driver);
                }
                Err(e) => {
                    let mut inner = self.inner.write();
                    inner.slots[index].record.state = DriverState::Failed;
                    drop(inner);
                    tracing::warn!(
                        interface = %interface,
                        driver = name,
                        error = %e,
                        "driver initialization failed, trying next candidate"
                    );
                    self.publish_lifecycle(interface, name, DriverState::Failed);
                }
            }
        }
        Err(Error::new(
            ErrorKind::NoSuitableDriver,
            "no registered driver satisfies this platform",
        )
        .with_operation("activate"))
    }

    /// The Active driver for an interface.
    pub fn get(&self, interface: InterfaceName) -> Result<Arc<dyn Driver>> {
        let inner = self.inner.read();
        inner
            .active
            .get(&interface)
            .and_then(|&index| inner.slots[index].instance.clone())
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound, "no active driver for interface")
                    .with_operation("get")
            })
    }

    /// Shuts down the Active driver for an interface. Idempotent.
    pub fn shutdown(&self, interface: InterfaceName) -> Result<()> {
        let (driver, index, name) = {
            let mut inner = self.inner.write();
            let Some(index) = inner.active.remove(&interface) else {
                return Ok(());
            };
            let slot = &mut inner.slots[index];
            let name = slot.record.driver_name;
            let Some(driver) = slot.instance.take() else {
                return Ok(());
            };
            (driver, index, name)
        };
        let result = driver.shutdown();
        {
            let mut inner = self.inner.write();
            inner.slots[index].record.state = DriverState::Shutdown;
        }
        tracing::info!(interface = %interface, driver = name, "driver shut down");
        self.publish_lifecycle(interface, name, DriverState::Shutdown);
        result.driver(name)
    }

    /// Shuts every Active driver down, highest layer first.
    ///
    /// Failures are collected; every driver is still torn down.
    pub fn shutdown_all(&self) -> Result<()> {
        let mut interfaces: Vec<InterfaceName> = {
            let inner = self.inner.read();
            inner.active.keys().copied().collect()
        };
        interfaces.sort_by_key(|name| core::cmp::Reverse((name.layer(), *name)));
        let mut first_failure: Option<Error> = None;
        let mut failures = 0u32;
        for interface in interfaces {
            if let Err(e) = self.shutdown(interface) {
                failures += 1;
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
        match first_failure {
            None => Ok(()),
            Some(cause) => {
                tracing::error!(failures, "driver shutdown reported failures");
                Err(Error::new(
                    ErrorKind::DeviceError,
                    "one or more drivers failed to shut down",
                )
                .with_operation("shutdown_all")
                .with_cause(cause))
            }
        }
    }

    /// True if the platform or any Active driver advertises `cap`.
    #[must_use]
    pub fn supports(&self, cap: Capability) -> bool {
        if self.platform.supports(cap) {
            return true;
        }
        let inner = self.inner.read();
        inner
            .active
            .values()
            .filter_map(|&index| inner.slots[index].instance.as_ref())
            .any(|driver| driver.capabilities().contains(cap))
    }

    /// True if a software fallback exists for `cap`.
    #[must_use]
    pub fn has_fallback(&self, cap: Capability) -> bool {
        self.platform.has_fallback(cap)
    }

    /// Records registered for an interface, for diagnostics.
    #[must_use]
    pub fn list(&self, interface: InterfaceName) -> Vec<DriverRecord> {
        self.inner
            .read()
            .slots
            .iter()
            .filter(|slot| slot.record.interface == interface)
            .map(|slot| slot.record.clone())
            .collect()
    }

    /// Interfaces with an Active driver.
    #[must_use]
    pub fn active_interfaces(&self) -> Vec<InterfaceName> {
        let mut names: Vec<InterfaceName> = self.inner.read().active.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Current state of a registered driver.
    pub fn driver_state(&self, id: DriverId) -> Result<DriverState> {
        self.inner
            .read()
            .slots
            .iter()
            .find(|slot| slot.record.id == id)
            .map(|slot| slot.record.state)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such driver"))
    }
}

impl core::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("DriverRegistry")
            .field("registered", &inner.slots.len())
            .field("active", &inner.active.len())
            .finish()
    }
}
