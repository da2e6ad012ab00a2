//! Halcyon: capability-secure, platform-adaptive hardware abstraction core.
//!
//! # Overview
//!
//! Halcyon is the kernel that binds device drivers together for a
//! component runtime that has to run everywhere — from a 16 MB single-core
//! console to a modern many-core desktop. The value is not any one driver
//! but the contracts between them: a registry with capability-based
//! discovery and graceful degradation, arbitration of shared hardware
//! regions with structural deadlock avoidance, a multi-strategy memory
//! broker with pressure management, a lock-free event bus, and threading
//! and timing façades that degrade across execution models without
//! changing their API.
//!
//! # Core Guarantees
//!
//! - **No ambient authority**: drivers receive [`CoreServices`] at
//!   initialize; nothing is reachable through a global
//! - **No use-after-free across the API**: resources are denoted by
//!   generation-counted handles; stale handles fail with `InvalidHandle`
//! - **Structural deadlock avoidance**: region leases obey a fixed rank
//!   order, enforced at acquire time
//! - **Graceful degradation**: unsupported capabilities surface as
//!   `FeatureNotSupported` unless a software fallback is registered
//! - **One error taxonomy**: every fallible operation returns the same
//!   typed [`Result`]
//! - **Deterministic testing**: every clock-dependent component runs
//!   against a manual time base
//!
//! # Module Structure
//!
//! - [`types`]: handles, capability masks, the platform descriptor
//! - [`error`](mod@error): the closed error taxonomy
//! - [`config`]: immutable builder-built configuration
//! - [`memory`]: allocator strategies, regions, pressure, statistics
//! - [`time`]: clocks, frame timer, sleep strategies, counters
//! - [`thread`]: execution models, primitives, work queue, pool
//! - [`registry`]: driver records, arbitration, lifecycle
//! - [`resource`]: ranked leases over shared hardware regions
//! - [`event`]: ring, filters, subscriptions, sources, dispatch
//! - [`driver`]: the plug-in contracts
//! - [`services`]: `CoreServices` and the top-level assembly

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod memory;
pub mod registry;
pub mod resource;
pub mod services;
pub mod thread;
pub mod time;
pub mod types;

pub use config::{Configuration, ConfigurationBuilder, DispatcherPriority};
pub use driver::{Driver, DriverFactory, Extension, ExtensionId};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use event::{
    AttrValue, BatchPolicy, CategorySet, DeliveryMode, Event, EventBus, EventCategory,
    EventFilter, EventPayload, EventSeverity, EventSink, OverflowPolicy, SubscriptionId,
};
pub use memory::{
    Allocation, AllocationRequest, AllocatorKind, MemoryBroker, MemoryFlags, MemoryType,
    PressureInfo, PressureLevel,
};
pub use registry::{DriverId, DriverRegistry, DriverState, InterfaceName, SemVer};
pub use resource::{HolderId, Lease, LeaseMode, ResourceCoordinator};
pub use services::{CoreServices, Hal};
pub use thread::{ThreadBroker, ThreadingModel, WorkItem, WorkPriority, WorkQueue};
pub use time::{ClockType, FrameTimer, SleepStrategy, TimeSource, Timestamp};
pub use types::{
    Capability, CapabilityMask, CapabilityProvider, Handle, PlatformInfo, PlatformProbe,
    PlatformTier,
};
