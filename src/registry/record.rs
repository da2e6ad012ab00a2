//! Driver records and the closed interface-name set.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};
use crate::types::capability::CapabilityMask;

/// The closed set of driver interface slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum InterfaceName {
    /// Memory driver slot.
    Memory,
    /// Time driver slot.
    Time,
    /// Thread driver slot.
    Thread,
    /// Graphics driver slot.
    Graphics,
    /// Audio driver slot.
    Audio,
    /// Input driver slot.
    Input,
    /// File driver slot.
    File,
    /// Network driver slot.
    Network,
    /// Performance driver slot.
    Performance,
    /// Event driver slot.
    Event,
    /// Resource driver slot.
    Resource,
}

impl InterfaceName {
    /// Every interface, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Memory,
        Self::Time,
        Self::Thread,
        Self::Graphics,
        Self::Audio,
        Self::Input,
        Self::File,
        Self::Network,
        Self::Performance,
        Self::Event,
        Self::Resource,
    ];

    /// Returns the interface name as its short string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Time => "time",
            Self::Thread => "thread",
            Self::Graphics => "graphics",
            Self::Audio => "audio",
            Self::Input => "input",
            Self::File => "file",
            Self::Network => "network",
            Self::Performance => "performance",
            Self::Event => "event",
            Self::Resource => "resource",
        }
    }

    /// Dependency layer for shutdown ordering. Higher layers tear down
    /// first; memory and time go last.
    #[must_use]
    pub const fn layer(self) -> u8 {
        match self {
            Self::Memory | Self::Time => 0,
            Self::Thread => 1,
            Self::Event | Self::Resource => 2,
            Self::Performance => 3,
            Self::Graphics | Self::Audio | Self::Input => 4,
            Self::File | Self::Network => 5,
        }
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InterfaceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "unknown interface name"))
    }
}

/// Lifecycle states of a registered driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverState {
    /// Registered, not yet initialized.
    Registered,
    /// Initialized and bound to its interface slot.
    Active,
    /// Initialization or operation failed.
    Failed,
    /// Torn down.
    Shutdown,
}

/// Identifies a registered driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverId(pub u32);

/// Semantic version reported by a driver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SemVer {
    /// Breaking-change counter.
    pub major: u16,
    /// Feature counter.
    pub minor: u16,
    /// Fix counter.
    pub patch: u16,
}

impl SemVer {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A registered driver's bookkeeping entry.
#[derive(Debug, Clone)]
pub struct DriverRecord {
    /// Registry-assigned id.
    pub id: DriverId,
    /// Interface slot.
    pub interface: InterfaceName,
    /// Driver name; unique per interface.
    pub driver_name: &'static str,
    /// Arbitration priority; higher wins.
    pub priority: u8,
    /// Capabilities the platform must provide.
    pub required: CapabilityMask,
    /// Reported version.
    pub version: SemVer,
    /// Lifecycle state.
    pub state: DriverState,
}
