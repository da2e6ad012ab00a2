//! Driver plug-in contracts.
//!
//! A driver arrives as a [`DriverFactory`]: cheap metadata (interface,
//! name, priority, required capabilities) plus a constructor. The registry
//! instantiates the factory only when the driver wins arbitration, and the
//! instance receives its [`CoreServices`] — memory, time, thread, events,
//! resources — at initialize. There is no ambient authority: a driver can
//! reach exactly the services it was handed.
//!
//! Platform-specific surfaces (a DSP block, a removable-media display)
//! hang off a driver through the typed extension lookup rather than the
//! shared interface contract; the core only defines the lookup.

use crate::error::{Error, ErrorKind, Result};
use crate::registry::record::{InterfaceName, SemVer};
use crate::services::CoreServices;
use crate::types::capability::CapabilityMask;
use crate::types::platform::PlatformInfo;
use std::any::Any;
use std::sync::Arc;

/// Constant identifier for a driver-local extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionId(pub &'static str);

/// A driver-local extension object, retrieved by [`Driver::extension`].
pub trait Extension: Send + Sync {
    /// Upcast for typed downcasting at the call site.
    fn as_any(&self) -> &dyn Any;
}

/// The contract every driver instance satisfies.
pub trait Driver: Send + Sync {
    /// Binds the driver to the platform and its services.
    ///
    /// Fallback paths for advertised capabilities are prepared here, so no
    /// active-path operation has to allocate for them later.
    fn initialize(&self, platform: &PlatformInfo, services: &CoreServices) -> Result<()>;

    /// Releases everything the driver holds.
    fn shutdown(&self) -> Result<()>;

    /// Capabilities this instance advertises.
    ///
    /// A capability may only appear here if the hardware exists or a
    /// software fallback was prepared.
    fn capabilities(&self) -> CapabilityMask;

    /// Reported version.
    fn version(&self) -> SemVer;

    /// Looks up a driver-local extension.
    fn extension(&self, _id: ExtensionId) -> Option<Arc<dyn Extension>> {
        None
    }
}

/// Retrieves a typed extension from a driver.
///
/// Fails with `FeatureNotSupported` when the driver does not provide the
/// extension, and `InvalidParameters` when it provides it under a
/// different type.
pub fn typed_extension<T: Any + Send + Sync>(
    driver: &dyn Driver,
    id: ExtensionId,
) -> Result<Arc<dyn Extension>> {
    let ext = driver.extension(id).ok_or_else(|| {
        Error::new(ErrorKind::FeatureNotSupported, "extension not provided")
    })?;
    if ext.as_any().is::<T>() {
        Ok(ext)
    } else {
        Err(Error::new(
            ErrorKind::InvalidParameters,
            "extension has a different type",
        ))
    }
}

/// Metadata plus constructor for a driver.
pub trait DriverFactory: Send + Sync {
    /// Interface slot this driver fills.
    fn interface(&self) -> InterfaceName;

    /// Driver name; unique within the interface.
    fn driver_name(&self) -> &'static str;

    /// Arbitration priority; higher wins, names break ties.
    fn priority(&self) -> u8 {
        100
    }

    /// Capabilities the platform must provide for this driver to be a
    /// candidate.
    fn required_capabilities(&self) -> CapabilityMask {
        CapabilityMask::EMPTY
    }

    /// Version the instance will report.
    fn version(&self) -> SemVer {
        SemVer::new(0, 1, 0)
    }

    /// Builds an instance. Called only after arbitration selects this
    /// factory.
    fn create(&self) -> Arc<dyn Driver>;
}
