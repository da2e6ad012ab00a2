//! Core types shared by every layer.
//!
//! Handles, capability masks, and the immutable platform descriptor. These
//! are the vocabulary of the crate: everything above L0 speaks in them.

pub mod capability;
pub mod handle;
pub mod platform;

pub use capability::{Capability, CapabilityMask, CapabilityProvider, PlatformTier};
pub use handle::{Handle, HandleKind, HandleTable, RawHandle};
pub use platform::{classify_tier, Endianness, PlatformInfo, PlatformProbe};
