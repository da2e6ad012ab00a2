//! Execution model selection.
//!
//! The façade degrades across four models. The model is chosen once at
//! initialize time — from the platform's core count and capabilities, or an
//! explicit override — and is immutable afterwards.

use crate::error::{Error, ErrorKind, Result};
use crate::types::capability::Capability;
use crate::types::platform::PlatformInfo;
use core::fmt;
use serde::{Deserialize, Serialize};

/// The four execution models, weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ThreadingModel {
    /// One context; blocking primitives are unavailable.
    SingleThreaded = 0,
    /// One context with explicit yield points; primitives never block.
    Cooperative = 1,
    /// Isolated workers without shared blocking primitives.
    WebWorkers = 2,
    /// Real OS threads with standard primitive semantics.
    Preemptive = 3,
}

impl ThreadingModel {
    /// Returns the model name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SingleThreaded => "single-threaded",
            Self::Cooperative => "cooperative",
            Self::WebWorkers => "web-workers",
            Self::Preemptive => "preemptive",
        }
    }

    /// True if primitives may block the calling context.
    #[must_use]
    pub const fn may_block(self) -> bool {
        matches!(self, Self::Preemptive)
    }
}

impl fmt::Display for ThreadingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Picks the execution model for a platform.
///
/// An explicit override wins if the platform can honor it; otherwise the
/// platform's core count and threading capability decide.
pub fn select_model(
    platform: &PlatformInfo,
    requested: Option<ThreadingModel>,
) -> Result<ThreadingModel> {
    let threading = platform.capabilities.contains(Capability::Threading);
    if let Some(model) = requested {
        let ok = match model {
            ThreadingModel::SingleThreaded | ThreadingModel::Cooperative => true,
            ThreadingModel::WebWorkers => {
                platform.arch.starts_with("wasm")
                    || platform.capabilities.contains(Capability::SharedMemory)
            }
            ThreadingModel::Preemptive => threading,
        };
        return if ok {
            Ok(model)
        } else {
            Err(Error::new(
                ErrorKind::FeatureNotSupported,
                "requested threading model is unavailable on this platform",
            )
            .with_operation("select_model"))
        };
    }
    let model = if platform.arch.starts_with("wasm") {
        if threading {
            ThreadingModel::WebWorkers
        } else {
            ThreadingModel::SingleThreaded
        }
    } else if threading && platform.cpu_cores > 1 {
        ThreadingModel::Preemptive
    } else if threading {
        ThreadingModel::Cooperative
    } else {
        ThreadingModel::SingleThreaded
    };
    tracing::debug!(%model, cores = platform.cpu_cores, "threading model selected");
    Ok(model)
}
