//! Crate-wide error type and the closed error taxonomy.
//!
//! Every fallible operation in the crate returns [`Result<T>`], carrying an
//! [`Error`] built from one of the closed set of [`ErrorKind`]s. Errors are
//! cheap to construct: the message is a borrowed static string and the
//! optional context fields are static names, so nothing on the hot path
//! allocates. A boxed `cause` may be attached when wrapping a lower-level
//! failure; that happens off the hot path, at the point the error is built.
//!
//! # Fatal errors
//!
//! [`ErrorKind::LockOrderViolation`] and [`ErrorKind::InternalError`] are
//! fatal: the core publishes a `Fatal`-severity event when one is produced
//! and then surfaces the error to the caller. The core itself never panics.

use core::fmt;

/// The closed set of error kinds produced by the core.
///
/// Drivers and embedders match on this; new kinds are not added outside a
/// major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[repr(u8)]
pub enum ErrorKind {
    /// Allocation failed after all fallback routes were exhausted.
    #[error("out of memory")]
    OutOfMemory,
    /// The operation requires a capability the platform does not provide
    /// and no software fallback is registered.
    #[error("feature not supported")]
    FeatureNotSupported,
    /// An argument was outside the documented domain.
    #[error("invalid parameters")]
    InvalidParameters,
    /// A handle referred to a destroyed or reused slot.
    #[error("invalid handle")]
    InvalidHandle,
    /// The operation is not legal in the current lifecycle state.
    #[error("invalid state")]
    InvalidState,
    /// A bounded wait expired before the operation could complete.
    #[error("timed out")]
    Timeout,
    /// The operation would have suspended and the caller forbade that.
    #[error("would block")]
    WouldBlock,
    /// The entity is already registered.
    #[error("duplicate registration")]
    Duplicate,
    /// No entity with the given name or id exists.
    #[error("not found")]
    NotFound,
    /// A lease was requested out of rank order. Fatal.
    #[error("lock order violation")]
    LockOrderViolation,
    /// The resource is held in a conflicting mode.
    #[error("contended")]
    Contended,
    /// No registered driver satisfies the platform's capabilities.
    #[error("no suitable driver")]
    NoSuitableDriver,
    /// The underlying device reported a failure.
    #[error("device error")]
    DeviceError,
    /// The host platform reported a failure.
    #[error("platform error")]
    PlatformError,
    /// Two timestamps from different clock sources were subtracted.
    #[error("incompatible clocks")]
    IncompatibleClocks,
    /// The requested alignment is outside the supported set.
    #[error("unsupported alignment")]
    UnsupportedAlignment,
    /// A submitted work graph contained a dependency cycle.
    #[error("cyclic dependency")]
    CyclicDependency,
    /// The operation was cancelled before completion.
    #[error("cancelled")]
    Cancelled,
    /// An internal invariant was violated. Fatal.
    #[error("internal error")]
    InternalError,
}

impl ErrorKind {
    /// Returns the kind name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OutOfMemory => "OutOfMemory",
            Self::FeatureNotSupported => "FeatureNotSupported",
            Self::InvalidParameters => "InvalidParameters",
            Self::InvalidHandle => "InvalidHandle",
            Self::InvalidState => "InvalidState",
            Self::Timeout => "Timeout",
            Self::WouldBlock => "WouldBlock",
            Self::Duplicate => "Duplicate",
            Self::NotFound => "NotFound",
            Self::LockOrderViolation => "LockOrderViolation",
            Self::Contended => "Contended",
            Self::NoSuitableDriver => "NoSuitableDriver",
            Self::DeviceError => "DeviceError",
            Self::PlatformError => "PlatformError",
            Self::IncompatibleClocks => "IncompatibleClocks",
            Self::UnsupportedAlignment => "UnsupportedAlignment",
            Self::CyclicDependency => "CyclicDependency",
            Self::Cancelled => "Cancelled",
            Self::InternalError => "InternalError",
        }
    }

    /// True for kinds that indicate a broken invariant rather than a
    /// recoverable condition.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::LockOrderViolation | Self::InternalError)
    }
}

/// An error produced by the core.
///
/// Carries the kind, a static message, and optional context naming the
/// operation and driver involved. Context is attached with the builder
/// methods or via [`ResultExt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
    operation: Option<&'static str>,
    driver: Option<&'static str>,
    cause: Option<Box<Error>>,
}

impl Error {
    /// Creates an error with an explicit message.
    #[must_use]
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            message,
            operation: None,
            driver: None,
            cause: None,
        }
    }

    /// Attaches the name of the failing operation.
    #[must_use]
    pub const fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Attaches the name of the driver that produced the error.
    #[must_use]
    pub const fn with_driver(mut self, driver: &'static str) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: Self) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the static message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// Returns the operation name, if attached.
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        self.operation
    }

    /// Returns the driver name, if attached.
    #[must_use]
    pub const fn driver(&self) -> Option<&'static str> {
        self.driver
    }

    /// Returns the underlying cause, if attached.
    #[must_use]
    pub fn cause(&self) -> Option<&Self> {
        self.cause.as_deref()
    }

    /// True if this error's kind is fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind, "")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        match (self.operation, self.driver) {
            (Some(op), Some(drv)) => write!(f, " (op={op}, driver={drv})")?,
            (Some(op), None) => write!(f, " (op={op})")?,
            (None, Some(drv)) => write!(f, " (driver={drv})")?,
            (None, None) => {}
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Result type used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for attaching context to results as they propagate.
pub trait ResultExt<T> {
    /// Attaches the operation name to the error, if any.
    fn op(self, operation: &'static str) -> Result<T>;

    /// Attaches the driver name to the error, if any.
    fn driver(self, driver: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn op(self, operation: &'static str) -> Result<T> {
        self.map_err(|e| e.with_operation(operation))
    }

    fn driver(self, driver: &'static str) -> Result<T> {
        self.map_err(|e| e.with_driver(driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::new(ErrorKind::OutOfMemory, "arena exhausted");
        assert_eq!(format!("{err}"), "out of memory: arena exhausted");
    }

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::FeatureNotSupported, "no hardware dsp")
            .with_operation("create_effect")
            .with_driver("sw_mixer");
        let rendered = format!("{err}");
        assert!(rendered.contains("op=create_effect"), "{rendered}");
        assert!(rendered.contains("driver=sw_mixer"), "{rendered}");
    }

    #[test]
    fn display_without_message() {
        let err = Error::from(ErrorKind::Timeout);
        assert_eq!(format!("{err}"), "timed out");
    }

    #[test]
    fn cause_chain_via_source() {
        use std::error::Error as _;
        let inner = Error::new(ErrorKind::DeviceError, "bus fault");
        let outer = Error::new(ErrorKind::PlatformError, "probe failed").with_cause(inner.clone());
        assert_eq!(outer.cause(), Some(&inner));
        assert!(outer.source().is_some());
    }

    #[test]
    fn fatal_kinds() {
        assert!(ErrorKind::LockOrderViolation.is_fatal());
        assert!(ErrorKind::InternalError.is_fatal());
        assert!(!ErrorKind::OutOfMemory.is_fatal());
        assert!(!ErrorKind::Timeout.is_fatal());
    }

    #[test]
    fn result_ext_attaches_context() {
        let res: Result<()> = Err(Error::new(ErrorKind::NotFound, "no such region"));
        let res = res.op("acquire").driver("video");
        let err = res.unwrap_err();
        assert_eq!(err.operation(), Some("acquire"));
        assert_eq!(err.driver(), Some("video"));
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(ErrorKind::OutOfMemory.as_str(), "OutOfMemory");
        assert_eq!(ErrorKind::CyclicDependency.as_str(), "CyclicDependency");
        assert_eq!(ErrorKind::IncompatibleClocks.as_str(), "IncompatibleClocks");
    }

    #[test]
    fn error_equality_ignores_nothing() {
        let a = Error::new(ErrorKind::Contended, "shared holders present");
        let b = Error::new(ErrorKind::Contended, "shared holders present");
        assert_eq!(a, b);
        let c = a.clone().with_driver("audio");
        assert_ne!(a, c);
    }
}
