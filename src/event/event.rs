//! Event value types.
//!
//! Events are value-typed: once enqueued, no reference escapes the
//! producer. The payload is a tagged union whose discriminant is the wire
//! `type_code`; pattern matching replaces manual tag checks. Sources are
//! interned as static strings and attributes ride in a small inline map.

use crate::error::ErrorKind;
use crate::memory::pressure::PressureLevel;
use crate::registry::record::{DriverState, InterfaceName};
use core::fmt;
use smallvec::SmallVec;

/// Event categories, used for coarse filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventCategory {
    /// Device-level events.
    Hardware = 0,
    /// Host/system events.
    System = 1,
    /// Driver lifecycle events.
    Driver = 2,
    /// Application-defined events.
    Application = 3,
    /// Performance counter events.
    Performance = 4,
    /// Resource coordination events.
    Resource = 5,
    /// Security-relevant events.
    Security = 6,
}

impl EventCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Hardware,
        Self::System,
        Self::Driver,
        Self::Application,
        Self::Performance,
        Self::Resource,
        Self::Security,
    ];

    /// Single-bit mask for category sets.
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// A set of categories.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CategorySet(pub u8);

impl CategorySet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Every category.
    pub const ALL: Self = Self(0x7F);

    /// Builds a set from a list of categories.
    #[must_use]
    pub const fn of(categories: &[EventCategory]) -> Self {
        let mut bits = 0u8;
        let mut i = 0;
        while i < categories.len() {
            bits |= categories[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// True if the set contains `category`.
    #[must_use]
    pub const fn contains(self, category: EventCategory) -> bool {
        self.0 & category.bit() != 0
    }

    /// Adds a category.
    #[must_use]
    pub const fn with(self, category: EventCategory) -> Self {
        Self(self.0 | category.bit())
    }
}

impl fmt::Debug for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CategorySet(")?;
        let mut first = true;
        for category in EventCategory::ALL {
            if self.contains(category) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{category:?}")?;
                first = false;
            }
        }
        if first {
            write!(f, "EMPTY")?;
        }
        write!(f, ")")
    }
}

/// Event severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum EventSeverity {
    /// Development diagnostics.
    Debug = 0,
    /// Routine information.
    #[default]
    Info = 1,
    /// Something degraded but handled.
    Warning = 2,
    /// An operation failed.
    Error = 3,
    /// A subsystem is in trouble.
    Critical = 4,
    /// An invariant broke; the core is surfacing it and stepping back.
    Fatal = 5,
}

impl EventSeverity {
    /// Returns the severity name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tagged event payload; the discriminant is the wire `type_code`.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// No payload.
    None,
    /// A driver changed lifecycle state.
    DriverLifecycle {
        /// Interface slot of the driver.
        interface: InterfaceName,
        /// Driver name.
        driver: &'static str,
        /// New state.
        state: DriverState,
    },
    /// Memory availability crossed a threshold or an allocation failed.
    MemoryPressure {
        /// Current pressure level.
        level: PressureLevel,
        /// Bytes still available.
        available_bytes: u64,
        /// Used fraction of total.
        pressure_ratio: f32,
    },
    /// A lease request timed out or found the region contended.
    ResourceContention {
        /// Region name.
        region: &'static str,
        /// Holders present at the time.
        holders: u32,
    },
    /// A sampled counter value.
    Counter {
        /// Counter name.
        name: &'static str,
        /// Sampled value.
        value: u64,
    },
    /// A static diagnostic message.
    Text {
        /// The message.
        message: &'static str,
    },
    /// A fatal error kind surfaced by the core.
    Fatal {
        /// The offending error kind.
        kind: ErrorKind,
    },
}

impl EventPayload {
    /// The wire discriminant of this payload.
    #[must_use]
    pub const fn type_code(&self) -> u16 {
        match self {
            Self::None => 0,
            Self::DriverLifecycle { .. } => 1,
            Self::MemoryPressure { .. } => 2,
            Self::ResourceContention { .. } => 3,
            Self::Counter { .. } => 4,
            Self::Text { .. } => 5,
            Self::Fatal { .. } => 6,
        }
    }
}

/// Attribute values for the inline event map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrValue {
    /// Unsigned integer.
    U64(u64),
    /// Signed integer.
    I64(i64),
    /// Boolean.
    Bool(bool),
    /// Static string.
    Str(&'static str),
}

/// A single event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Sequence number assigned at publish; 0 before.
    pub id: u64,
    /// Category.
    pub category: EventCategory,
    /// Severity.
    pub severity: EventSeverity,
    /// Interned source name.
    pub source: &'static str,
    /// Monotonic nanoseconds; stamped at publish when left 0.
    pub timestamp_ns: u64,
    /// Tagged payload.
    pub payload: EventPayload,
    /// Small attribute map.
    pub attrs: SmallVec<[(&'static str, AttrValue); 4]>,
}

impl Event {
    /// Creates an event; id and timestamp are stamped at publish.
    #[must_use]
    pub fn new(
        category: EventCategory,
        severity: EventSeverity,
        source: &'static str,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: 0,
            category,
            severity,
            source,
            timestamp_ns: 0,
            payload,
            attrs: SmallVec::new(),
        }
    }

    /// Attaches an attribute.
    #[must_use]
    pub fn with_attr(mut self, key: &'static str, value: AttrValue) -> Self {
        self.attrs.push((key, value));
        self
    }

    /// Looks up an attribute by key.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// The wire discriminant of the payload.
    #[must_use]
    pub const fn type_code(&self) -> u16 {
        self.payload.type_code()
    }
}
