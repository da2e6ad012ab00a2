//! Clock types, timestamps, and subtraction rules.
//!
//! A [`Timestamp`] remembers which clock produced it. Two timestamps are
//! subtractable only when they came from the same monotonic-class clock;
//! anything else is `IncompatibleClocks`. The realtime clock may jump, so
//! it is excluded from subtraction entirely.

use crate::error::{Error, ErrorKind, Result};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The closed set of clock sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ClockType {
    /// Never decreases; the default time base.
    Monotonic,
    /// Wall clock; may jump.
    Realtime,
    /// CPU time consumed by the process.
    Process,
    /// CPU time consumed by the calling thread.
    Thread,
    /// Finest-grained monotonic source.
    HighResolution,
    /// Monotonic, but frozen while the game is paused.
    GameTimer,
    /// Monotonic source reserved for profiling spans.
    ProfileTimer,
}

impl ClockType {
    /// True for clocks whose readings only move forward.
    #[must_use]
    pub const fn is_monotonic_class(self) -> bool {
        !matches!(self, Self::Realtime)
    }

    /// Returns the clock name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monotonic => "monotonic",
            Self::Realtime => "realtime",
            Self::Process => "process",
            Self::Thread => "thread",
            Self::HighResolution => "high-resolution",
            Self::GameTimer => "game-timer",
            Self::ProfileTimer => "profile-timer",
        }
    }
}

impl fmt::Display for ClockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Granularity a timestamp or duration is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TimePrecision {
    /// 1 ns units.
    #[default]
    Nanoseconds,
    /// 1 µs units.
    Microseconds,
    /// 1 ms units.
    Milliseconds,
    /// 10 ms units.
    Centiseconds,
    /// 1 s units.
    Seconds,
}

impl TimePrecision {
    /// Nanoseconds per unit of this precision.
    #[must_use]
    pub const fn nanos_per_unit(self) -> u64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Centiseconds => 10_000_000,
            Self::Seconds => 1_000_000_000,
        }
    }
}

/// A clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    nanos: u64,
    precision: TimePrecision,
    clock: ClockType,
}

impl Timestamp {
    /// Creates a timestamp from raw nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64, clock: ClockType) -> Self {
        Self {
            nanos,
            precision: TimePrecision::Nanoseconds,
            clock,
        }
    }

    /// Raw nanoseconds since the clock's epoch.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.nanos
    }

    /// The reading in units of the carried precision (truncated).
    #[must_use]
    pub const fn value(self) -> u64 {
        self.nanos / self.precision.nanos_per_unit()
    }

    /// The precision the reading is expressed in.
    #[must_use]
    pub const fn precision(self) -> TimePrecision {
        self.precision
    }

    /// The clock that produced this reading.
    #[must_use]
    pub const fn clock(self) -> ClockType {
        self.clock
    }

    /// Re-expresses the reading at a coarser or finer precision.
    #[must_use]
    pub const fn with_precision(mut self, precision: TimePrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Duration since `earlier`.
    ///
    /// Both readings must come from the same monotonic-class clock. The
    /// result saturates at zero, so the monotonic guarantee makes it
    /// non-negative.
    pub fn elapsed_since(self, earlier: Self) -> Result<Duration> {
        if self.clock != earlier.clock {
            return Err(Error::new(
                ErrorKind::IncompatibleClocks,
                "timestamps come from different clocks",
            ));
        }
        if !self.clock.is_monotonic_class() {
            return Err(Error::new(
                ErrorKind::IncompatibleClocks,
                "realtime readings are not subtractable",
            ));
        }
        Ok(Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}ns", self.clock, self.nanos)
    }
}
