//! Sleep strategies.
//!
//! Four ways to wait, trading CPU for precision:
//!
//! - **Busy** spins; precision is clock resolution.
//! - **Yield** loops on a cooperative yield.
//! - **Block** hands the wait to the host; coarse.
//! - **Adaptive** picks by requested duration: busy under 50 µs, yield
//!   under 500 µs, block otherwise.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Threshold below which adaptive sleeping spins.
pub const ADAPTIVE_BUSY_LIMIT: Duration = Duration::from_micros(50);

/// Threshold below which adaptive sleeping yields.
pub const ADAPTIVE_YIELD_LIMIT: Duration = Duration::from_micros(500);

/// How a sleep waits out its duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SleepStrategy {
    /// Spin until the target.
    Busy,
    /// Yield in a loop until the target.
    Yield,
    /// Block on the host primitive.
    Block,
    /// Choose by duration.
    #[default]
    Adaptive,
}

impl SleepStrategy {
    /// Resolves `Adaptive` to a concrete strategy for `duration`.
    #[must_use]
    pub fn resolve(self, duration: Duration) -> Self {
        match self {
            Self::Adaptive => {
                if duration < ADAPTIVE_BUSY_LIMIT {
                    Self::Busy
                } else if duration < ADAPTIVE_YIELD_LIMIT {
                    Self::Yield
                } else {
                    Self::Block
                }
            }
            concrete => concrete,
        }
    }

    /// Returns the strategy name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Yield => "yield",
            Self::Block => "block",
            Self::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for SleepStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_resolution_thresholds() {
        let adaptive = SleepStrategy::Adaptive;
        assert_eq!(
            adaptive.resolve(Duration::from_micros(10)),
            SleepStrategy::Busy
        );
        assert_eq!(
            adaptive.resolve(Duration::from_micros(49)),
            SleepStrategy::Busy
        );
        assert_eq!(
            adaptive.resolve(Duration::from_micros(50)),
            SleepStrategy::Yield
        );
        assert_eq!(
            adaptive.resolve(Duration::from_micros(499)),
            SleepStrategy::Yield
        );
        assert_eq!(
            adaptive.resolve(Duration::from_micros(500)),
            SleepStrategy::Block
        );
        assert_eq!(
            adaptive.resolve(Duration::from_millis(100)),
            SleepStrategy::Block
        );
    }

    #[test]
    fn concrete_strategies_resolve_to_themselves() {
        for strategy in [SleepStrategy::Busy, SleepStrategy::Yield, SleepStrategy::Block] {
            assert_eq!(strategy.resolve(Duration::from_secs(1)), strategy);
            assert_eq!(strategy.resolve(Duration::ZERO), strategy);
        }
    }
}
