//! Timing façade: clocks, frame timing, sleep, performance counters.
//!
//! [`TimeSource`] serves every clock from one of two bases: the host's
//! monotonic clock in production, or a manual base where time only moves
//! when the test (or lab harness) advances it. Everything above — frame
//! timer, sleep strategies, counter polling — is written against the
//! façade, so the whole suite runs deterministically on the manual base.

pub mod clock;
pub mod counters;
pub mod frame;
pub mod sleep;

pub use clock::{ClockType, TimePrecision, Timestamp};
pub use counters::{CounterSample, PerfCounters, PerfSnapshot};
pub use frame::{FrameState, FrameTimer, FrameTiming};
pub use sleep::SleepStrategy;

use crate::error::{Error, ErrorKind, Result};
use crate::types::platform::PlatformInfo;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug)]
enum TimeBase {
    Host { anchor: Instant },
    Manual { now_ns: AtomicU64 },
}

#[derive(Debug, Default)]
struct GameState {
    paused: bool,
    pause_started_ns: u64,
    paused_total_ns: u64,
}

/// The clock façade.
#[derive(Debug)]
pub struct TimeSource {
    base: TimeBase,
    clocks: Vec<ClockType>,
    game: Mutex<GameState>,
}

impl TimeSource {
    /// A host-backed source serving the platform's advertised clocks.
    #[must_use]
    pub fn for_platform(platform: &PlatformInfo) -> Self {
        Self {
            base: TimeBase::Host {
                anchor: Instant::now(),
            },
            clocks: platform.clocks.clone(),
            game: Mutex::new(GameState::default()),
        }
    }

    /// A host-backed source serving every clock.
    #[must_use]
    pub fn host() -> Self {
        Self {
            base: TimeBase::Host {
                anchor: Instant::now(),
            },
            clocks: vec![
                ClockType::Monotonic,
                ClockType::Realtime,
                ClockType::Process,
                ClockType::Thread,
                ClockType::HighResolution,
                ClockType::GameTimer,
                ClockType::ProfileTimer,
            ],
            game: Mutex::new(GameState::default()),
        }
    }

    /// A manual source: time moves only through [`TimeSource::advance`].
    ///
    /// Serves every clock; sleeps advance the virtual clock instead of
    /// waiting.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            base: TimeBase::Manual {
                now_ns: AtomicU64::new(0),
            },
            clocks: vec![
                ClockType::Monotonic,
                ClockType::Realtime,
                ClockType::Process,
                ClockType::Thread,
                ClockType::HighResolution,
                ClockType::GameTimer,
                ClockType::ProfileTimer,
            ],
            game: Mutex::new(GameState::default()),
        }
    }

    fn mono_ns(&self) -> u64 {
        match &self.base {
            TimeBase::Host { anchor } => {
                u64::try_from(anchor.elapsed().as_nanos()).unwrap_or(u64::MAX)
            }
            TimeBase::Manual { now_ns } => now_ns.load(Ordering::SeqCst),
        }
    }

    /// Reads a clock.
    ///
    /// Clocks the platform did not advertise fail with
    /// `FeatureNotSupported`. Process and thread clocks are served from
    /// the monotonic base where the host offers no finer source; their
    /// availability is what the platform capability gates.
    pub fn now(&self, clock: ClockType) -> Result<Timestamp> {
        if !self.clocks.contains(&clock) {
            return Err(Error::new(
                ErrorKind::FeatureNotSupported,
                "clock not available on this platform",
            )
            .with_operation("now"));
        }
        let nanos = match clock {
            ClockType::Monotonic
            | ClockType::HighResolution
            | ClockType::ProfileTimer
            | ClockType::Process
            | ClockType::Thread => self.mono_ns(),
            ClockType::Realtime => match &self.base {
                TimeBase::Host { .. } => SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
                    .unwrap_or(0),
                TimeBase::Manual { now_ns } => now_ns.load(Ordering::SeqCst),
            },
            ClockType::GameTimer => {
                let game = self.game.lock();
                if game.paused {
                    game.pause_started_ns
                        .saturating_sub(game.paused_total_ns)
                } else {
                    self.mono_ns().saturating_sub(game.paused_total_ns)
                }
            }
        };
        Ok(Timestamp::from_nanos(nanos, clock))
    }

    /// Duration since an earlier reading of the same clock.
    pub fn elapsed(&self, since: Timestamp) -> Result<Duration> {
        self.now(since.clock())?.elapsed_since(since)
    }

    /// Pauses the game clock; readings freeze until resume.
    pub fn pause_game(&self) -> Result<()> {
        let mut game = self.game.lock();
        if game.paused {
            return Err(Error::new(ErrorKind::InvalidState, "game clock already paused"));
        }
        game.paused = true;
        game.pause_started_ns = self.mono_ns();
        Ok(())
    }

    /// Resumes the game clock.
    pub fn resume_game(&self) -> Result<()> {
        let mut game = self.game.lock();
        if !game.paused {
            return Err(Error::new(ErrorKind::InvalidState, "game clock is not paused"));
        }
        game.paused = false;
        let pause_len = self.mono_ns().saturating_sub(game.pause_started_ns);
        game.paused_total_ns += pause_len;
        Ok(())
    }

    /// True while the game clock is paused.
    #[must_use]
    pub fn game_paused(&self) -> bool {
        self.game.lock().paused
    }

    /// Advances a manual source's clock. `InvalidState` on a host source.
    pub fn advance(&self, by: Duration) -> Result<()> {
        match &self.base {
            TimeBase::Manual { now_ns } => {
                now_ns.fetch_add(
                    u64::try_from(by.as_nanos()).unwrap_or(u64::MAX),
                    Ordering::SeqCst,
                );
                Ok(())
            }
            TimeBase::Host { .. } => Err(Error::new(
                ErrorKind::InvalidState,
                "host time cannot be advanced manually",
            )),
        }
    }

    /// Sleeps for `duration` using the given strategy.
    ///
    /// On a manual source the virtual clock advances instead of waiting.
    pub fn sleep(&self, duration: Duration, strategy: SleepStrategy) {
        if let TimeBase::Manual { .. } = &self.base {
            let _ = self.advance(duration);
            return;
        }
        let target = self.mono_ns()
            + u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        match strategy.resolve(duration) {
            SleepStrategy::Busy => {
                while self.mono_ns() < target {
                    core::hint::spin_loop();
                }
            }
            SleepStrategy::Yield => {
                while self.mono_ns() < target {
                    std::thread::yield_now();
                }
            }
            SleepStrategy::Block | SleepStrategy::Adaptive => {
                std::thread::sleep(duration);
            }
        }
    }
}
