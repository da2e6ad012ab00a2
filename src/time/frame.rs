//! Frame timer state machine.
//!
//! `Started → InFrame → Ended`, with `begin_frame` legal from `Started`
//! or `Ended` and `end_frame` legal only from `InFrame`; anything else is
//! `InvalidState`. `Ended` retains the last timing until the next
//! `begin_frame`. Deltas are smoothed with an exponential moving average.

use crate::error::{Error, ErrorKind, Result};
use crate::time::clock::ClockType;
use crate::time::TimeSource;
use parking_lot::Mutex;
use std::sync::Arc;

/// Default EMA smoothing factor.
pub const DEFAULT_SMOOTHING: f32 = 0.1;

/// Frame timer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Stopped; `start` re-arms.
    Idle,
    /// Armed, no frame yet.
    Started,
    /// Between `begin_frame` and `end_frame`.
    InFrame,
    /// After `end_frame`; retains the last timing.
    Ended,
}

/// Timing of the most recent completed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Raw duration of the last frame in nanoseconds.
    pub delta_ns: u64,
    /// EMA-smoothed frame duration in nanoseconds.
    pub smoothed_delta_ns: u64,
    /// Frames completed since start.
    pub frame_count: u64,
    /// Frames per second derived from the smoothed delta.
    pub average_fps: f32,
}

struct TimerState {
    state: FrameState,
    frame_begin_ns: u64,
    last_delta_ns: u64,
    smoothed_ns: f64,
    frame_count: u64,
    alpha: f64,
    target_fps: Option<f32>,
}

/// Frame timer over the monotonic clock.
pub struct FrameTimer {
    clock: Arc<TimeSource>,
    state: Mutex<TimerState>,
}

impl FrameTimer {
    /// Creates an armed frame timer with the default smoothing factor.
    #[must_use]
    pub fn new(clock: Arc<TimeSource>) -> Self {
        Self {
            clock,
            state: Mutex::new(TimerState {
                state: FrameState::Started,
                frame_begin_ns: 0,
                last_delta_ns: 0,
                smoothed_ns: 0.0,
                frame_count: 0,
                alpha: f64::from(DEFAULT_SMOOTHING),
                target_fps: None,
            }),
        }
    }

    /// Sets the EMA smoothing factor, in `[0, 1]`.
    pub fn set_smoothing(&self, alpha: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "smoothing factor must be within [0, 1]",
            ));
        }
        self.state.lock().alpha = f64::from(alpha);
        Ok(())
    }

    /// Sets the pacing target, used by embedders to budget frames.
    pub fn set_target_fps(&self, fps: f32) -> Result<()> {
        if fps <= 0.0 || !fps.is_finite() {
            return Err(Error::new(
                ErrorKind::InvalidParameters,
                "target fps must be positive and finite",
            ));
        }
        self.state.lock().target_fps = Some(fps);
        Ok(())
    }

    /// The configured pacing target.
    #[must_use]
    pub fn target_fps(&self) -> Option<f32> {
        self.state.lock().target_fps
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> FrameState {
        self.state.lock().state
    }

    /// Stops the timer; timings reset on the next `start`.
    pub fn stop(&self) {
        self.state.lock().state = FrameState::Idle;
    }

    /// Re-arms a stopped timer, clearing history.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.state != FrameState::Idle {
            return Err(Error::new(ErrorKind::InvalidState, "timer is already running")
                .with_operation("start"));
        }
        state.state = FrameState::Started;
        state.frame_count = 0;
        state.last_delta_ns = 0;
        state.smoothed_ns = 0.0;
        Ok(())
    }

    /// Opens a frame. Legal from `Started` or `Ended`.
    pub fn begin_frame(&self) -> Result<()> {
        let now = self.clock.now(ClockType::Monotonic)?.as_nanos();
        let mut state = self.state.lock();
        match state.state {
            FrameState::Started | FrameState::Ended => {
                state.state = FrameState::InFrame;
                state.frame_begin_ns = now;
                Ok(())
            }
            FrameState::InFrame => Err(Error::new(
                ErrorKind::InvalidState,
                "frame is already open",
            )
            .with_operation("begin_frame")),
            FrameState::Idle => Err(Error::new(ErrorKind::InvalidState, "timer is stopped")
                .with_operation("begin_frame")),
        }
    }

    /// Closes the open frame. Legal only from `InFrame`.
    pub fn end_frame(&self) -> Result<()> {
        let now = self.clock.now(ClockType::Monotonic)?.as_nanos();
        let mut state = self.state.lock();
        if state.state != FrameState::InFrame {
            return Err(Error::new(ErrorKind::InvalidState, "no frame is open")
                .with_operation("end_frame"));
        }
        let delta = now.saturating_sub(state.frame_begin_ns);
        state.last_delta_ns = delta;
        #[allow(clippy::cast_precision_loss)]
        let delta_f = delta as f64;
        state.smoothed_ns = if state.frame_count == 0 {
            delta_f
        } else {
            state.alpha * delta_f + (1.0 - state.alpha) * state.smoothed_ns
        };
        state.frame_count += 1;
        state.state = FrameState::Ended;
        Ok(())
    }

    /// Timing of the last completed frame.
    ///
    /// Fails with `InvalidState` before the first `end_frame`.
    pub fn timing(&self) -> Result<FrameTiming> {
        let state = self.state.lock();
        if state.frame_count == 0 {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "no frame has completed yet",
            ));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let smoothed_delta_ns = state.smoothed_ns.max(0.0) as u64;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let average_fps = if state.smoothed_ns > 0.0 {
            (1_000_000_000.0 / state.smoothed_ns) as f32
        } else {
            0.0
        };
        Ok(FrameTiming {
            delta_ns: state.last_delta_ns,
            smoothed_delta_ns,
            frame_count: state.frame_count,
            average_fps,
        })
    }
}

impl core::fmt::Debug for FrameTimer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FrameTimer")
            .field("state", &state.state)
            .field("frames", &state.frame_count)
            .finish()
    }
}
