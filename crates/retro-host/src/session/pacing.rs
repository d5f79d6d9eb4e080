//! Accumulator-based frame pacing.

use std::time::{Duration, Instant};

use tracing::trace;

/// Fallback when a core reports a non-positive frame rate.
pub const DEFAULT_FPS: f64 = 60.0;

/// Monotonic time source for the run loop.
pub trait Clock: Send {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall-clock time since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Decides how many core frames are due at a given instant.
///
/// Elapsed time is accumulated and consumed one frame period at a time, so
/// rounding never compounds into drift.
#[derive(Debug, Clone)]
pub struct FramePacer {
    frame: Duration,
    last: Duration,
    accumulator: Duration,
}

impl FramePacer {
    pub fn new(fps: f64, now: Duration) -> Self {
        Self {
            frame: frame_duration(fps),
            last: now,
            accumulator: Duration::ZERO,
        }
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame
    }

    /// Frames to run now. Every elapsed period is owed, so a stall is
    /// repaid in full by one burst.
    pub fn advance(&mut self, now: Duration) -> u32 {
        self.accumulator += now.saturating_sub(self.last);
        self.last = self.last.max(now);

        let mut due = 0;
        while self.accumulator >= self.frame {
            self.accumulator -= self.frame;
            due += 1;
        }
        if due > 1 {
            trace!(due, "catching up");
        }
        due
    }

    /// Time until the next frame becomes due.
    pub fn until_next(&self, now: Duration) -> Duration {
        let pending = self.accumulator + now.saturating_sub(self.last);
        self.frame.saturating_sub(pending)
    }
}

/// One frame period, rounded to the nanosecond.
pub fn frame_duration(fps: f64) -> Duration {
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { DEFAULT_FPS };
    Duration::from_nanos((1e9 / fps).round() as u64)
}

/// Nominal instants of `due` frames ending at `now`, one `frame` apart.
pub fn burst_instants(now: Duration, frame: Duration, due: u32) -> impl Iterator<Item = Duration> {
    (0..due).rev().map(move |back| now.saturating_sub(frame * back))
}
