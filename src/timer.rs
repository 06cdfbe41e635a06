//! Loop profiling helpers.

use std::{
    cell::Cell,
    fmt,
    time::{Duration, Instant},
};

use crate::filter::{
    ema::{Ema, EmaState},
    Filter,
};

/// Smoothing factor for the averaged durations.
const EMA_ALPHA: f32 = 0.3;

/// Measures how long an operation takes, keeping an exponentially smoothed average.
///
/// Formatting a timer with `{}` prints the number of measurements taken and the averaged duration,
/// and then resets both.
pub struct Timer {
    name: &'static str,
    ema: Ema,
    state: Cell<TimerState>,
}

#[derive(Clone, Copy, Default)]
struct TimerState {
    filter: EmaState,
    avg_secs: f32,
    samples: u32,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ema: Ema::new(EMA_ALPHA),
            state: Cell::new(TimerState::default()),
        }
    }

    /// Runs `op` and records how long it took.
    pub fn time<T>(&self, op: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = op();
        self.record(start.elapsed());
        result
    }

    /// Adds a single duration measurement.
    pub fn record(&self, duration: Duration) {
        let mut state = self.state.get();
        state.avg_secs = self.ema.filter(&mut state.filter, duration.as_secs_f32());
        state.samples += 1;
        self.state.set(state);
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.take();
        let avg_ms = state.avg_secs * 1000.0;
        write!(f, "{}: {}x{avg_ms:.01}ms", self.name, state.samples)
    }
}

/// Counts loop iterations and logs the rate once per second.
pub struct FpsCounter {
    name: String,
    frames: u32,
    since: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            since: Instant::now(),
        }
    }

    /// Counts one frame, logging the frame rate and the given per-stage timers once per second.
    ///
    /// Displaying the timers resets them, so the logged stage durations cover the same window as
    /// the frame rate.
    pub fn tick_with<D: fmt::Display>(&mut self, stages: impl IntoIterator<Item = D>) {
        self.frames += 1;
        if self.since.elapsed() < Duration::from_secs(1) {
            return;
        }

        let stats = stages
            .into_iter()
            .map(|stage| stage.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        if stats.is_empty() {
            log::debug!("{}: {} FPS", self.name, self.frames);
        } else {
            log::debug!("{}: {} FPS ({stats})", self.name, self.frames);
        }

        self.frames = 0;
        self.since = Instant::now();
    }
}

/// A fixed-interval gate.
///
/// [`Ticker::poll`] returns `true` at most once per interval. Used to rate-limit periodic output
/// (like the person count report) from a loop that runs every frame.
pub struct Ticker {
    interval: Duration,
    last: Instant,
}

impl Ticker {
    /// Creates a ticker that fires every `interval`.
    ///
    /// The first firing happens one full interval after creation.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Returns `true` if at least one interval has elapsed since the last firing.
    pub fn poll(&mut self) -> bool {
        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_records_and_resets() {
        let timer = Timer::new("stage");
        timer.record(Duration::from_millis(10));
        assert_eq!(timer.to_string(), "stage: 1x10.0ms");
        // Displaying the timer resets the collected measurements.
        assert_eq!(timer.to_string(), "stage: 0x0.0ms");
    }

    #[test]
    fn timer_smooths_measurements() {
        let timer = Timer::new("stage");
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(30));
        // 0.3 * 30ms + 0.7 * 10ms
        assert_eq!(timer.to_string(), "stage: 2x16.0ms");
    }

    #[test]
    fn ticker_fires_after_interval() {
        let mut ticker = Ticker::new(Duration::ZERO);
        assert!(ticker.poll());

        let mut ticker = Ticker::new(Duration::from_secs(3600));
        assert!(!ticker.poll());
        assert!(!ticker.poll());
    }
}
