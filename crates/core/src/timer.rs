//! High-resolution timer for frame timing and profiling.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed and per-frame time.
///
/// Besides the raw delta returned by [`tick`](Self::tick), the timer keeps
/// running totals so a host loop can report an average frame time without
/// storing every sample.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    ticks: u64,
    slowest: Duration,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            ticks: 0,
            slowest: Duration::ZERO,
        }
    }

    /// Get the total elapsed time since the timer was created or reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in seconds since the timer was created or reset.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Get the time elapsed since the last call to `tick()`.
    ///
    /// Each call counts as one frame for [`average_frame_time`](Self::average_frame_time).
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.ticks += 1;
        self.slowest = self.slowest.max(delta);
        delta
    }

    /// Get the delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Number of ticks since creation or the last reset.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Longest interval observed between two ticks.
    pub fn slowest_frame(&self) -> Duration {
        self.slowest
    }

    /// Mean interval between ticks, or zero before the first tick.
    pub fn average_frame_time(&self) -> Duration {
        if self.ticks == 0 {
            return Duration::ZERO;
        }
        let total = self.last_tick - self.start;
        total / u32::try_from(self.ticks).unwrap_or(u32::MAX)
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
        self.ticks = 0;
        self.slowest = Duration::ZERO;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_is_zero_before_first_tick() {
        let timer = Timer::new();
        assert_eq!(timer.ticks(), 0);
        assert_eq!(timer.average_frame_time(), Duration::ZERO);
    }

    #[test]
    fn test_ticks_accumulate() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(2));
        let first = timer.tick();
        timer.tick();

        assert_eq!(timer.ticks(), 2);
        assert!(timer.slowest_frame() >= first);
        assert!(timer.average_frame_time() <= timer.elapsed());

        timer.reset();
        assert_eq!(timer.ticks(), 0);
        assert_eq!(timer.slowest_frame(), Duration::ZERO);
    }
}
