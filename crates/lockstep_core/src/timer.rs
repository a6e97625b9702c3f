//! # Frame Timer
//!
//! Pre-update timer sampling for the update loop.
//!
//! Each tick samples a clamped delta time and records how long the tick took.
//! With a target rate set, ticks that overrun the budget are counted as late
//! and [`FrameTimer::wait_for_next_tick`] paces the loop.

use std::time::{Duration, Instant};

/// Upper bound on the delta handed to simulation, so a stall (debugger,
/// long load) does not produce one huge step.
pub const MAX_DELTA: Duration = Duration::from_millis(100);

/// Tick timing statistics.
#[derive(Clone, Copy, Debug)]
pub struct FrameTimingStats {
    /// Minimum tick duration observed.
    pub min_tick_us: u64,
    /// Maximum tick duration observed.
    pub max_tick_us: u64,
    /// Average tick duration (rolling).
    pub avg_tick_us: u64,
    /// Ticks that took longer than the target budget.
    pub late_ticks: u64,
    /// Total ticks measured.
    pub total_ticks: u64,
}

impl Default for FrameTimingStats {
    fn default() -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: 0,
            late_ticks: 0,
            total_ticks: 0,
        }
    }
}

/// Delta-time sampler with optional fixed-rate pacing.
pub struct FrameTimer {
    /// Target tick duration, if paced.
    tick_duration: Option<Duration>,
    /// Time the previous tick was sampled.
    last_sample: Instant,
    /// Delta of the current tick, clamped.
    delta: Duration,
    /// Total ticks sampled.
    tick_count: u64,
    stats: FrameTimingStats,
}

impl FrameTimer {
    /// Creates a timer. `target_hz == 0` means unpaced.
    #[must_use]
    pub fn new(target_hz: u32) -> Self {
        let tick_duration =
            (target_hz > 0).then(|| Duration::from_micros(1_000_000 / u64::from(target_hz)));
        Self {
            tick_duration,
            last_sample: Instant::now(),
            delta: Duration::ZERO,
            tick_count: 0,
            stats: FrameTimingStats::default(),
        }
    }

    /// Samples the clock at the start of a tick and returns the tick start.
    ///
    /// The delta since the previous sample is clamped to [`MAX_DELTA`].
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        let now = Instant::now();
        self.delta = now.duration_since(self.last_sample).min(MAX_DELTA);
        self.last_sample = now;
        self.tick_count += 1;
        now
    }

    /// Records the duration of the tick that started at `start`.
    pub fn end_tick(&mut self, start: Instant) {
        let duration = start.elapsed();
        let duration_us = duration.as_micros() as u64;

        let stats = &mut self.stats;
        stats.min_tick_us = stats.min_tick_us.min(duration_us);
        stats.max_tick_us = stats.max_tick_us.max(duration_us);
        stats.avg_tick_us = if stats.total_ticks == 0 {
            duration_us
        } else {
            (stats.avg_tick_us * 15 + duration_us) / 16
        };
        stats.total_ticks += 1;

        if self.tick_duration.is_some_and(|budget| duration > budget) {
            stats.late_ticks += 1;
        }
    }

    /// Sleeps until the next tick is due. Returns immediately when unpaced.
    pub fn wait_for_next_tick(&self) {
        let Some(budget) = self.tick_duration else {
            return;
        };
        let elapsed = self.last_sample.elapsed();
        if elapsed < budget {
            std::thread::sleep(budget - elapsed);
        }
    }

    /// Delta time of the current tick in seconds.
    #[inline]
    #[must_use]
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Delta time of the current tick.
    #[inline]
    #[must_use]
    pub const fn delta(&self) -> Duration {
        self.delta
    }

    /// Ticks sampled so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &FrameTimingStats {
        &self.stats
    }

    /// Target tick duration, if paced.
    #[must_use]
    pub const fn tick_duration(&self) -> Option<Duration> {
        self.tick_duration
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(0)
    }
}
