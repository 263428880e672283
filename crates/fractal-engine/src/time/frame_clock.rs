use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Clamped seconds since the previous tick.
    pub dt: f32,

    /// Sum of all clamped `dt` values so far, in seconds.
    pub elapsed: f64,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    pub frame_index: u64,
}

/// Produces `FrameTime` snapshots with a clamped delta.
///
/// The upper clamp keeps a stalled or debugged process from advancing the
/// animation by seconds in one frame; the lower clamp avoids zero deltas.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    elapsed: f64,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub const DEFAULT_DT_MIN: Duration = Duration::from_micros(100);
    pub const DEFAULT_DT_MAX: Duration = Duration::from_millis(250);

    pub fn new() -> Self {
        Self::with_clamps(Self::DEFAULT_DT_MIN, Self::DEFAULT_DT_MAX)
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            elapsed: 0.0,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Restarts delta measurement from now, e.g. after a suspend.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// Advances the clock as if ticked at `now`.
    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max)
            .as_secs_f32();

        self.last = now;
        self.elapsed += f64::from(dt);

        let ft = FrameTime {
            dt,
            elapsed: self.elapsed,
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
