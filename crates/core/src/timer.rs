//! Frame timing and FPS statistics.

use std::time::{Duration, Instant};

/// Window over which [`FrameStats::fps`] is averaged.
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Timing information for a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Time since the previous tick.
    pub delta: Duration,
    /// Frame rate derived from `delta` alone.
    pub instantaneous_fps: f32,
    /// Frames counted over the last completed one-second window.
    pub fps: f32,
    /// Total ticks since the timer was created or reset.
    pub frame_count: u64,
}

impl FrameStats {
    /// Frame time in milliseconds.
    pub fn frame_time_ms(&self) -> f32 {
        self.delta.as_secs_f32() * 1000.0
    }
}

/// High-resolution timer that produces [`FrameStats`] once per tick.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    window_frames: u32,
    fps: f32,
    frame_count: u64,
}

impl FrameTimer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            window_frames: 0,
            fps: 0.0,
            frame_count: 0,
        }
    }

    /// Time since the timer was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record a tick at the current time.
    pub fn tick(&mut self) -> FrameStats {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> FrameStats {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frame_count += 1;
        self.window_frames += 1;

        let window = now.saturating_duration_since(self.window_start);
        if window >= FPS_WINDOW {
            self.fps = self.window_frames as f32 / window.as_secs_f32();
            self.window_frames = 0;
            self.window_start = now;
        }

        let instantaneous_fps = if delta.is_zero() {
            0.0
        } else {
            1.0 / delta.as_secs_f32()
        };

        FrameStats {
            delta,
            instantaneous_fps,
            fps: self.fps,
            frame_count: self.frame_count,
        }
    }

    /// Restart from now, e.g. once setup is done so the first delta does not
    /// include it.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
