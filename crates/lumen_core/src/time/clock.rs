//! # Frame Clock
//!
//! Frame counter, clamped delta time and optional pacing.
//!
//! ## Design
//!
//! The clock must:
//! - Count frames from 1, one per `tick`
//! - Never report a delta above [`FrameClock::MAX_DELTA`] (a debugger pause
//!   must not produce a giant step)
//! - Sleep towards the target frame rate when one is set

use std::time::{Duration, Instant};

/// Timing of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Seconds since the previous frame, clamped.
    pub delta: f32,
}

/// Per-thread frame clock.
#[derive(Debug)]
pub struct FrameClock {
    frame: u64,
    last_tick: Instant,
    target: Option<Duration>,
}

impl FrameClock {
    /// Upper bound for a reported delta, in seconds.
    pub const MAX_DELTA: f32 = 0.1;

    /// Creates a clock. A `target_fps` of zero disables pacing.
    #[must_use]
    pub fn new(target_fps: u32) -> Self {
        let target = (target_fps > 0)
            .then(|| Duration::from_micros(1_000_000 / u64::from(target_fps)));
        Self {
            frame: 0,
            last_tick: Instant::now(),
            target,
        }
    }

    /// Starts a new frame.
    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let delta = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;
        self.frame += 1;
        FrameTime {
            frame: self.frame,
            delta: delta.min(Self::MAX_DELTA),
        }
    }

    /// Sleeps until the current frame has used its target duration.
    pub fn wait_for_next_frame(&self) {
        let Some(target) = self.target else {
            return;
        };
        let elapsed = self.last_tick.elapsed();
        if elapsed < target {
            std::thread::sleep(target - elapsed);
        }
    }

    /// Frames ticked so far.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Target frame duration, if pacing is enabled.
    #[must_use]
    pub const fn target_frame_duration(&self) -> Option<Duration> {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_count_from_one() {
        let mut clock = FrameClock::new(0);
        assert_eq!(clock.tick().frame, 1);
        assert_eq!(clock.tick().frame, 2);
        assert_eq!(clock.frame(), 2);
    }

    #[test]
    fn test_delta_is_clamped() {
        let mut clock = FrameClock::new(0);
        clock.tick();
        std::thread::sleep(Duration::from_millis(150));
        let time = clock.tick();
        assert!(time.delta <= FrameClock::MAX_DELTA);
    }

    #[test]
    fn test_pacing() {
        let mut clock = FrameClock::new(100);
        assert_eq!(clock.target_frame_duration(), Some(Duration::from_millis(10)));

        clock.tick();
        let start = Instant::now();
        clock.wait_for_next_frame();
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
