//! Frame-counted timer.

use crate::error::{CoreError, CoreResult};

/// Counts how many `lapse`-frame periods passed since a start frame.
///
/// The timer is pull-based: it holds no state that advances on its own, so
/// [`clocks`](Self::clocks) gives the same answer no matter how often it is
/// queried. [`has_clocked`](Self::has_clocked) is only true on the exact
/// boundary frame, so a caller relying on it must poll every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTimer {
    start_frame: u64,
    lapse: u64,
}

impl FrameTimer {
    /// Creates a timer starting at `start_frame` that clocks every `lapse`
    /// frames.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `lapse` is zero.
    pub fn new(start_frame: u64, lapse: u64) -> CoreResult<Self> {
        if lapse == 0 {
            return Err(CoreError::InvalidArgument { name: "lapse", value: 0 });
        }
        Ok(Self { start_frame, lapse })
    }

    /// Number of full periods between the start frame and `current_frame`.
    #[inline]
    #[must_use]
    pub const fn clocks(&self, current_frame: u64) -> u64 {
        current_frame.saturating_sub(self.start_frame) / self.lapse
    }

    /// Returns true if `current_frame` ends a period.
    #[inline]
    #[must_use]
    pub const fn has_clocked(&self, current_frame: u64) -> bool {
        current_frame > self.start_frame && (current_frame - self.start_frame) % self.lapse == 0
    }

    /// Moves the start frame to `current_frame`.
    pub fn restart(&mut self, current_frame: u64) {
        self.start_frame = current_frame;
    }

    /// Frame the timer counts from.
    #[must_use]
    pub const fn start_frame(&self) -> u64 {
        self.start_frame
    }

    /// Frames per period.
    #[must_use]
    pub const fn lapse(&self) -> u64 {
        self.lapse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_lapse_rejected() {
        assert_eq!(
            FrameTimer::new(0, 0),
            Err(CoreError::InvalidArgument { name: "lapse", value: 0 })
        );
    }

    #[test]
    fn test_clocks_is_floor_division() {
        for lapse in 1..=7 {
            let timer = FrameTimer::new(10, lapse).unwrap();
            for advanced in 0..50 {
                assert_eq!(timer.clocks(10 + advanced), advanced / lapse);
            }
        }
    }

    #[test]
    fn test_polling_does_not_change_answer() {
        let timer = FrameTimer::new(0, 3).unwrap();
        let first = timer.clocks(9);
        let _ = timer.has_clocked(9);
        let _ = timer.clocks(4);
        assert_eq!(timer.clocks(9), first);
        assert_eq!(first, 3);
    }

    #[test]
    fn test_has_clocked_on_boundaries_only() {
        let timer = FrameTimer::new(5, 2).unwrap();
        let hits: Vec<u64> = (0..12).filter(|&f| timer.has_clocked(f)).collect();
        assert_eq!(hits, vec![7, 9, 11]);
    }

    #[test]
    fn test_every_frame_with_unit_lapse() {
        let mut timer = FrameTimer::new(0, 1).unwrap();
        let mut count = 0;
        for frame in 1..=20 {
            if timer.has_clocked(frame) {
                count += 1;
            }
        }
        assert_eq!(count, timer.clocks(20));

        timer.restart(20);
        assert_eq!(timer.clocks(20), 0);
        assert!(!timer.has_clocked(20));
    }
}
