//! Frame statistics.

/// What one frame of a manager did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Frame number.
    pub frame: u64,
    /// Synchronous updates run.
    pub updates: u32,
    /// Async updates awaited.
    pub async_updates: u32,
    /// Deferred actions run.
    pub deferred_actions: u32,
    /// Items drained from the draw queue.
    pub queued: u32,
    /// Draw calls that ran.
    pub draws: u32,
    /// Queued items skipped because they were disposed.
    pub skipped_draws: u32,
    /// Queued items dropped because they were unregistered or belong to
    /// another manager.
    pub rejected_draws: u32,
    /// Buffer uploads performed by draws.
    pub uploads: u32,
    /// Buffers destroyed after deferred release.
    pub released_buffers: u32,
    /// Overlay elements drawn by the UI pass.
    pub ui_elements: u32,
    /// Frame time in milliseconds.
    pub frame_time_ms: f32,
}

impl FrameStats {
    /// Returns FPS calculated from frame time.
    #[must_use]
    pub fn fps(&self) -> f32 {
        if self.frame_time_ms > 0.0 {
            1000.0 / self.frame_time_ms
        } else {
            0.0
        }
    }

    /// Returns true if the frame fit into `budget_ms`.
    #[must_use]
    pub fn within_budget(&self, budget_ms: f32) -> bool {
        self.frame_time_ms <= budget_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps() {
        let stats = FrameStats {
            frame_time_ms: 20.0,
            ..FrameStats::default()
        };
        assert!((stats.fps() - 50.0).abs() < f32::EPSILON);
        assert!(stats.within_budget(33.3));
        assert!((FrameStats::default().fps()).abs() < f32::EPSILON);
    }
}
