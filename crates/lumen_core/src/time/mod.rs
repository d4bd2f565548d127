//! # Frame Timing
//!
//! - [`FrameClock`]: frame counter and delta time for one render thread
//! - [`FrameTimer`]: pull-based "every N frames" counter
//! - [`DeferredScheduler`]: actions run after N frames or after a duration

mod clock;
mod frame_timer;
mod scheduler;

pub use clock::{FrameClock, FrameTime};
pub use frame_timer::FrameTimer;
pub use scheduler::{DeferredScheduler, ScheduleKey, Trigger};
