//! # LUMEN Core
//!
//! Thread-safe building blocks for the frame pipeline:
//! - Pooled snapshots that are reused instead of reallocated every frame
//! - Coalesced shared values that upload at most once per change
//! - Keyed registries and ordered element lists with snapshot iteration
//! - Frame timers and a deferred action scheduler
//! - The per-manager coordination lock
//!
//! ## Architecture Rules
//!
//! 1. **One lock per structure** - registries, lists and coalescers each own
//!    exactly one mutex and hold it only for the operation itself
//! 2. **Snapshot iteration** - readers copy under the lock and iterate outside
//! 3. **Errors, not silence** - invalid lifecycle calls return [`CoreError`]
//!
//! ## Example
//!
//! ```rust
//! use lumen_core::{Coalesced, CoreError};
//!
//! let color = Coalesced::new([0.0_f32; 4]);
//! assert!(color.set([1.0, 0.0, 0.0, 1.0]));
//!
//! let uploaded = color.flush(|value| {
//!     assert_eq!(value[0], 1.0);
//!     Ok::<(), CoreError>(())
//! });
//! assert_eq!(uploaded, Ok(true));
//! assert!(!color.is_pending());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod logging;
pub mod memory;
pub mod registry;
pub mod sync;
pub mod time;

pub use config::{EngineConfig, ManagerConfig};
pub use error::{CoreError, CoreResult};
pub use events::Observers;
pub use input::{InputCapture, InputSnapshot, Key, KeyEvent, MouseButton, RawInputEvent};
pub use memory::{ObjectPool, Poolable, Pooled};
pub use registry::{KeyedRegistry, Nested, NestedNode, OrderedList};
pub use sync::{Coalesced, CoordinationGuard, CoordinationLock};
pub use time::{
    DeferredScheduler, FrameClock, FrameTime, FrameTimer, ScheduleKey, Trigger,
};
