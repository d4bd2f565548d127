//! # Synchronization Primitives
//!
//! ## The Problem
//!
//! ```text
//! Worker threads:  mutate transforms, dispose renderables
//! Render thread:   uploads buffers, issues draw calls
//!
//! Unsynchronized:  draw reads a half-written buffer → torn frame
//! One big lock:    every write waits for a whole frame → stalls
//! ```
//!
//! ## The Solution
//!
//! - [`Coalesced`]: writers only raise a flag; the render thread uploads once,
//!   right before the draw that consumes the value
//! - [`CoordinationLock`]: one exclusive lock per manager, held by the render
//!   thread per draw call and by external threads per disposal

mod coalescer;
mod coordination;

pub use coalescer::Coalesced;
pub use coordination::{CoordinationGuard, CoordinationLock};
