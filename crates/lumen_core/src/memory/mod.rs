//! # Memory Management
//!
//! Pooled objects for per-frame data.
//!
//! ## Design Philosophy
//!
//! Per-frame snapshots are allocated once and recycled. During a frame:
//! - The previous snapshot is returned to the pool when its holder drops it
//! - The next acquire hands the same instance back, already cleared
//! - List capacity survives the reset

mod pool;

pub use pool::{ObjectPool, Poolable, Pooled};
