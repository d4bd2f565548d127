//! # LUMEN
//!
//! The engine facade: one [`Engine`] hosts any number of render managers,
//! each with its own scene, render thread and device.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────── Engine ────────────────────────────────┐
//! │                                                                        │
//! │  EngineConfig ──▶ RenderManager "main" ──▶ thread lumen-render-main    │
//! │               └─▶ RenderManager "minimap" ─▶ thread lumen-render-minimap│
//! │                                                                        │
//! │  EngineEvent channel ◀── started / stopped / failed                    │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `engine`: manager hosting and lifecycle events

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod engine;

// Re-export the layers
pub use lumen_core as core;
pub use lumen_rendering as rendering;

// Re-export commonly used types
pub use engine::{Engine, EngineEvent, ManagerOutcome};
pub use lumen_core::{CoreError, CoreResult, EngineConfig, ManagerConfig};
pub use lumen_rendering::{
    FrameStats, ManagerHandle, ManagerId, RenderError, RenderManager, RenderResult, Scene,
};
