//! # LUMEN Rendering
//!
//! Scene graph and draw submission for one or more render-owning managers:
//! - Nodes with attachable behavior and scoped services
//! - Draw operations with a registered/disposed lifecycle
//! - A priority draw queue filled by many threads, drained by one
//! - Shared draw resources uploaded lazily, at most once per change
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── RenderManager ─────────────────────────────┐
//! │                                                                         │
//! │  Scene ──collect_tasks──▶ update batches (First … Last)                 │
//! │                                  │                                      │
//! │  operations registry ──priority──┤                                      │
//! │                                  ▼                                      │
//! │                           DrawQueue ──drain──▶ Operation::draw ──▶ Device│
//! │                                                     ▲                   │
//! │  other threads ──dispose──▶ coordination lock ──────┘                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - Device calls happen only on the render thread
//! - No draw call of a manager overlaps a disposal under its coordination lock
//! - Higher draw priority drains first and ends up visually beneath

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod device;
pub mod error;
pub mod frame;
pub mod manager;
pub mod operation;
pub mod overlay;
pub mod queue;
pub mod resource;
pub mod scene;
pub mod stats;
pub mod surface;

pub use device::{
    BufferHandle, BufferUsage, CommandList, Device, DeviceError, DeviceProbe, DrawCommand,
    HeadlessDevice,
};
pub use error::{RenderError, RenderResult};
pub use frame::FrameLoop;
pub use manager::{ManagerHandle, RenderManager};
pub use operation::{
    DrawContext, DrawHandle, DrawOperation, Lifecycle, Operation, OperationKey,
    RegistrationContext, ReleaseContext,
};
pub use overlay::{Overlay, OverlayElement, RecordingUi, UiContext, UiPass};
pub use queue::DrawQueue;
pub use resource::SharedDrawResource;
pub use scene::{
    Behavior, FrameContext, FunctionalComponent, Node, NodeEvent, Scene, ServiceMap,
    UpdateBatch,
};
pub use stats::FrameStats;
pub use surface::{ManagerId, RenderTarget, RenderTargetList, TargetId};
