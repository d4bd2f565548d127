//! # Rendering Error Types

use thiserror::Error;

use lumen_core::CoreError;

use crate::device::DeviceError;

/// Errors raised by the scene graph, draw operations and the frame loop.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A lifecycle, registry or validation error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The device rejected a call.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// A thread running an update batch panicked.
    #[error("update worker panicked")]
    WorkerPanicked,

    /// The render thread panicked.
    #[error("render thread panicked")]
    RenderThreadPanicked,

    /// The async runtime for async capabilities could not be built.
    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The render thread could not be spawned.
    #[error("failed to spawn render thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

impl RenderError {
    /// Returns true for errors caused by using a disposed object.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_disposed())
    }
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;
