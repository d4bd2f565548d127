//! # Device Abstraction
//!
//! The backend that owns GPU memory and executes command lists.
//!
//! A device is created on the render thread and never leaves it. Code on other
//! threads reaches the device only indirectly: by raising a coalescer flag, by
//! queueing a draw, or by sending a buffer handle to be destroyed.

mod headless;

pub use headless::{DeviceProbe, HeadlessDevice};

use bitflags::bitflags;
use thiserror::Error;

use crate::surface::TargetId;

/// Opaque handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

bitflags! {
    /// How a buffer is used by the pipeline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex data.
        const VERTEX = 1 << 0;
        /// Index data.
        const INDEX = 1 << 1;
        /// Uniform/constant data.
        const UNIFORM = 1 << 2;
        /// Read/write storage.
        const STORAGE = 1 << 3;
        /// Destination of CPU writes.
        const COPY_DST = 1 << 4;
    }
}

/// Errors reported by a device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The handle does not name a live buffer.
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferHandle),

    /// A write does not fit in the buffer.
    #[error("write of {len} bytes at offset {offset} exceeds buffer of {size} bytes")]
    OutOfRange {
        /// Write offset.
        offset: usize,
        /// Write length.
        len: usize,
        /// Buffer size.
        size: usize,
    },

    /// A zero-sized buffer was requested.
    #[error("buffer size must be positive")]
    ZeroSize,

    /// The device stopped accepting work.
    #[error("device lost: {0}")]
    Lost(String),
}

/// One entry of a command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawCommand {
    /// A draw call reading the bound buffers.
    Draw {
        /// Name of the operation that issued the call.
        label: String,
        /// Buffers bound for the call.
        bindings: Vec<BufferHandle>,
        /// Vertices per instance.
        vertex_count: u32,
        /// Instances.
        instance_count: u32,
    },
    /// The overlay produced by the UI pass.
    Overlay {
        /// Number of overlay elements drawn.
        elements: u32,
    },
}

/// Commands for one frame, submitted in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandList {
    /// Frame that produced the list.
    pub frame: u64,
    /// Render targets the list is presented to.
    pub targets: Vec<TargetId>,
    /// Commands in submission order.
    pub commands: Vec<DrawCommand>,
}

impl CommandList {
    /// Creates an empty list for `frame`.
    #[must_use]
    pub fn new(frame: u64, targets: Vec<TargetId>) -> Self {
        Self {
            frame,
            targets,
            commands: Vec::new(),
        }
    }

    /// Appends a command.
    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    /// Labels of the draw calls, in order.
    pub fn draw_labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Draw { label, .. } => Some(label.as_str()),
                DrawCommand::Overlay { .. } => None,
            })
            .collect()
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if the list has no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// The backend contract.
///
/// Implementations need not be thread-safe: the frame loop calls them from
/// the render thread only.
pub trait Device {
    /// Allocates a buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the buffer cannot be created.
    fn create_buffer(
        &mut self,
        size: usize,
        usage: BufferUsage,
    ) -> Result<BufferHandle, DeviceError>;

    /// Writes `data` into a buffer at `offset`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] for unknown handles and out-of-range writes.
    fn update_buffer(
        &mut self,
        handle: BufferHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DeviceError>;

    /// Frees a buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnknownBuffer`] if the handle is not live.
    fn destroy_buffer(&mut self, handle: BufferHandle) -> Result<(), DeviceError>;

    /// Executes a command list.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the device cannot accept the list.
    fn submit(&mut self, commands: CommandList) -> Result<(), DeviceError>;
}
