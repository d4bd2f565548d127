//! # Shared Draw Resources
//!
//! A CPU-side record (transform, color effect, ...) mirrored in a device
//! buffer.
//!
//! ```text
//! any thread:     resource.set(value)      → flag raised (if changed)
//! render thread:  cx.bind(&resource)       → create buffer on first use
//!                                          → upload iff flag raised
//!                                          → draw reads the buffer
//! ```

use std::fmt;

use bytemuck::Pod;
use parking_lot::Mutex;

use lumen_core::Coalesced;

use crate::device::{BufferHandle, BufferUsage, Device, DeviceError};

/// A value with a lazily created, lazily updated device buffer.
pub struct SharedDrawResource<T> {
    value: Coalesced<T>,
    buffer: Mutex<Option<BufferHandle>>,
    usage: BufferUsage,
}

impl<T: Pod + PartialEq> SharedDrawResource<T> {
    /// Creates a resource whose buffer is created on first bind.
    #[must_use]
    pub fn new(value: T, usage: BufferUsage) -> Self {
        Self {
            value: Coalesced::new(value),
            buffer: Mutex::new(None),
            usage: usage | BufferUsage::COPY_DST,
        }
    }

    /// Creates a uniform-buffer resource.
    #[must_use]
    pub fn uniform(value: T) -> Self {
        Self::new(value, BufferUsage::UNIFORM)
    }

    /// Stores a new value. Returns true if it differs from the current one.
    pub fn set(&self, value: T) -> bool {
        self.value.set(value)
    }

    /// Edits the value in place.
    pub fn update(&self, edit: impl FnOnce(&mut T)) -> bool {
        self.value.update(edit)
    }

    /// Copy of the current CPU-side value.
    pub fn get(&self) -> T {
        self.value.get()
    }

    /// Returns true if the buffer is behind the CPU-side value.
    pub fn is_pending(&self) -> bool {
        self.value.is_pending()
    }

    /// Number of uploads performed.
    pub fn upload_count(&self) -> u64 {
        self.value.upload_count()
    }

    /// The device buffer, if created.
    pub fn buffer(&self) -> Option<BufferHandle> {
        *self.buffer.lock()
    }

    /// Makes the buffer current and returns it.
    ///
    /// Creates the buffer on first use, then uploads the value if it changed
    /// since the last bind. Call on the render thread only, right before the
    /// draw that reads the buffer.
    ///
    /// Returns the handle and whether an upload happened.
    ///
    /// # Errors
    ///
    /// Returns the device error; the value stays pending in that case.
    pub fn bind(&self, device: &mut dyn Device) -> Result<(BufferHandle, bool), DeviceError> {
        let (handle, created) = {
            let mut slot = self.buffer.lock();
            match *slot {
                Some(handle) => (handle, false),
                None => {
                    let handle = device.create_buffer(std::mem::size_of::<T>(), self.usage)?;
                    *slot = Some(handle);
                    (handle, true)
                }
            }
        };
        if created {
            self.value.invalidate();
        }
        let uploaded = self
            .value
            .flush(|value| device.update_buffer(handle, 0, bytemuck::bytes_of(value)))?;
        Ok((handle, uploaded))
    }

    /// Detaches the buffer from the resource and returns it for destruction.
    ///
    /// A later bind creates a fresh buffer and uploads the current value.
    pub fn release(&self) -> Option<BufferHandle> {
        self.buffer.lock().take()
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedDrawResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDrawResource")
            .field("value", &self.value)
            .field("buffer", &*self.buffer.lock())
            .finish()
    }
}
