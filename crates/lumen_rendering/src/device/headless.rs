//! Device without a GPU.
//!
//! Buffers are plain byte vectors. Every call is counted in a shared
//! [`DeviceProbe`] so other threads can observe what the render thread did.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::{BufferHandle, BufferUsage, CommandList, Device, DeviceError};

/// Shared view of a [`HeadlessDevice`].
#[derive(Debug, Default)]
pub struct DeviceProbe {
    created: AtomicU64,
    uploads: AtomicU64,
    destroyed: AtomicU64,
    submissions: AtomicU64,
    fail_next_submit: AtomicBool,
    buffers: Mutex<HashMap<BufferHandle, Vec<u8>>>,
    last_submission: Mutex<Option<CommandList>>,
}

impl DeviceProbe {
    /// Buffers created so far.
    pub fn buffers_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Buffer writes so far.
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Buffers destroyed so far.
    pub fn buffers_destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// Command lists submitted so far.
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    /// Number of live buffers.
    pub fn live_buffers(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Copy of a live buffer's bytes.
    pub fn buffer_contents(&self, handle: BufferHandle) -> Option<Vec<u8>> {
        self.buffers.lock().get(&handle).cloned()
    }

    /// The most recently submitted command list.
    pub fn last_submission(&self) -> Option<CommandList> {
        self.last_submission.lock().clone()
    }

    /// Makes the next `submit` fail with [`DeviceError::Lost`].
    pub fn fail_next_submit(&self) {
        self.fail_next_submit.store(true, Ordering::Relaxed);
    }
}

/// A [`Device`] that keeps buffers in memory.
#[derive(Debug)]
pub struct HeadlessDevice {
    probe: Arc<DeviceProbe>,
    next_handle: u64,
}

impl HeadlessDevice {
    /// Creates a device and returns it together with its probe.
    #[must_use]
    pub fn probed() -> (Self, Arc<DeviceProbe>) {
        let probe = Arc::new(DeviceProbe::default());
        (Self::with_probe(Arc::clone(&probe)), probe)
    }

    /// Creates a device reporting into an existing probe.
    #[must_use]
    pub fn with_probe(probe: Arc<DeviceProbe>) -> Self {
        Self {
            probe,
            next_handle: 1,
        }
    }

    /// The probe this device reports into.
    pub fn probe(&self) -> &Arc<DeviceProbe> {
        &self.probe
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::with_probe(Arc::default())
    }
}

impl Device for HeadlessDevice {
    fn create_buffer(
        &mut self,
        size: usize,
        usage: BufferUsage,
    ) -> Result<BufferHandle, DeviceError> {
        if size == 0 {
            return Err(DeviceError::ZeroSize);
        }
        let handle = BufferHandle(self.next_handle);
        self.next_handle += 1;
        self.probe.buffers.lock().insert(handle, vec![0; size]);
        self.probe.created.fetch_add(1, Ordering::Relaxed);
        trace!(?handle, size, ?usage, "buffer created");
        Ok(handle)
    }

    fn update_buffer(
        &mut self,
        handle: BufferHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let mut buffers = self.probe.buffers.lock();
        let buffer = buffers
            .get_mut(&handle)
            .ok_or(DeviceError::UnknownBuffer(handle))?;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= buffer.len())
            .ok_or(DeviceError::OutOfRange {
                offset,
                len: data.len(),
                size: buffer.len(),
            })?;
        buffer[offset..end].copy_from_slice(data);
        self.probe.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) -> Result<(), DeviceError> {
        self.probe
            .buffers
            .lock()
            .remove(&handle)
            .ok_or(DeviceError::UnknownBuffer(handle))?;
        self.probe.destroyed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn submit(&mut self, commands: CommandList) -> Result<(), DeviceError> {
        if self.probe.fail_next_submit.swap(false, Ordering::Relaxed) {
            return Err(DeviceError::Lost(format!(
                "submission of frame {} rejected",
                commands.frame
            )));
        }
        self.probe.submissions.fetch_add(1, Ordering::Relaxed);
        *self.probe.last_submission.lock() = Some(commands);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_lifecycle() {
        let (mut device, probe) = HeadlessDevice::probed();
        let handle = device.create_buffer(8, BufferUsage::UNIFORM).unwrap();

        device.update_buffer(handle, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(probe.buffer_contents(handle), Some(vec![0, 0, 0, 0, 1, 2, 3, 4]));
        assert_eq!(probe.uploads(), 1);

        device.destroy_buffer(handle).unwrap();
        assert_eq!(probe.live_buffers(), 0);
        assert_eq!(
            device.update_buffer(handle, 0, &[1]),
            Err(DeviceError::UnknownBuffer(handle))
        );
    }

    #[test]
    fn test_out_of_range_write() {
        let (mut device, _probe) = HeadlessDevice::probed();
        let handle = device.create_buffer(4, BufferUsage::VERTEX).unwrap();

        assert_eq!(
            device.update_buffer(handle, 2, &[0; 4]),
            Err(DeviceError::OutOfRange { offset: 2, len: 4, size: 4 })
        );
        assert_eq!(device.create_buffer(0, BufferUsage::VERTEX), Err(DeviceError::ZeroSize));
    }

    #[test]
    fn test_injected_submit_failure() {
        let (mut device, probe) = HeadlessDevice::probed();
        probe.fail_next_submit();

        assert!(matches!(
            device.submit(CommandList::new(1, Vec::new())),
            Err(DeviceError::Lost(_))
        ));
        assert!(device.submit(CommandList::new(2, Vec::new())).is_ok());
        assert_eq!(probe.submissions(), 1);
        assert_eq!(probe.last_submission().map(|c| c.frame), Some(2));
    }
}
