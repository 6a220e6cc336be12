//! GPU buffer resource.

use std::sync::Arc;

use super::DeviceRef;
use crate::device::GpuDevice;
use crate::driver::GpuBuffer;
use crate::types::{BufferDescriptor, BufferUsage};

/// A GPU buffer resource.
///
/// Buffers are created by [`GpuDevice::create_buffer`] and are usually shared
/// behind an [`Arc`]. The contents are only reachable from the GPU; stage
/// data through a [`CpuBuffer`](super::CpuBuffer) and a blit pass.
///
/// # Example
///
/// ```ignore
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024).with_usage(BufferUsage::VERTEX))?;
/// println!("Buffer size: {}", buffer.size());
/// ```
pub struct Buffer {
    pub(super) device: DeviceRef,
    raw: GpuBuffer,
    descriptor: BufferDescriptor,
}

impl Buffer {
    pub(crate) fn new(device: DeviceRef, raw: GpuBuffer, descriptor: BufferDescriptor) -> Self {
        Self {
            device,
            raw,
            descriptor,
        }
    }

    pub(crate) fn raw(&self) -> &GpuBuffer {
        &self.raw
    }

    /// Get the parent device, if it still exists.
    pub fn device(&self) -> Option<Arc<GpuDevice>> {
        self.device.upgrade()
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Whether `offset..offset + length` lies inside the buffer.
    pub(crate) fn contains_range(&self, offset: u32, length: u32) -> bool {
        u64::from(offset) + u64::from(length) <= self.descriptor.size
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::dummy::DummyDriver;
    use crate::driver::Driver;
    use crate::DeviceParameters;

    fn buffer(size: u64) -> Buffer {
        let driver = DummyDriver::new(&DeviceParameters::new()).unwrap();
        let descriptor = BufferDescriptor::new(size).with_usage(BufferUsage::VERTEX);
        let raw = driver.create_buffer(&descriptor).unwrap();
        Buffer::new(DeviceRef::detached(), raw, descriptor)
    }

    #[test]
    fn test_buffer_debug() {
        let debug = format!("{:?}", buffer(1024));
        assert!(debug.contains("Buffer"));
        assert!(debug.contains("1024"));
    }

    #[test]
    fn test_range_check() {
        let buffer = buffer(256);
        assert!(buffer.contains_range(0, 256));
        assert!(buffer.contains_range(128, 128));
        assert!(!buffer.contains_range(200, 64));
        assert!(!buffer.contains_range(u32::MAX, u32::MAX));
        assert!(buffer.device().is_none());
    }
}
