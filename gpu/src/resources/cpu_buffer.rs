//! Host-visible staging buffers.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::MappedMutexGuard;

use super::DeviceRef;
use crate::device::GpuDevice;
use crate::driver::GpuCpuBuffer;
use crate::error::{GpuError, GpuResult};

/// A buffer the CPU can read and write.
///
/// CPU buffers are the source and destination of
/// [`CommandBuffer::copy_cpu_to_gpu`](crate::CommandBuffer::copy_cpu_to_gpu) and
/// [`CommandBuffer::copy_gpu_to_cpu`](crate::CommandBuffer::copy_gpu_to_cpu).
/// Access the contents with [`lock`](Self::lock); the GPU must not be using
/// the buffer while it is locked.
///
/// # Example
///
/// ```ignore
/// let staging = device.create_cpu_buffer(Some("staging"), 256, None)?;
/// staging.lock()?.copy_from_slice(&vertices);
/// ```
pub struct CpuBuffer {
    pub(super) device: DeviceRef,
    raw: GpuCpuBuffer,
    len: usize,
    label: Option<String>,
}

impl CpuBuffer {
    pub(crate) fn new(
        device: DeviceRef,
        raw: GpuCpuBuffer,
        len: usize,
        label: Option<String>,
    ) -> Self {
        Self {
            device,
            raw,
            len,
            label,
        }
    }

    pub(crate) fn raw(&self) -> &GpuCpuBuffer {
        &self.raw
    }

    pub fn device(&self) -> Option<Arc<GpuDevice>> {
        self.device.upgrade()
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether `offset..offset + length` lies inside the buffer.
    pub(crate) fn contains_range(&self, offset: u32, length: u32) -> bool {
        offset as usize as u64 + u64::from(length) <= self.len as u64
    }

    /// Lock the buffer for CPU access.
    ///
    /// Blocks while another lock on the same buffer is held.
    pub fn lock(&self) -> GpuResult<CpuBufferLock<'_>> {
        let device = self
            .device
            .upgrade()
            .ok_or_else(|| GpuError::DeviceLost("device was destroyed".to_string()))?;
        let guard = device.driver().lock_cpu_buffer(&self.raw)?;
        Ok(CpuBufferLock {
            guard,
            device,
            buffer: &self.raw,
        })
    }
}

impl std::fmt::Debug for CpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuBuffer")
            .field("len", &self.len)
            .field("label", &self.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(CpuBuffer: Send, Sync);

/// Exclusive CPU access to the contents of a [`CpuBuffer`].
///
/// The buffer is unlocked when the guard is dropped.
pub struct CpuBufferLock<'a> {
    guard: MappedMutexGuard<'a, [u8]>,
    device: Arc<GpuDevice>,
    buffer: &'a GpuCpuBuffer,
}

impl Deref for CpuBufferLock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

impl DerefMut for CpuBufferLock<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard
    }
}

impl Drop for CpuBufferLock<'_> {
    fn drop(&mut self) {
        // Runs before the guard field is released.
        self.device.driver().unlock_cpu_buffer(self.buffer);
    }
}
