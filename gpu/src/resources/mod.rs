//! GPU resources.
//!
//! This module contains the resource types created by [`GpuDevice`]:
//! - [`Buffer`] - GPU memory buffer
//! - [`CpuBuffer`] - host-visible staging buffer
//! - [`Texture`] - GPU texture, including swap chain backbuffers
//! - [`Sampler`] - texture sampler
//! - [`Shader`] - compiled shader module
//! - [`Pipeline`] - graphics pipeline
//! - [`ResourceCycle`] - fixed ring of per-frame resources
//!
//! Each resource holds a weak reference back to its parent device. Passing a
//! resource to a device that did not create it is a
//! [`ContractViolation::ForeignResource`](crate::ContractViolation::ForeignResource).
//! Dropping the last handle releases the native object.
//!
//! [`GpuDevice`]: crate::GpuDevice

mod buffer;
mod cpu_buffer;
mod cycle;
mod pipeline;
mod sampler;
mod shader;
pub(crate) mod texture;

use std::sync::{Arc, Weak};

use crate::device::GpuDevice;

pub use buffer::Buffer;
pub use cpu_buffer::{CpuBuffer, CpuBufferLock};
pub use cycle::ResourceCycle;
pub use pipeline::Pipeline;
pub use sampler::Sampler;
pub use shader::Shader;
pub use texture::Texture;

/// Weak link from a resource to the device that created it.
#[derive(Clone, Default)]
pub(crate) struct DeviceRef(Weak<GpuDevice>);

impl DeviceRef {
    pub(crate) fn new(device: &Arc<GpuDevice>) -> Self {
        Self(Arc::downgrade(device))
    }

    /// A link to no device, for resources built in unit tests.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self(Weak::new())
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<GpuDevice>> {
        self.0.upgrade()
    }

    /// Whether the resource was created by `device`.
    pub(crate) fn is(&self, device: &GpuDevice) -> bool {
        std::ptr::eq(self.0.as_ptr(), device)
    }
}

/// Implemented by every resource that belongs to a device.
pub(crate) trait DeviceOwned {
    fn owner(&self) -> &DeviceRef;
}

macro_rules! device_owned {
    ($($ty:ty),* $(,)?) => {
        $(
            impl DeviceOwned for $ty {
                fn owner(&self) -> &DeviceRef {
                    &self.device
                }
            }
        )*
    };
}

device_owned!(Buffer, CpuBuffer, Texture, Sampler, Shader, Pipeline);
