//! Texture sampler resource.

use std::sync::Arc;

use super::DeviceRef;
use crate::device::GpuDevice;
use crate::driver::GpuSampler;
use crate::types::SamplerDescriptor;

/// A texture sampler.
///
/// Samplers are immutable. Identical descriptors can share one sampler
/// through [`StateCache`](crate::StateCache).
pub struct Sampler {
    pub(super) device: DeviceRef,
    raw: GpuSampler,
    descriptor: SamplerDescriptor,
}

impl Sampler {
    pub(crate) fn new(device: DeviceRef, raw: GpuSampler, descriptor: SamplerDescriptor) -> Self {
        Self {
            device,
            raw,
            descriptor,
        }
    }

    pub(crate) fn raw(&self) -> &GpuSampler {
        &self.raw
    }

    pub fn device(&self) -> Option<Arc<GpuDevice>> {
        self.device.upgrade()
    }

    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("min_filter", &self.descriptor.min_filter)
            .field("mag_filter", &self.descriptor.mag_filter)
            .field("mip_filter", &self.descriptor.mip_filter)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Sampler: Send, Sync);
