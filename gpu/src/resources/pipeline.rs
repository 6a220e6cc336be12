//! Graphics pipeline resource.

use std::sync::Arc;

use super::DeviceRef;
use crate::device::GpuDevice;
use crate::driver::GpuPipeline;
use crate::types::PipelineDescriptor;

/// A compiled graphics pipeline.
///
/// The pipeline keeps its descriptor, and with it both shaders, alive.
pub struct Pipeline {
    pub(super) device: DeviceRef,
    raw: GpuPipeline,
    descriptor: PipelineDescriptor,
}

impl Pipeline {
    pub(crate) fn new(device: DeviceRef, raw: GpuPipeline, descriptor: PipelineDescriptor) -> Self {
        Self {
            device,
            raw,
            descriptor,
        }
    }

    pub(crate) fn raw(&self) -> &GpuPipeline {
        &self.raw
    }

    pub fn device(&self) -> Option<Arc<GpuDevice>> {
        self.device.upgrade()
    }

    pub fn descriptor(&self) -> &PipelineDescriptor {
        &self.descriptor
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("topology", &self.descriptor.topology)
            .field("color_attachments", &self.descriptor.color_attachments.len())
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);
