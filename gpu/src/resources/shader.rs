//! Shader module resource.

use std::sync::Arc;

use super::DeviceRef;
use crate::device::GpuDevice;
use crate::driver::GpuShader;
use crate::types::ShaderStage;

/// A compiled shader for one pipeline stage.
///
/// The bytecode is handed to the driver at creation and not kept.
pub struct Shader {
    pub(super) device: DeviceRef,
    raw: GpuShader,
    stage: ShaderStage,
    entry_point: String,
    label: Option<String>,
}

impl Shader {
    pub(crate) fn new(
        device: DeviceRef,
        raw: GpuShader,
        stage: ShaderStage,
        entry_point: String,
        label: Option<String>,
    ) -> Self {
        Self {
            device,
            raw,
            stage,
            entry_point,
            label,
        }
    }

    pub(crate) fn raw(&self) -> &GpuShader {
        &self.raw
    }

    pub fn device(&self) -> Option<Arc<GpuDevice>> {
        self.device.upgrade()
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("stage", &self.stage)
            .field("entry_point", &self.entry_point)
            .field("label", &self.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Shader: Send, Sync);
