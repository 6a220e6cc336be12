//! Shader descriptors.

use crate::error::{GpuError, GpuResult};

/// Pipeline stage a shader module runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        }
    }
}

/// Descriptor for creating a shader from backend bytecode.
///
/// The bytecode is opaque to this crate: SPIR-V for the Vulkan driver,
/// anything at all for the dummy driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDescriptor {
    pub label: Option<String>,
    pub stage: ShaderStage,
    /// Name of the entry point function.
    pub entry_point: String,
    pub bytecode: Vec<u8>,
}

impl ShaderDescriptor {
    pub fn new(stage: ShaderStage, bytecode: impl Into<Vec<u8>>) -> Self {
        Self {
            label: None,
            stage,
            entry_point: "main".to_string(),
            bytecode: bytecode.into(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub(crate) fn validate(&self) -> GpuResult<()> {
        if self.bytecode.is_empty() {
            return Err(GpuError::InvalidParameter(
                "shader bytecode must not be empty".to_string(),
            ));
        }
        if self.entry_point.is_empty() || self.entry_point.contains('\0') {
            return Err(GpuError::InvalidParameter(format!(
                "invalid shader entry point '{}'",
                self.entry_point
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_validation() {
        assert!(ShaderDescriptor::new(ShaderStage::Vertex, vec![1, 2, 3, 4])
            .validate()
            .is_ok());
        assert!(ShaderDescriptor::new(ShaderStage::Vertex, Vec::new())
            .validate()
            .is_err());
        assert!(ShaderDescriptor::new(ShaderStage::Fragment, vec![0; 4])
            .with_entry_point("")
            .validate()
            .is_err());
    }
}
