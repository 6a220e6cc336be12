//! Buffer types and descriptors.

use bitflags::bitflags;

use crate::error::{GpuError, GpuResult};

bitflags! {
    /// Ways a GPU buffer may be bound.
    ///
    /// Every buffer can be the source or destination of blit operations
    /// regardless of these flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be bound as vertex input.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be bound as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be bound as a storage buffer.
        const STORAGE = 1 << 3;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::all()
    }
}

/// Descriptor for creating a GPU buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a buffer descriptor usable in every binding role.
    pub fn new(size: u64) -> Self {
        Self {
            label: None,
            size,
            usage: BufferUsage::all(),
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Restrict the usage flags.
    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    pub(crate) fn validate(&self) -> GpuResult<()> {
        if self.size == 0 {
            return Err(GpuError::InvalidParameter(
                "buffer size must be non-zero".to_string(),
            ));
        }
        if self.usage.is_empty() {
            return Err(GpuError::InvalidParameter(
                "buffer usage must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_descriptor_builder() {
        let desc = BufferDescriptor::new(1024)
            .with_label("vertices")
            .with_usage(BufferUsage::VERTEX);
        assert_eq!(desc.size, 1024);
        assert_eq!(desc.usage, BufferUsage::VERTEX);
        assert_eq!(desc.label.as_deref(), Some("vertices"));
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(
            BufferDescriptor::new(0).validate(),
            Err(GpuError::InvalidParameter(_))
        ));
        assert!(BufferDescriptor::new(4)
            .with_usage(BufferUsage::empty())
            .validate()
            .is_err());
    }
}
