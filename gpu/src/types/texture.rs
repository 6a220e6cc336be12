//! Texture types and descriptors.

use bitflags::bitflags;

use super::Extent3d;
use crate::error::{GpuError, GpuResult};

/// Pixel formats a texture can be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 16-bit packed 5/6/5 BGR, unsigned normalized.
    B5G6R5Unorm,
    /// 16-bit packed 5/5/5/1 BGRA, unsigned normalized.
    Bgr5A1Unorm,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,
    /// 24-bit depth with 8-bit stencil.
    Depth24Stencil8,
}

impl PixelFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Self::Depth24Stencil8)
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24Stencil8)
    }

    /// Returns true if this format stores sRGB encoded color.
    pub fn is_srgb(&self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }

    /// Returns the size in bytes per pixel.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::B5G6R5Unorm | Self::Bgr5A1Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Depth24Stencil8 => 4,
        }
    }
}

/// Dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    D1,
    #[default]
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

impl TextureType {
    /// Whether `depth_or_slices` counts array layers rather than depth.
    pub fn is_layered(&self) -> bool {
        matches!(self, Self::D2Array | Self::Cube | Self::CubeArray)
    }

    pub fn is_cube(&self) -> bool {
        matches!(self, Self::Cube | Self::CubeArray)
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture is sampled from in a shader.
        const SHADER_READ = 1 << 0;
        /// Texture is written from a shader.
        const SHADER_WRITE = 1 << 1;
        /// Texture can be a render pass attachment.
        const RENDER_TARGET = 1 << 2;
        /// Texture is never sampled, only read or written.
        const NO_SAMPLE = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::SHADER_READ
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Dimensionality.
    pub texture_type: TextureType,
    /// Pixel format.
    pub format: PixelFormat,
    /// Usage flags.
    pub usage: TextureUsage,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, array layers for layered ones (6 per cube).
    pub depth_or_slices: u32,
    /// Mip level count.
    pub mip_levels: u32,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            texture_type: TextureType::D2,
            format,
            usage,
            width,
            height,
            depth_or_slices: 1,
            mip_levels: 1,
        }
    }

    /// Create a new 3D texture descriptor.
    pub fn new_3d(
        width: u32,
        height: u32,
        depth: u32,
        format: PixelFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            texture_type: TextureType::D3,
            depth_or_slices: depth,
            ..Self::new_2d(width, height, format, usage)
        }
    }

    /// Create a cube map descriptor with six square faces.
    pub fn new_cube(size: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self {
            texture_type: TextureType::Cube,
            depth_or_slices: 6,
            ..Self::new_2d(size, size, format, usage)
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_levels = count;
        self
    }

    /// Set the array layer count of a layered texture.
    pub fn with_slices(mut self, texture_type: TextureType, slices: u32) -> Self {
        self.texture_type = texture_type;
        self.depth_or_slices = slices;
        self
    }

    /// Size of mip level 0.
    pub fn extent(&self) -> Extent3d {
        let depth = if self.texture_type == TextureType::D3 {
            self.depth_or_slices
        } else {
            1
        };
        Extent3d::new(self.width, self.height, depth)
    }

    /// Number of array layers.
    pub fn array_layers(&self) -> u32 {
        if self.texture_type.is_layered() {
            self.depth_or_slices
        } else {
            1
        }
    }

    /// Size of a given mip level, each dimension clamped to 1.
    pub fn mip_extent(&self, level: u32) -> Extent3d {
        let base = self.extent();
        Extent3d::new(
            (base.width >> level).max(1),
            (base.height >> level).max(1),
            (base.depth >> level).max(1),
        )
    }

    /// Longest possible mip chain for this size.
    pub fn max_mip_levels(&self) -> u32 {
        let extent = self.extent();
        let largest = extent.width.max(extent.height).max(extent.depth).max(1);
        32 - largest.leading_zeros()
    }

    pub(crate) fn validate(&self) -> GpuResult<()> {
        let invalid = |msg: String| Err(GpuError::InvalidParameter(msg));

        if self.width == 0 || self.height == 0 || self.depth_or_slices == 0 {
            return invalid(format!(
                "texture size must be non-zero, got {}x{}x{}",
                self.width, self.height, self.depth_or_slices
            ));
        }
        if self.mip_levels == 0 || self.mip_levels > self.max_mip_levels() {
            return invalid(format!(
                "mip level count {} out of range 1..={}",
                self.mip_levels,
                self.max_mip_levels()
            ));
        }
        match self.texture_type {
            TextureType::D1 if self.height != 1 || self.depth_or_slices != 1 => {
                return invalid("1D textures must have height and depth of 1".to_string());
            }
            TextureType::D2 if self.depth_or_slices != 1 => {
                return invalid("2D textures must have a single slice".to_string());
            }
            TextureType::Cube | TextureType::CubeArray => {
                if self.width != self.height {
                    return invalid("cube faces must be square".to_string());
                }
                if self.depth_or_slices % 6 != 0
                    || (self.texture_type == TextureType::Cube && self.depth_or_slices != 6)
                {
                    return invalid(format!(
                        "cube textures need six slices per cube, got {}",
                        self.depth_or_slices
                    ));
                }
            }
            _ => {}
        }
        if self.format.is_depth_stencil() && self.texture_type == TextureType::D3 {
            return invalid("depth/stencil textures cannot be 3D".to_string());
        }
        if self.usage.contains(TextureUsage::SHADER_READ | TextureUsage::NO_SAMPLE) {
            return invalid("SHADER_READ and NO_SAMPLE are mutually exclusive".to_string());
        }
        Ok(())
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self::new_2d(1, 1, PixelFormat::default(), TextureUsage::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_properties() {
        assert!(PixelFormat::Depth24Stencil8.is_depth_stencil());
        assert!(PixelFormat::Depth24Stencil8.has_stencil());
        assert!(!PixelFormat::Rgba8Unorm.is_depth_stencil());
        assert_eq!(PixelFormat::B5G6R5Unorm.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Bgra8UnormSrgb.bytes_per_pixel(), 4);
        assert!(PixelFormat::Rgba8UnormSrgb.is_srgb());
    }

    #[test]
    fn test_max_mip_levels() {
        let desc = TextureDescriptor::new_2d(256, 64, PixelFormat::Rgba8Unorm, TextureUsage::SHADER_READ);
        assert_eq!(desc.max_mip_levels(), 9);
        let desc = TextureDescriptor::new_2d(1, 1, PixelFormat::Rgba8Unorm, TextureUsage::SHADER_READ);
        assert_eq!(desc.max_mip_levels(), 1);
        let desc = TextureDescriptor::new_2d(300, 1, PixelFormat::Rgba8Unorm, TextureUsage::SHADER_READ);
        assert_eq!(desc.max_mip_levels(), 9);
    }

    #[test]
    fn test_mip_extent() {
        let desc = TextureDescriptor::new_2d(64, 16, PixelFormat::Rgba8Unorm, TextureUsage::SHADER_READ)
            .with_mip_levels(7);
        assert_eq!(desc.mip_extent(0), Extent3d::new_2d(64, 16));
        assert_eq!(desc.mip_extent(3), Extent3d::new_2d(8, 2));
        assert_eq!(desc.mip_extent(6), Extent3d::new_2d(1, 1));
    }

    #[test]
    fn test_validation() {
        let usage = TextureUsage::SHADER_READ;
        assert!(TextureDescriptor::new_2d(0, 4, PixelFormat::Rgba8Unorm, usage)
            .validate()
            .is_err());
        assert!(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8Unorm, usage)
            .with_mip_levels(4)
            .validate()
            .is_err());
        assert!(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8Unorm, usage)
            .with_mip_levels(3)
            .validate()
            .is_ok());
        assert!(TextureDescriptor::new_cube(8, PixelFormat::Rgba8Unorm, usage)
            .validate()
            .is_ok());
        assert!(TextureDescriptor::new_2d(8, 4, PixelFormat::Rgba8Unorm, usage)
            .with_slices(TextureType::Cube, 6)
            .validate()
            .is_err());
        assert!(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8Unorm, usage)
            .with_slices(TextureType::CubeArray, 12)
            .validate()
            .is_ok());
        assert!(TextureDescriptor::new_2d(
            4,
            4,
            PixelFormat::Rgba8Unorm,
            TextureUsage::SHADER_READ | TextureUsage::NO_SAMPLE
        )
        .validate()
        .is_err());
    }

    #[test]
    fn test_layers() {
        let desc = TextureDescriptor::new_3d(4, 4, 8, PixelFormat::Rgba8Unorm, TextureUsage::SHADER_READ);
        assert_eq!(desc.extent().depth, 8);
        assert_eq!(desc.array_layers(), 1);
        let desc = TextureDescriptor::new_cube(4, PixelFormat::Rgba8Unorm, TextureUsage::SHADER_READ);
        assert_eq!(desc.extent().depth, 1);
        assert_eq!(desc.array_layers(), 6);
    }
}
