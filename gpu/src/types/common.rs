//! Common types shared by pass recording and copy operations.

// ============================================================================
// Viewport / scissor
// ============================================================================

/// Viewport configuration for a render pass.
///
/// Depth range is `[0, 1]` by default, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// X coordinate of the viewport's top-left corner.
    pub x: f32,
    /// Y coordinate of the viewport's top-left corner.
    pub y: f32,
    /// Width of the viewport.
    pub width: f32,
    /// Height of the viewport.
    pub height: f32,
    /// Minimum depth value.
    pub min_depth: f32,
    /// Maximum depth value.
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl Viewport {
    /// Create a viewport with the standard `[0, 1]` depth range.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the depth range.
    pub fn with_depth_range(mut self, min_depth: f32, max_depth: f32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }
}

/// Scissor rectangle in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

// ============================================================================
// Color
// ============================================================================

/// RGBA color with floating point components.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

// ============================================================================
// Draw parameters
// ============================================================================

/// Element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    #[default]
    U16,
    U32,
}

impl IndexType {
    /// Size of one index in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Comparison function for depth/stencil tests and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

// ============================================================================
// Copy regions
// ============================================================================

/// Texel coordinate inside a texture subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Origin3d {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Origin3d {
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// Size of a copied box in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Default for Extent3d {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
        }
    }
}

impl Extent3d {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    pub fn new_2d(width: u32, height: u32) -> Self {
        Self::new(width, height, 1)
    }

    /// Whether any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }
}

/// One side of a texture copy: array slice, mip level and texel origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureRegion {
    /// Array slice (or cube face).
    pub slice: u32,
    /// Mip level.
    pub level: u32,
    /// Texel origin inside the level.
    pub origin: Origin3d,
}

impl TextureRegion {
    pub fn new(slice: u32, level: u32, origin: Origin3d) -> Self {
        Self {
            slice,
            level,
            origin,
        }
    }

    /// The full first level of the first slice.
    pub fn base() -> Self {
        Self::default()
    }
}

/// Layout of texel rows inside a buffer used for buffer/texture copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferImageLayout {
    /// Byte offset of the first texel.
    pub offset: u32,
    /// Bytes between consecutive rows; 0 means tightly packed.
    pub bytes_per_row: u32,
    /// Bytes between consecutive images of a 3D box; 0 means tightly packed.
    pub bytes_per_image: u32,
}

impl BufferImageLayout {
    pub fn new(offset: u32, bytes_per_row: u32, bytes_per_image: u32) -> Self {
        Self {
            offset,
            bytes_per_row,
            bytes_per_image,
        }
    }

    /// A tightly packed layout starting at `offset`.
    pub fn packed(offset: u32) -> Self {
        Self::new(offset, 0, 0)
    }

    /// Bytes the copy of `extent` covers in the buffer, given the texel size.
    pub fn required_size(&self, extent: Extent3d, bytes_per_pixel: u32) -> u64 {
        let row = if self.bytes_per_row == 0 {
            u64::from(extent.width) * u64::from(bytes_per_pixel)
        } else {
            u64::from(self.bytes_per_row)
        };
        let image = if self.bytes_per_image == 0 {
            row * u64::from(extent.height)
        } else {
            u64::from(self.bytes_per_image)
        };
        if extent.is_empty() {
            return u64::from(self.offset);
        }
        let last_row = u64::from(extent.width) * u64::from(bytes_per_pixel);
        u64::from(self.offset)
            + image * u64::from(extent.depth - 1)
            + row * u64::from(extent.height - 1)
            + last_row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_defaults() {
        let viewport = Viewport::new(0.0, 0.0, 640.0, 480.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
        let viewport = viewport.with_depth_range(0.25, 0.5);
        assert_eq!(viewport.max_depth, 0.5);
    }

    #[test]
    fn test_index_size() {
        assert_eq!(IndexType::U16.size(), 2);
        assert_eq!(IndexType::U32.size(), 4);
    }

    #[test]
    fn test_packed_layout_size() {
        let layout = BufferImageLayout::packed(16);
        assert_eq!(layout.required_size(Extent3d::new_2d(4, 4), 4), 16 + 64);
    }

    #[test]
    fn test_pitched_layout_size() {
        // Last row only needs its texels, not the full pitch.
        let layout = BufferImageLayout::new(0, 256, 0);
        assert_eq!(layout.required_size(Extent3d::new_2d(4, 2), 4), 256 + 16);
        let layout = BufferImageLayout::new(0, 16, 64);
        assert_eq!(layout.required_size(Extent3d::new(4, 2, 2), 4), 64 + 16 + 16);
    }
}
