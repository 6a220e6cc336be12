//! GPU texture resource.

use std::sync::Arc;

use super::DeviceRef;
use crate::device::GpuDevice;
use crate::driver::GpuTexture;
use crate::types::{
    Extent3d, PixelFormat, TextureDescriptor, TextureRegion, TextureType, TextureUsage,
};

/// A GPU texture resource.
///
/// Textures are created by [`GpuDevice::create_texture`]. Swap chain images
/// handed out by [`GpuDevice::acquire_backbuffer`] are textures too; they are
/// valid until the next present of their window.
///
/// # Example
///
/// ```ignore
/// let texture = device.create_texture(&TextureDescriptor::new_2d(
///     1920, 1080,
///     PixelFormat::Rgba8Unorm,
///     TextureUsage::RENDER_TARGET,
/// ))?;
/// println!("Texture size: {}x{}", texture.width(), texture.height());
/// ```
pub struct Texture {
    pub(super) device: DeviceRef,
    raw: GpuTexture,
    descriptor: TextureDescriptor,
    backbuffer: bool,
}

impl Texture {
    pub(crate) fn new(device: DeviceRef, raw: GpuTexture, descriptor: TextureDescriptor) -> Self {
        Self {
            device,
            raw,
            descriptor,
            backbuffer: false,
        }
    }

    pub(crate) fn new_backbuffer(
        device: DeviceRef,
        raw: GpuTexture,
        descriptor: TextureDescriptor,
    ) -> Self {
        Self {
            backbuffer: true,
            ..Self::new(device, raw, descriptor)
        }
    }

    pub(crate) fn raw(&self) -> &GpuTexture {
        &self.raw
    }

    /// Get the parent device, if it still exists.
    pub fn device(&self) -> Option<Arc<GpuDevice>> {
        self.device.upgrade()
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn texture_type(&self) -> TextureType {
        self.descriptor.texture_type
    }

    pub fn format(&self) -> PixelFormat {
        self.descriptor.format
    }

    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    /// Full size of mip level 0.
    pub fn extent(&self) -> Extent3d {
        self.descriptor.extent()
    }

    pub fn mip_levels(&self) -> u32 {
        self.descriptor.mip_levels
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Whether this texture is a swap chain image.
    pub fn is_backbuffer(&self) -> bool {
        self.backbuffer
    }

    /// Whether a box of `extent` at `region` lies inside the texture.
    pub(crate) fn contains_region(&self, region: &TextureRegion, extent: Extent3d) -> bool {
        if region.level >= self.descriptor.mip_levels
            || region.slice >= self.descriptor.array_layers()
        {
            return false;
        }
        let size = self.descriptor.mip_extent(region.level);
        let fits = |origin: u32, len: u32, max: u32| u64::from(origin) + u64::from(len) <= u64::from(max);
        fits(region.origin.x, extent.width, size.width)
            && fits(region.origin.y, extent.height, size.height)
            && fits(region.origin.z, extent.depth, size.depth)
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("type", &self.descriptor.texture_type)
            .field("size", &(self.descriptor.width, self.descriptor.height))
            .field("format", &self.descriptor.format)
            .field("usage", &self.descriptor.usage)
            .field("backbuffer", &self.backbuffer)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::driver::dummy::DummyTexture;
    use crate::types::Origin3d;

    /// Texture with no device behind it.
    pub(crate) fn detached(descriptor: TextureDescriptor) -> Texture {
        Texture::new(
            DeviceRef::detached(),
            GpuTexture::Dummy(DummyTexture),
            descriptor,
        )
    }

    #[test]
    fn test_texture_accessors() {
        let texture = detached(
            TextureDescriptor::new_2d(64, 32, PixelFormat::Bgra8Unorm, TextureUsage::SHADER_READ)
                .with_label("albedo"),
        );
        assert_eq!(texture.width(), 64);
        assert_eq!(texture.height(), 32);
        assert_eq!(texture.format(), PixelFormat::Bgra8Unorm);
        assert_eq!(texture.label(), Some("albedo"));
        assert!(!texture.is_backbuffer());
        assert!(format!("{texture:?}").contains("albedo"));
    }

    #[test]
    fn test_region_bounds_follow_mip_chain() {
        let texture = detached(
            TextureDescriptor::new_2d(64, 64, PixelFormat::Rgba8Unorm, TextureUsage::SHADER_READ)
                .with_mip_levels(3),
        );
        let level1 = TextureRegion::new(0, 1, Origin3d::ZERO);
        assert!(texture.contains_region(&level1, Extent3d::new_2d(32, 32)));
        assert!(!texture.contains_region(&level1, Extent3d::new_2d(33, 32)));

        let offset = TextureRegion::new(0, 2, Origin3d::new(8, 8, 0));
        assert!(texture.contains_region(&offset, Extent3d::new_2d(8, 8)));
        assert!(!texture.contains_region(&TextureRegion::new(0, 3, Origin3d::ZERO), Extent3d::new_2d(1, 1)));
        assert!(!texture.contains_region(&TextureRegion::new(1, 0, Origin3d::ZERO), Extent3d::new_2d(1, 1)));
    }
}
