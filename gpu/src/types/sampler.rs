//! Sampler types and descriptors.

use super::CompareFunction;

/// How texture coordinates outside `[0, 1]` are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    MirrorClampToEdge,
    Repeat,
    MirrorRepeat,
    /// Out of range reads return transparent black.
    ClampToZero,
    /// Out of range reads return the sampler's border color.
    ClampToBorderColor,
}

/// Border color used by [`AddressMode::ClampToBorderColor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColor {
    #[default]
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

/// Texel filter for minification and magnification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

/// Filter between mip levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipFilter {
    /// Only level 0 is ever sampled.
    #[default]
    NotMipmapped,
    Nearest,
    Linear,
}

/// Descriptor for creating a sampler.
///
/// Every field is hashable so identical descriptors can share one sampler
/// through a [`StateCache`](crate::StateCache).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SamplerDescriptor {
    /// Debug label for the sampler.
    pub label: Option<String>,
    /// Address mode for U coordinate.
    pub address_mode_u: AddressMode,
    /// Address mode for V coordinate.
    pub address_mode_v: AddressMode,
    /// Address mode for W coordinate.
    pub address_mode_w: AddressMode,
    pub border_color: BorderColor,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Mipmap filter.
    pub mip_filter: MipFilter,
    /// Maximum anisotropy level, 1 disables anisotropic filtering.
    pub max_anisotropy: u16,
    /// Comparison function for depth sampling.
    pub compare: Option<CompareFunction>,
}

impl SamplerDescriptor {
    /// Create a new sampler descriptor with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a linear filtering sampler.
    pub fn linear() -> Self {
        Self {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mip_filter: MipFilter::Linear,
            ..Default::default()
        }
    }

    /// Create a nearest neighbor filtering sampler.
    pub fn nearest() -> Self {
        Self {
            min_filter: FilterMode::Nearest,
            mag_filter: FilterMode::Nearest,
            mip_filter: MipFilter::Nearest,
            ..Default::default()
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set address mode for all coordinates.
    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_mode_u = mode;
        self.address_mode_v = mode;
        self.address_mode_w = mode;
        self
    }

    pub fn with_border_color(mut self, color: BorderColor) -> Self {
        self.border_color = color;
        self
    }

    /// Set comparison function for depth sampling.
    pub fn with_compare(mut self, compare: CompareFunction) -> Self {
        self.compare = Some(compare);
        self
    }

    /// Set anisotropic filtering level.
    pub fn with_anisotropy(mut self, level: u16) -> Self {
        self.max_anisotropy = level;
        self
    }
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            border_color: BorderColor::TransparentBlack,
            min_filter: FilterMode::Nearest,
            mag_filter: FilterMode::Nearest,
            mip_filter: MipFilter::NotMipmapped,
            max_anisotropy: 1,
            compare: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_presets() {
        let linear = SamplerDescriptor::linear();
        assert_eq!(linear.mag_filter, FilterMode::Linear);
        assert_eq!(linear.mip_filter, MipFilter::Linear);
        let desc = SamplerDescriptor::new().with_address_mode(AddressMode::Repeat);
        assert_eq!(desc.address_mode_w, AddressMode::Repeat);
    }

    #[test]
    fn test_hash_distinguishes_label() {
        let mut set = HashSet::new();
        set.insert(SamplerDescriptor::linear());
        set.insert(SamplerDescriptor::linear());
        set.insert(SamplerDescriptor::linear().with_label("ui"));
        assert_eq!(set.len(), 2);
    }
}
