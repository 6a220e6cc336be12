//! Capability negotiation.
//!
//! Before any device object is created, the extensions an adapter advertises
//! are partitioned into the ones this crate cannot run without and the ones
//! that merely change behavior when present.
//!
//! | Group | Extension | Purpose |
//! |---|---|---|
//! | required | `VK_KHR_swapchain` | presentation |
//! | required | `VK_KHR_maintenance1` | baseline fixes (negative viewport height, 3D copies) |
//! | required | `VK_KHR_dedicated_allocation` | dedicated-allocation hint |
//! | required | `VK_KHR_get_memory_requirements2` | memory-requirements query |
//! | optional | `VK_KHR_driver_properties` | driver name/version reporting |
//! | optional | `VK_KHR_portability_subset` | non-conformant implementations |
//! | optional | `VK_GGP_frame_token` | vendor frame pacing hint |

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Set of device extensions known to this crate.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceExtensions: u32 {
        const KHR_SWAPCHAIN = 1 << 0;
        const KHR_MAINTENANCE1 = 1 << 1;
        const KHR_DEDICATED_ALLOCATION = 1 << 2;
        const KHR_GET_MEMORY_REQUIREMENTS2 = 1 << 3;
        const KHR_DRIVER_PROPERTIES = 1 << 4;
        const KHR_PORTABILITY_SUBSET = 1 << 5;
        const GGP_FRAME_TOKEN = 1 << 6;

        /// Extensions without which device creation fails.
        const REQUIRED = Self::KHR_SWAPCHAIN.bits()
            | Self::KHR_MAINTENANCE1.bits()
            | Self::KHR_DEDICATED_ALLOCATION.bits()
            | Self::KHR_GET_MEMORY_REQUIREMENTS2.bits();

        /// Extensions enabled when present, ignored otherwise.
        const OPTIONAL = Self::KHR_DRIVER_PROPERTIES.bits()
            | Self::KHR_PORTABILITY_SUBSET.bits()
            | Self::GGP_FRAME_TOKEN.bits();
    }
}

static EXTENSION_NAMES: [(DeviceExtensions, &str); 7] = [
    (DeviceExtensions::KHR_SWAPCHAIN, "VK_KHR_swapchain"),
    (DeviceExtensions::KHR_MAINTENANCE1, "VK_KHR_maintenance1"),
    (
        DeviceExtensions::KHR_DEDICATED_ALLOCATION,
        "VK_KHR_dedicated_allocation",
    ),
    (
        DeviceExtensions::KHR_GET_MEMORY_REQUIREMENTS2,
        "VK_KHR_get_memory_requirements2",
    ),
    (
        DeviceExtensions::KHR_DRIVER_PROPERTIES,
        "VK_KHR_driver_properties",
    ),
    (
        DeviceExtensions::KHR_PORTABILITY_SUBSET,
        "VK_KHR_portability_subset",
    ),
    (DeviceExtensions::GGP_FRAME_TOKEN, "VK_GGP_frame_token"),
];

impl DeviceExtensions {
    /// Build the set from the extension names an adapter advertises.
    ///
    /// Unknown names are ignored.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| Self::from_extension_name(name.as_ref()))
            .fold(Self::empty(), |acc, ext| acc | ext)
    }

    /// Look up a single known extension by name.
    pub fn from_extension_name(name: &str) -> Option<Self> {
        EXTENSION_NAMES
            .iter()
            .find(|(_, known)| *known == name)
            .map(|(ext, _)| *ext)
    }

    /// Every required extension is present.
    pub fn supports_required(self) -> bool {
        self.contains(Self::REQUIRED)
    }

    /// Required extensions absent from this set.
    pub fn missing_required(self) -> Self {
        Self::REQUIRED - self
    }

    /// The extensions to enable on the logical device: every known one the
    /// adapter supports.
    pub fn enabled(self) -> Self {
        self & (Self::REQUIRED | Self::OPTIONAL)
    }

    /// Extension names of the members of this set, in table order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        EXTENSION_NAMES
            .iter()
            .filter(move |(ext, _)| self.contains(*ext))
            .map(|(_, name)| *name)
    }
}

/// Optional instance-level capabilities recorded at instance creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceCapabilities {
    /// `VK_EXT_debug_utils` is available and enabled.
    pub debug_utils: bool,
    /// The Khronos validation layer is loaded.
    pub validation: bool,
}

/// Capability record exposed by a device once it exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Instance-level optional capabilities.
    pub instance: InstanceCapabilities,
    /// Device extensions that were enabled.
    pub extensions: DeviceExtensions,
    /// `fillModeNonSolid` was enabled.
    pub fill_mode_non_solid: bool,
    /// `samplerAnisotropy` was enabled.
    pub sampler_anisotropy: bool,
}

impl DeviceCapabilities {
    /// Driver name and version can be reported.
    pub fn has_driver_properties(&self) -> bool {
        self.extensions
            .contains(DeviceExtensions::KHR_DRIVER_PROPERTIES)
    }

    /// The implementation is not fully conformant and needs portability shims.
    pub fn is_portability_subset(&self) -> bool {
        self.extensions
            .contains(DeviceExtensions::KHR_PORTABILITY_SUBSET)
    }
}

/// Formats a set of extensions as a comma separated name list.
pub struct ExtensionList(pub DeviceExtensions);

impl fmt::Display for ExtensionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for name in self.0.names() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_names_ignores_unknown() {
        let exts = DeviceExtensions::from_names([
            "VK_KHR_swapchain",
            "VK_KHR_maintenance1",
            "VK_EXT_something_else",
            "VK_KHR_driver_properties",
        ]);
        assert_eq!(
            exts,
            DeviceExtensions::KHR_SWAPCHAIN
                | DeviceExtensions::KHR_MAINTENANCE1
                | DeviceExtensions::KHR_DRIVER_PROPERTIES
        );
    }

    #[test]
    fn test_extension_name_lookup() {
        assert_eq!(
            DeviceExtensions::from_extension_name("VK_KHR_swapchain"),
            Some(DeviceExtensions::KHR_SWAPCHAIN)
        );
        assert_eq!(DeviceExtensions::from_extension_name("KHR_SWAPCHAIN"), None);
        assert_eq!(
            DeviceExtensions::from_name("KHR_SWAPCHAIN"),
            Some(DeviceExtensions::KHR_SWAPCHAIN)
        );
    }

    #[test]
    fn test_missing_required() {
        let exts = DeviceExtensions::KHR_SWAPCHAIN | DeviceExtensions::KHR_MAINTENANCE1;
        assert!(!exts.supports_required());
        assert_eq!(
            exts.missing_required(),
            DeviceExtensions::KHR_DEDICATED_ALLOCATION
                | DeviceExtensions::KHR_GET_MEMORY_REQUIREMENTS2
        );
        assert!(DeviceExtensions::REQUIRED.supports_required());
        assert!(DeviceExtensions::REQUIRED.missing_required().is_empty());
    }

    #[test]
    fn test_optional_does_not_affect_required_check() {
        let exts = DeviceExtensions::REQUIRED | DeviceExtensions::GGP_FRAME_TOKEN;
        assert!(exts.supports_required());
        assert!(DeviceExtensions::OPTIONAL.missing_required() == DeviceExtensions::REQUIRED);
    }

    #[test]
    fn test_extension_list_display() {
        let missing = DeviceExtensions::KHR_SWAPCHAIN | DeviceExtensions::KHR_MAINTENANCE1;
        assert_eq!(
            ExtensionList(missing).to_string(),
            "VK_KHR_swapchain, VK_KHR_maintenance1"
        );
        assert_eq!(ExtensionList(DeviceExtensions::empty()).to_string(), "");
    }

    #[test]
    fn test_capability_flags() {
        let caps = DeviceCapabilities {
            extensions: DeviceExtensions::REQUIRED | DeviceExtensions::KHR_PORTABILITY_SUBSET,
            ..Default::default()
        };
        assert!(caps.is_portability_subset());
        assert!(!caps.has_driver_properties());
    }
}
