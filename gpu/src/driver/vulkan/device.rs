//! Physical device enumeration and logical device creation.

use std::ffi::{c_char, CString};

use ash::vk;

use super::conversion::{convert_adapter_type, convert_queue_flags, map_vk_error};
use crate::adapter::{
    AdapterDescription, AdapterInfo, QueueCapabilities, QueueFamilyDescriptor, SurfaceSupport,
};
use crate::builder::{LogicalDevicePlan, SupportedFeatures};
use crate::capabilities::DeviceExtensions;
use crate::error::{GpuError, GpuResult};
use crate::logging::DeviceLogger;

use super::instance::REQUIRED_API_VERSION;

/// A physical device together with its selection description.
pub struct PhysicalCandidate {
    pub handle: vk::PhysicalDevice,
    pub description: AdapterDescription,
    pub features: SupportedFeatures,
}

/// Read a null-terminated string out of a fixed-size array.
pub fn fixed_str(chars: &[c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Describe every physical device that meets the API version floor.
///
/// Presentation is not a selection criterion here; queue families are
/// checked against a concrete surface when a window is claimed.
pub fn probe_adapters(
    instance: &ash::Instance,
    logger: &DeviceLogger,
) -> GpuResult<Vec<PhysicalCandidate>> {
    let physical_devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GpuError::Unsupported(format!("failed to enumerate physical devices: {e:?}"))
    })?;

    let mut candidates = Vec::with_capacity(physical_devices.len());
    for handle in physical_devices {
        let properties = unsafe { instance.get_physical_device_properties(handle) };
        let name = fixed_str(&properties.device_name);

        if properties.api_version < REQUIRED_API_VERSION {
            logger.debug(format_args!(
                "adapter '{name}' skipped: Vulkan {}.{} device",
                vk::api_version_major(properties.api_version),
                vk::api_version_minor(properties.api_version)
            ));
            continue;
        }

        let extensions = match unsafe { instance.enumerate_device_extension_properties(handle) } {
            Ok(list) => {
                DeviceExtensions::from_names(list.iter().map(|ext| fixed_str(&ext.extension_name)))
            }
            Err(e) => {
                logger.debug(format_args!(
                    "adapter '{name}': extension enumeration failed: {e:?}"
                ));
                DeviceExtensions::empty()
            }
        };

        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(handle) }
                .iter()
                .enumerate()
                .map(|(index, family)| {
                    let capabilities = if family.queue_count > 0 {
                        convert_queue_flags(family.queue_flags)
                    } else {
                        QueueCapabilities::empty()
                    };
                    QueueFamilyDescriptor::new(index as u32, capabilities, false)
                })
                .collect();

        let features = unsafe { instance.get_physical_device_features(handle) };
        let features = SupportedFeatures {
            fill_mode_non_solid: features.fill_mode_non_solid == vk::TRUE,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        };

        let description = AdapterDescription::new(name, convert_adapter_type(properties.device_type))
            .with_extensions(extensions)
            .with_queue_families(queue_families)
            .with_surface_support(SurfaceSupport::Headless);

        candidates.push(PhysicalCandidate {
            handle,
            description,
            features,
        });
    }

    Ok(candidates)
}

/// Create the logical device described by `plan` with a single queue.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    plan: &LogicalDevicePlan,
) -> GpuResult<ash::Device> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(plan.queue_family)
        .queue_priorities(&queue_priorities)];

    let extension_names = plan
        .extension_names()
        .map(|name| {
            CString::new(name)
                .map_err(|_| GpuError::Backend(format!("invalid extension name {name}")))
        })
        .collect::<GpuResult<Vec<_>>>()?;
    let extension_ptrs: Vec<*const c_char> =
        extension_names.iter().map(|name| name.as_ptr()).collect();

    let features = vk::PhysicalDeviceFeatures::default()
        .fill_mode_non_solid(plan.features.fill_mode_non_solid)
        .sampler_anisotropy(plan.features.sampler_anisotropy);

    let mut portability = vk::PhysicalDevicePortabilitySubsetFeaturesKHR::default()
        .image_view_format_swizzle(true);

    let mut create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_ptrs)
        .enabled_features(&features);
    if plan.needs_portability_features() {
        create_info = create_info.push_next(&mut portability);
    }

    unsafe { instance.create_device(physical_device, &create_info, None) }
        .map_err(|e| map_vk_error("vkCreateDevice", e))
}

/// Fill in the driver fields of `info` when the driver can report them.
pub fn query_driver_properties(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    info: &mut AdapterInfo,
) {
    let mut driver = vk::PhysicalDeviceDriverProperties::default();
    {
        let mut properties = vk::PhysicalDeviceProperties2::default().push_next(&mut driver);
        unsafe { instance.get_physical_device_properties2(physical_device, &mut properties) };
    }

    info.driver_name = Some(fixed_str(&driver.driver_name));
    info.driver_info = Some(fixed_str(&driver.driver_info));
    let version = driver.conformance_version;
    info.conformance_version = Some(format!(
        "{}.{}.{}.{}",
        version.major, version.minor, version.subminor, version.patch
    ));
}

/// Properties of the device needed while recording.
pub fn device_limits(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> vk::PhysicalDeviceLimits {
    unsafe { instance.get_physical_device_properties(physical_device) }.limits
}

/// Whether `format` supports `features` with optimal tiling.
pub fn format_supports(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    features: vk::FormatFeatureFlags,
) -> bool {
    let properties =
        unsafe { instance.get_physical_device_format_properties(physical_device, format) };
    properties.optimal_tiling_features.contains(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_str_stops_at_nul() {
        let mut raw = [0 as c_char; 16];
        for (dst, src) in raw.iter_mut().zip(b"llvmpipe") {
            *dst = *src as c_char;
        }
        assert_eq!(fixed_str(&raw), "llvmpipe");
        assert_eq!(fixed_str(&[0; 4]), "");
    }
}
