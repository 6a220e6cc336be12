//! Vulkan instance creation.

use std::ffi::{c_char, CStr, CString};

use ash::vk;

use super::conversion::map_vk_error;
use super::debug::DebugMessenger;
use crate::capabilities::InstanceCapabilities;
use crate::error::{GpuError, GpuResult};
use crate::logging::DeviceLogger;

/// Required Vulkan API version.
pub const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 1, 0);

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Window system surface extensions, enabled when the loader exposes them.
const PLATFORM_SURFACE_EXTENSIONS: &[&CStr] = &[
    ash::khr::win32_surface::NAME,
    ash::khr::xlib_surface::NAME,
    ash::khr::xcb_surface::NAME,
    ash::khr::wayland_surface::NAME,
    ash::khr::android_surface::NAME,
    ash::ext::metal_surface::NAME,
];

/// A created instance and what it was created with.
pub struct InstanceBundle {
    pub instance: ash::Instance,
    pub messenger: Option<DebugMessenger>,
    pub capabilities: InstanceCapabilities,
}

/// Create an instance with the surface extensions the platform offers.
///
/// In debug mode the debug utils extension and the validation layer are
/// enabled when available; their absence is only logged.
pub fn create_instance(
    entry: &ash::Entry,
    app_label: &str,
    debug_mode: bool,
    logger: &DeviceLogger,
) -> GpuResult<InstanceBundle> {
    let version = unsafe { entry.try_enumerate_instance_version() }
        .map_err(|e| map_vk_error("vkEnumerateInstanceVersion", e))?
        .unwrap_or(vk::API_VERSION_1_0);
    if version < REQUIRED_API_VERSION {
        return Err(GpuError::Unsupported(format!(
            "Vulkan {}.{} loader, 1.1 required",
            vk::api_version_major(version),
            vk::api_version_minor(version)
        )));
    }

    let available = unsafe { entry.enumerate_instance_extension_properties(None) }
        .map_err(|e| map_vk_error("vkEnumerateInstanceExtensionProperties", e))?;
    let available: Vec<&CStr> = available
        .iter()
        // SAFETY: extension names are null-terminated fixed arrays
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
        .collect();
    let has = |name: &CStr| available.contains(&name);

    if !has(ash::khr::surface::NAME) {
        return Err(GpuError::Unsupported(
            "VK_KHR_surface is not available".to_string(),
        ));
    }

    let mut extensions: Vec<*const c_char> = vec![ash::khr::surface::NAME.as_ptr()];
    for name in PLATFORM_SURFACE_EXTENSIONS {
        if has(name) {
            extensions.push(name.as_ptr());
        }
    }

    let mut create_flags = vk::InstanceCreateFlags::empty();
    if has(ash::khr::portability_enumeration::NAME) {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
        create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let mut capabilities = InstanceCapabilities::default();
    let mut layer_names: Vec<*const c_char> = Vec::new();
    if debug_mode {
        if has(ash::ext::debug_utils::NAME) {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            capabilities.debug_utils = true;
        } else {
            logger.warn(format_args!(
                "debug mode requested but VK_EXT_debug_utils is not available"
            ));
        }
        if check_validation_layer_support(entry) {
            layer_names.push(VALIDATION_LAYER_NAME.as_ptr());
            capabilities.validation = true;
        } else {
            logger.warn(format_args!(
                "debug mode requested but validation layers are not available"
            ));
        }
    }

    let app_name = CString::new(app_label).unwrap_or_else(|_| c"RedLilium".to_owned());
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"RedLilium Engine")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    let create_info = vk::InstanceCreateInfo::default()
        .flags(create_flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(|e| map_vk_error("vkCreateInstance", e))?;

    let messenger = if capabilities.debug_utils {
        match DebugMessenger::new(entry, &instance, logger) {
            Ok(messenger) => Some(messenger),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        }
    } else {
        None
    };

    logger.debug(format_args!(
        "Vulkan instance created ({} extensions, validation: {})",
        extensions.len(),
        capabilities.validation
    ));

    Ok(InstanceBundle {
        instance,
        messenger,
        capabilities,
    })
}

fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let available_layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers,
        Err(_) => return false,
    };

    available_layers.iter().any(|layer| {
        // SAFETY: layer names are null-terminated fixed arrays
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == VALIDATION_LAYER_NAME
    })
}
