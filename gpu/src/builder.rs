//! Logical device planning.
//!
//! Once an adapter is selected, everything about the logical device that does
//! not need a native call is decided here: which queue family to create a
//! queue on, which extensions and features to enable, and whether the
//! portability shims are needed. Drivers turn the plan into native objects.

use crate::adapter::{AdapterDescription, AdapterInfo, AdapterSelection, CandidateVerdict};
use crate::capabilities::{DeviceCapabilities, DeviceExtensions, ExtensionList, InstanceCapabilities};
use crate::error::{GpuError, GpuResult};
use crate::logging::DeviceLogger;

/// Optional device features the adapter reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupportedFeatures {
    pub fill_mode_non_solid: bool,
    pub sampler_anisotropy: bool,
}

/// What the logical device will be created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalDevicePlan {
    /// Queue family of the single unified queue.
    pub queue_family: u32,
    /// Extensions to enable.
    pub extensions: DeviceExtensions,
    pub features: SupportedFeatures,
}

impl LogicalDevicePlan {
    pub fn new(
        adapter: &AdapterDescription,
        selection: &AdapterSelection,
        features: SupportedFeatures,
    ) -> GpuResult<Self> {
        let missing = adapter.extensions.missing_required();
        if !missing.is_empty() {
            return Err(GpuError::Unsupported(format!(
                "adapter '{}' lacks required extensions: {}",
                adapter.name,
                ExtensionList(missing)
            )));
        }
        Ok(Self {
            queue_family: selection.queue_family,
            extensions: adapter.extensions.enabled(),
            features,
        })
    }

    /// The implementation is a portability subset and needs its feature
    /// struct chained into device creation.
    pub fn needs_portability_features(&self) -> bool {
        self.extensions
            .contains(DeviceExtensions::KHR_PORTABILITY_SUBSET)
    }

    /// Names of the extensions to enable.
    pub fn extension_names(&self) -> impl Iterator<Item = &'static str> {
        self.extensions.names()
    }

    /// Capability record of the device built from this plan.
    pub fn capabilities(&self, instance: InstanceCapabilities) -> DeviceCapabilities {
        DeviceCapabilities {
            instance,
            extensions: self.extensions,
            fill_mode_non_solid: self.features.fill_mode_non_solid,
            sampler_anisotropy: self.features.sampler_anisotropy,
        }
    }
}

/// Log why each enumerated adapter was chosen or passed over.
pub(crate) fn log_verdicts(
    logger: &DeviceLogger,
    adapters: &[AdapterDescription],
    verdicts: &[CandidateVerdict],
) {
    for verdict in verdicts {
        let adapter = &adapters[verdict.index];
        match &verdict.result {
            Ok(family) => logger.debug(format_args!(
                "adapter '{}' ({}) usable with queue family {family}",
                adapter.name, adapter.adapter_type
            )),
            Err(reason) => logger.debug(format_args!(
                "adapter '{}' ({}) rejected: {reason}",
                adapter.name, adapter.adapter_type
            )),
        }
    }
}

/// Log the adapter a device was created on.
pub(crate) fn log_adapter(logger: &DeviceLogger, info: &AdapterInfo, caps: &DeviceCapabilities) {
    logger.info(format_args!(
        "GPU adapter: {} ({}), queue family {}",
        info.name, info.adapter_type, info.queue_family
    ));
    if caps.has_driver_properties() {
        logger.info(format_args!(
            "driver: {} {} (conformance {})",
            info.driver_name.as_deref().unwrap_or("unknown"),
            info.driver_info.as_deref().unwrap_or(""),
            info.conformance_version.as_deref().unwrap_or("unknown")
        ));
    } else {
        logger.info(format_args!("KHR_driver_properties unsupported"));
    }
    if caps.is_portability_subset() {
        logger.warn(format_args!(
            "adapter is a portability subset implementation"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{select_adapter, AdapterType};
    use crate::logging::tests::CapturingSink;
    use std::sync::Arc;

    #[test]
    fn test_plan_enables_supported_optional_extensions() {
        let adapter = AdapterDescription::new("gpu", AdapterType::Discrete).with_extensions(
            DeviceExtensions::REQUIRED
                | DeviceExtensions::KHR_PORTABILITY_SUBSET
                | DeviceExtensions::KHR_DRIVER_PROPERTIES,
        );
        let selection = select_adapter(std::slice::from_ref(&adapter)).unwrap();
        let plan = LogicalDevicePlan::new(
            &adapter,
            &selection,
            SupportedFeatures {
                fill_mode_non_solid: true,
                sampler_anisotropy: false,
            },
        )
        .unwrap();

        assert!(plan.needs_portability_features());
        let names: Vec<_> = plan.extension_names().collect();
        assert!(names.contains(&"VK_KHR_swapchain"));
        assert!(names.contains(&"VK_KHR_portability_subset"));
        assert!(!names.contains(&"VK_GGP_frame_token"));

        let caps = plan.capabilities(InstanceCapabilities::default());
        assert!(caps.fill_mode_non_solid);
        assert!(!caps.sampler_anisotropy);
        assert!(caps.has_driver_properties());
    }

    #[test]
    fn test_plan_rejects_missing_required() {
        let adapter = AdapterDescription::new("gpu", AdapterType::Discrete)
            .with_extensions(DeviceExtensions::KHR_SWAPCHAIN);
        let selection = AdapterSelection {
            index: 0,
            queue_family: 0,
        };
        let err = LogicalDevicePlan::new(&adapter, &selection, SupportedFeatures::default())
            .unwrap_err();
        match err {
            GpuError::Unsupported(msg) => assert!(msg.contains("VK_KHR_maintenance1")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_log_adapter_reports_missing_driver_properties() {
        let sink = Arc::new(CapturingSink::default());
        let logger = DeviceLogger::with_sink(sink.clone());
        let info = AdapterInfo {
            name: "Test GPU".into(),
            adapter_type: AdapterType::Integrated,
            ..Default::default()
        };
        log_adapter(&logger, &info, &DeviceCapabilities::default());

        let records = sink.records.lock();
        assert!(records[0].1.contains("Test GPU"));
        assert!(records[0].1.contains("integrated"));
        assert_eq!(records[1].1, "KHR_driver_properties unsupported");
    }
}
