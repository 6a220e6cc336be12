//! Device creation parameters.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::adapter::AdapterDescription;
use crate::error::GpuError;
use crate::logging::DeviceLogger;

/// Environment variable that overrides [`DriverKind::Auto`].
pub const DRIVER_ENV_VAR: &str = "REDLILIUM_GPU_DRIVER";

/// Initial number of command buffers a per-thread pool allocates.
pub const DEFAULT_INITIAL_POOL_CAPACITY: u32 = 2;

/// Which driver a device is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriverKind {
    /// Try every native driver compiled in, in order of preference.
    #[default]
    Auto,
    /// Native Vulkan driver.
    Vulkan,
    /// Driver without a native API, for tests and headless validation.
    Dummy,
}

impl DriverKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Vulkan => "vulkan",
            Self::Dummy => "dummy",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriverKind {
    type Err = GpuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "vulkan" | "vk" => Ok(Self::Vulkan),
            "dummy" => Ok(Self::Dummy),
            other => Err(GpuError::InvalidParameter(format!(
                "unknown GPU driver '{other}'"
            ))),
        }
    }
}

/// Parameters for [`GpuDevice::new`](crate::GpuDevice::new).
#[derive(Clone)]
pub struct DeviceParameters {
    /// Debug label for the device.
    pub label: Option<String>,
    /// Driver to use.
    pub driver: DriverKind,
    /// Enable validation layers and debug messengers when available.
    pub debug_mode: bool,
    /// Diagnostic logger handed to the driver.
    pub logger: DeviceLogger,
    /// Number of command buffers a fresh per-thread pool starts with.
    pub initial_pool_capacity: u32,
    /// Adapters the dummy driver pretends to enumerate.
    pub dummy_adapters: Option<Vec<AdapterDescription>>,
}

impl DeviceParameters {
    pub fn new() -> Self {
        Self {
            label: None,
            driver: DriverKind::Auto,
            debug_mode: cfg!(debug_assertions),
            logger: DeviceLogger::global(),
            initial_pool_capacity: DEFAULT_INITIAL_POOL_CAPACITY,
            dummy_adapters: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_driver(mut self, driver: DriverKind) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_logger(mut self, logger: DeviceLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Route diagnostics to `sink` instead of the global `log` facade.
    pub fn with_log_sink(self, sink: Arc<dyn log::Log>) -> Self {
        self.with_logger(DeviceLogger::with_sink(sink))
    }

    pub fn with_initial_pool_capacity(mut self, capacity: u32) -> Self {
        self.initial_pool_capacity = capacity;
        self
    }

    /// Adapters reported by the dummy driver instead of its single default
    /// discrete adapter.
    pub fn with_dummy_adapters(mut self, adapters: Vec<AdapterDescription>) -> Self {
        self.dummy_adapters = Some(adapters);
        self
    }

    /// The driver to create, applying the environment override to `Auto`.
    pub fn resolved_driver(&self) -> Result<DriverKind, GpuError> {
        if self.driver != DriverKind::Auto {
            return Ok(self.driver);
        }
        match std::env::var(DRIVER_ENV_VAR) {
            Ok(value) => value.parse(),
            Err(_) => Ok(DriverKind::Auto),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), GpuError> {
        if self.initial_pool_capacity == 0 {
            return Err(GpuError::InvalidParameter(
                "initial command pool capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DeviceParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceParameters")
            .field("label", &self.label)
            .field("driver", &self.driver)
            .field("debug_mode", &self.debug_mode)
            .field("initial_pool_capacity", &self.initial_pool_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_kind_from_str() {
        assert_eq!("vulkan".parse::<DriverKind>().unwrap(), DriverKind::Vulkan);
        assert_eq!(" Dummy ".parse::<DriverKind>().unwrap(), DriverKind::Dummy);
        assert_eq!("".parse::<DriverKind>().unwrap(), DriverKind::Auto);
        assert!(matches!(
            "metal".parse::<DriverKind>(),
            Err(GpuError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_builder() {
        let params = DeviceParameters::new()
            .with_label("main")
            .with_driver(DriverKind::Dummy)
            .with_debug_mode(false)
            .with_initial_pool_capacity(8);
        assert_eq!(params.label.as_deref(), Some("main"));
        assert_eq!(params.driver, DriverKind::Dummy);
        assert!(!params.debug_mode);
        assert_eq!(params.initial_pool_capacity, 8);
        assert_eq!(params.resolved_driver().unwrap(), DriverKind::Dummy);
    }

    #[test]
    fn test_zero_pool_capacity_rejected() {
        let params = DeviceParameters::new().with_initial_pool_capacity(0);
        assert!(params.validate().is_err());
    }
}
