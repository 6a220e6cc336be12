//! # RedLilium GPU
//!
//! Low-level GPU device layer for RedLilium, with a native Vulkan driver and
//! a dummy driver for tests.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GpuDevice`] - adapter selection, resource creation, and submission
//! - [`CommandBuffer`] - render and blit pass recording with state checks
//! - [`Fence`] - CPU-GPU synchronization
//! - [`command_pool`] - per-thread command buffer pools
//! - [`StateCache`] and [`ResourceCycle`] - helpers for per-frame state
//! - [`Window`] - the windowing collaborator used for presentation
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_gpu::{DeviceParameters, GpuDevice, BufferDescriptor};
//!
//! let device = GpuDevice::new(DeviceParameters::new())?;
//! let buffer = device.create_buffer(&BufferDescriptor::new(256))?;
//!
//! let mut cmd = device.acquire_command_buffer(None)?;
//! cmd.begin_blit_pass()?;
//! cmd.fill_buffer(&buffer, 0, 256, 0xFF)?;
//! cmd.end_blit_pass()?;
//! device.submit(&mut cmd, None)?;
//! ```

pub mod adapter;
pub mod builder;
pub mod capabilities;
pub mod command;
pub mod command_pool;
pub mod config;
pub mod device;
mod driver;
pub mod error;
pub mod fence;
pub mod logging;
pub mod pass;
pub mod resources;
pub mod state_cache;
pub mod surface;
pub mod types;

// Re-export main types for convenience
pub use adapter::{AdapterDescription, AdapterInfo, AdapterType};
pub use capabilities::{DeviceCapabilities, DeviceExtensions};
pub use command::CommandBuffer;
pub use command_pool::PoolStats;
pub use config::{DeviceParameters, DriverKind};
pub use device::GpuDevice;
pub use driver::has_native_driver;
pub use error::{ContractViolation, ErrorKind, GpuError, GpuResult};
pub use fence::Fence;
pub use logging::DeviceLogger;
pub use pass::{PassKind, RecordingState};
pub use resources::{
    Buffer, CpuBuffer, CpuBufferLock, Pipeline, ResourceCycle, Sampler, Shader, Texture,
};
pub use state_cache::StateCache;
pub use surface::Window;
pub use types::*;

/// GPU library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_device() {
        let device =
            GpuDevice::new(DeviceParameters::new().with_driver(DriverKind::Dummy)).unwrap();
        assert_eq!(device.driver_kind(), DriverKind::Dummy);
        assert_eq!(device.adapter_info().adapter_type, AdapterType::Discrete);
    }
}
