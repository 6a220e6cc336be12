//! Common utilities for device integration tests.
//!
//! This module provides shared test infrastructure that can be reused
//! across the dummy and Vulkan drivers.

use std::sync::Arc;

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WebDisplayHandle, WebWindowHandle, WindowHandle,
};
use redlilium_gpu::{
    Buffer, BufferDescriptor, BufferUsage, CpuBuffer, DeviceParameters, DriverKind, GpuDevice,
    PixelFormat, Texture, TextureDescriptor, TextureUsage, Window,
};

/// Fill a byte vector with a recognizable pattern.
pub fn generate_test_pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 7 + 3) as u8).collect()
}

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Drivers the tests run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy driver (transfers executed on the CPU, nothing rendered).
    Dummy,
    /// Vulkan driver (native via ash).
    Vulkan,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "vulkan-backend")]
            Backend::Vulkan => true,
            #[cfg(not(feature = "vulkan-backend"))]
            Backend::Vulkan => false,
        }
    }

    /// Get the backend name for display.
    #[allow(dead_code)]
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Dummy => "dummy",
            Backend::Vulkan => "vulkan",
        }
    }

    /// Convert to the parameters used to create a device.
    pub fn to_device_parameters(self) -> DeviceParameters {
        let driver = match self {
            Backend::Dummy => DriverKind::Dummy,
            Backend::Vulkan => DriverKind::Vulkan,
        };
        DeviceParameters::new()
            .with_label(format!("{} test device", self.name()))
            .with_driver(driver)
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A device plus helpers for the resources most tests need.
pub struct TestContext {
    #[allow(dead_code)]
    pub backend: Backend,
    pub device: Arc<GpuDevice>,
}

impl TestContext {
    /// Create a context for the given backend.
    ///
    /// Returns `None` if the backend is not compiled in or the machine has no
    /// adapter it can use.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_parameters(backend, backend.to_device_parameters())
    }

    /// Like [`TestContext::new`] with caller-supplied parameters.
    pub fn with_parameters(backend: Backend, params: DeviceParameters) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        if !backend.is_available() {
            return None;
        }
        match GpuDevice::new(params) {
            Ok(device) => Some(Self { backend, device }),
            Err(e) => {
                eprintln!("Failed to create {} device: {e}", backend.name());
                None
            }
        }
    }

    /// Create a GPU buffer usable as a storage buffer.
    pub fn create_gpu_buffer(&self, size: u64) -> Arc<Buffer> {
        self.device
            .create_buffer(
                &BufferDescriptor::new(size)
                    .with_label("test buffer")
                    .with_usage(BufferUsage::STORAGE),
            )
            .expect("Failed to create buffer")
    }

    /// Create a staging buffer, optionally filled with `data`.
    pub fn create_cpu_buffer(&self, size: usize, data: Option<&[u8]>) -> Arc<CpuBuffer> {
        self.device
            .create_cpu_buffer(Some("test staging"), size, data)
            .expect("Failed to create CPU buffer")
    }

    /// Create a 2D texture with the given dimensions and format.
    pub fn create_texture_2d(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: TextureUsage,
    ) -> Arc<Texture> {
        self.device
            .create_texture(&TextureDescriptor::new_2d(width, height, format, usage))
            .expect("Failed to create texture")
    }

    /// Create a sampleable render target.
    pub fn create_render_target(&self, width: u32, height: u32) -> Arc<Texture> {
        self.create_texture_2d(
            width,
            height,
            PixelFormat::Rgba8Unorm,
            TextureUsage::RENDER_TARGET | TextureUsage::SHADER_READ,
        )
    }

    /// Submit `cmd` with a fresh fence, wait for it and recycle the buffer.
    pub fn submit_and_wait(&self, mut cmd: redlilium_gpu::CommandBuffer) {
        let fence = self.device.create_fence().expect("Failed to create fence");
        self.device
            .submit(&mut cmd, Some(&fence))
            .expect("Failed to submit");
        self.device.wait_fence(&fence).expect("Failed to wait");
        self.device
            .recycle_command_buffer(cmd)
            .expect("Failed to recycle");
    }
}

// ============================================================================
// Windows
// ============================================================================

/// Window without a native backing, identified by a web canvas id.
///
/// Only the dummy driver can present to it.
#[allow(dead_code)]
pub struct FakeWindow {
    pub id: u32,
    pub size: (u32, u32),
}

impl HasWindowHandle for FakeWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let raw = RawWindowHandle::Web(WebWindowHandle::new(self.id));
        // SAFETY: web handles carry no pointers.
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl HasDisplayHandle for FakeWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        let raw = RawDisplayHandle::Web(WebDisplayHandle::new());
        // SAFETY: web handles carry no pointers.
        Ok(unsafe { DisplayHandle::borrow_raw(raw) })
    }
}

impl Window for FakeWindow {
    fn drawable_size(&self) -> (u32, u32) {
        self.size
    }
}
