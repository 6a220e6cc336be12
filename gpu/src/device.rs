//! GPU device.
//!
//! [`GpuDevice`] is the entry point of the crate. It owns one driver, creates
//! resources, hands out command buffers, and submits them to the single
//! unified queue.

use std::sync::Arc;

use crate::adapter::AdapterInfo;
use crate::capabilities::DeviceCapabilities;
use crate::command::CommandBuffer;
use crate::command_pool::PoolStats;
use crate::config::{DeviceParameters, DriverKind};
use crate::driver::{self, Driver};
use crate::error::{ContractViolation, GpuError, GpuResult};
use crate::fence::Fence;
use crate::logging::DeviceLogger;
use crate::resources::{
    Buffer, CpuBuffer, DeviceOwned, DeviceRef, Pipeline, Sampler, Shader, Texture,
};
use crate::surface::Window;
use crate::types::{
    BufferDescriptor, FillMode, PipelineDescriptor, SamplerDescriptor, ShaderDescriptor,
    TextureDescriptor,
};

/// A GPU device.
///
/// Devices are created with [`GpuDevice::new`] and shared behind an [`Arc`].
/// Every resource and command buffer is tied to the device that created it.
///
/// # Example
///
/// ```ignore
/// let device = GpuDevice::new(DeviceParameters::new().with_label("main"))?;
///
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024))?;
/// let mut cmd = device.acquire_command_buffer(Some("upload"))?;
/// cmd.begin_blit_pass()?;
/// cmd.fill_buffer(&buffer, 0, 1024, 0)?;
/// cmd.end_blit_pass()?;
///
/// let fence = device.create_fence()?;
/// device.submit(&mut cmd, Some(&fence))?;
/// device.wait_fence(&fence)?;
/// device.recycle_command_buffer(cmd)?;
/// ```
pub struct GpuDevice {
    label: Option<String>,
    driver: Box<dyn Driver>,
    logger: DeviceLogger,
}

impl GpuDevice {
    /// Create a device with the driver selected by `params`.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::Unsupported`] when no driver can be created or no
    /// adapter qualifies, and [`GpuError::InvalidParameter`] for bad
    /// parameters.
    pub fn new(params: DeviceParameters) -> GpuResult<Arc<Self>> {
        params.validate()?;
        let driver = driver::create_driver(&params)?;
        params.logger.info(format_args!(
            "created GPU device {:?} on '{}' ({} driver)",
            params.label.as_deref().unwrap_or("<unnamed>"),
            driver.adapter_info().name,
            driver.kind()
        ));
        Ok(Arc::new(Self {
            label: params.label,
            driver,
            logger: params.logger,
        }))
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The driver the device runs on.
    pub fn driver_kind(&self) -> DriverKind {
        self.driver.kind()
    }

    pub fn adapter_info(&self) -> &AdapterInfo {
        self.driver.adapter_info()
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.driver.capabilities()
    }

    pub fn logger(&self) -> &DeviceLogger {
        &self.logger
    }

    /// Block until all submitted work finished executing.
    pub fn wait_idle(&self) -> GpuResult<()> {
        self.driver.wait_idle()
    }

    /// Fail with [`ContractViolation::ForeignResource`] unless `resource`
    /// was created by this device.
    pub(crate) fn check_owned(&self, resource: &impl DeviceOwned) -> GpuResult<()> {
        if resource.owner().is(self) {
            Ok(())
        } else {
            Err(ContractViolation::ForeignResource.into())
        }
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    /// Create a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is invalid or allocation fails.
    pub fn create_buffer(self: &Arc<Self>, descriptor: &BufferDescriptor) -> GpuResult<Arc<Buffer>> {
        descriptor.validate()?;
        let raw = self.driver.create_buffer(descriptor)?;
        self.logger.trace(format_args!(
            "GpuDevice: created buffer {:?}, size={}",
            descriptor.label, descriptor.size
        ));
        Ok(Arc::new(Buffer::new(
            DeviceRef::new(self),
            raw,
            descriptor.clone(),
        )))
    }

    /// Create a host-visible staging buffer of `len` bytes, optionally
    /// filled with `initial`.
    pub fn create_cpu_buffer(
        self: &Arc<Self>,
        label: Option<&str>,
        len: usize,
        initial: Option<&[u8]>,
    ) -> GpuResult<Arc<CpuBuffer>> {
        if len == 0 {
            return Err(GpuError::InvalidParameter(
                "CPU buffer size cannot be zero".to_string(),
            ));
        }
        if let Some(initial) = initial {
            if initial.len() > len {
                return Err(GpuError::InvalidParameter(format!(
                    "initial data ({} bytes) does not fit a {len} byte CPU buffer",
                    initial.len()
                )));
            }
        }
        let raw = self.driver.create_cpu_buffer(label, len, initial)?;
        Ok(Arc::new(CpuBuffer::new(
            DeviceRef::new(self),
            raw,
            len,
            label.map(str::to_string),
        )))
    }

    /// Create a GPU texture.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is invalid or allocation fails.
    pub fn create_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
    ) -> GpuResult<Arc<Texture>> {
        descriptor.validate()?;
        let raw = self.driver.create_texture(descriptor)?;
        self.logger.trace(format_args!(
            "GpuDevice: created texture {:?}, size={}x{}",
            descriptor.label, descriptor.width, descriptor.height
        ));
        Ok(Arc::new(Texture::new(
            DeviceRef::new(self),
            raw,
            descriptor.clone(),
        )))
    }

    /// Create a texture sampler.
    pub fn create_sampler(
        self: &Arc<Self>,
        descriptor: &SamplerDescriptor,
    ) -> GpuResult<Arc<Sampler>> {
        let raw = self.driver.create_sampler(descriptor)?;
        self.logger.trace(format_args!(
            "GpuDevice: created sampler {:?}",
            descriptor.label
        ));
        Ok(Arc::new(Sampler::new(
            DeviceRef::new(self),
            raw,
            descriptor.clone(),
        )))
    }

    /// Create a shader from opaque bytecode (SPIR-V for Vulkan).
    pub fn create_shader(self: &Arc<Self>, descriptor: &ShaderDescriptor) -> GpuResult<Arc<Shader>> {
        descriptor.validate()?;
        let raw = self.driver.create_shader(descriptor)?;
        Ok(Arc::new(Shader::new(
            DeviceRef::new(self),
            raw,
            descriptor.stage,
            descriptor.entry_point.clone(),
            descriptor.label.clone(),
        )))
    }

    /// Create a graphics pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::InvalidParameter`] for an inconsistent descriptor
    /// and [`GpuError::Unsupported`] when it needs a feature the device lacks.
    pub fn create_pipeline(
        self: &Arc<Self>,
        descriptor: &PipelineDescriptor,
    ) -> GpuResult<Arc<Pipeline>> {
        descriptor.validate()?;
        self.check_owned(descriptor.vertex_shader.as_ref())?;
        self.check_owned(descriptor.fragment_shader.as_ref())?;
        if descriptor.fill_mode != FillMode::Fill && !self.capabilities().fill_mode_non_solid {
            return Err(GpuError::Unsupported(
                "line fill mode needs fillModeNonSolid".to_string(),
            ));
        }
        let raw = self.driver.create_pipeline(descriptor)?;
        self.logger.trace(format_args!(
            "GpuDevice: created pipeline {:?}",
            descriptor.label
        ));
        Ok(Arc::new(Pipeline::new(
            DeviceRef::new(self),
            raw,
            descriptor.clone(),
        )))
    }

    // ------------------------------------------------------------------
    // Command buffers
    // ------------------------------------------------------------------

    /// Check a command buffer out of the calling thread's pool.
    ///
    /// The first call on a thread creates that thread's pool.
    pub fn acquire_command_buffer(self: &Arc<Self>, label: Option<&str>) -> GpuResult<CommandBuffer> {
        let raw = self.driver.acquire_command_buffer(label)?;
        Ok(CommandBuffer::new(
            Arc::clone(self),
            raw,
            label.map(str::to_string),
        ))
    }

    /// Submit a finished command buffer, optionally signaling `fence` when
    /// it completes.
    pub fn submit(&self, command_buffer: &mut CommandBuffer, fence: Option<&Fence>) -> GpuResult<()> {
        self.submit_batch(&mut [command_buffer], fence)
    }

    /// Submit several command buffers in order as one queue submission.
    ///
    /// Nothing is submitted unless every buffer and the fence pass
    /// validation. If the driver then fails, every buffer in the batch moves
    /// to [`RecordingState::Failed`](crate::RecordingState::Failed) and can
    /// only be abandoned.
    pub fn submit_batch(
        &self,
        command_buffers: &mut [&mut CommandBuffer],
        fence: Option<&Fence>,
    ) -> GpuResult<()> {
        if command_buffers.is_empty() {
            return Err(GpuError::InvalidParameter(
                "nothing to submit".to_string(),
            ));
        }
        for command_buffer in command_buffers.iter() {
            if !command_buffer.belongs_to(self) {
                return Err(ContractViolation::ForeignResource.into());
            }
            command_buffer.recorder().check_submittable()?;
        }
        if let Some(fence) = fence {
            self.check_owned(fence)?;
            self.check_fence_submittable(fence)?;
        }

        let mut raws = command_buffers
            .iter_mut()
            .map(|command_buffer| command_buffer.raw_mut())
            .collect::<GpuResult<Vec<_>>>()?;
        let result = self.driver.submit(&mut raws, fence.map(Fence::raw));
        drop(raws);
        if let Err(e) = result {
            for command_buffer in command_buffers.iter_mut() {
                command_buffer.mark_failed();
            }
            return Err(e);
        }

        for command_buffer in command_buffers.iter_mut() {
            command_buffer.mark_submitted();
        }
        if let Some(fence) = fence {
            fence.mark_pending();
        }
        Ok(())
    }

    /// Return a command buffer that was never submitted to its pool.
    ///
    /// Dropping an unsubmitted command buffer does the same.
    pub fn abandon_command_buffer(&self, mut command_buffer: CommandBuffer) -> GpuResult<()> {
        if !command_buffer.belongs_to(self) {
            return Err(ContractViolation::ForeignResource.into());
        }
        if command_buffer.recorder().is_submitted() {
            return Err(ContractViolation::AlreadySubmitted.into());
        }
        match command_buffer.take_raw() {
            Some(raw) => self.driver.abandon_command_buffer(raw),
            None => Ok(()),
        }
    }

    /// Return a submitted command buffer to its pool.
    ///
    /// The caller must have observed completion, for example through a
    /// fence. A buffer that was not submitted is rejected with
    /// [`ContractViolation::NotSubmitted`] and abandoned instead.
    pub fn recycle_command_buffer(&self, mut command_buffer: CommandBuffer) -> GpuResult<()> {
        if !command_buffer.belongs_to(self) {
            return Err(ContractViolation::ForeignResource.into());
        }
        if !command_buffer.recorder().is_submitted() {
            return Err(ContractViolation::NotSubmitted.into());
        }
        match command_buffer.take_raw() {
            Some(raw) => self.driver.recycle_command_buffer(raw),
            None => Ok(()),
        }
    }

    /// Occupancy of the calling thread's command pool, if it has one.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.driver.pool_stats()
    }

    /// Number of threads that own a command pool on this device.
    pub fn pool_count(&self) -> usize {
        self.driver.pool_count()
    }

    // ------------------------------------------------------------------
    // Presentation
    // ------------------------------------------------------------------

    /// Prepare `window` for presentation. Claiming a claimed window is a
    /// no-op.
    pub fn claim_window(&self, window: &dyn Window) -> GpuResult<()> {
        self.driver.claim_window(window)
    }

    /// Tear down the presentation state of `window`.
    pub fn unclaim_window(&self, window: &dyn Window) -> GpuResult<()> {
        self.driver.unclaim_window(window)
    }

    /// Acquire the next swap chain image of a claimed window.
    ///
    /// # Errors
    ///
    /// [`GpuError::SurfaceUnavailable`] is transient (minimized window,
    /// swap chain out of date) and the call can be retried next frame.
    pub fn acquire_backbuffer(self: &Arc<Self>, window: &dyn Window) -> GpuResult<Arc<Texture>> {
        let (raw, descriptor) = self.driver.acquire_backbuffer(window)?;
        Ok(Arc::new(Texture::new_backbuffer(
            DeviceRef::new(self),
            raw,
            descriptor,
        )))
    }

    /// Present the acquired image of `window`.
    ///
    /// A `swap_interval` of 0 presents without waiting for vertical sync.
    pub fn present(&self, window: &dyn Window, swap_interval: u32) -> GpuResult<()> {
        self.driver.present(window, swap_interval)
    }
}

impl Drop for GpuDevice {
    fn drop(&mut self) {
        if let Err(e) = self.driver.wait_idle() {
            self.logger
                .warn(format_args!("failed to wait for GPU idle on teardown: {e}"));
        }
        self.logger.debug(format_args!(
            "destroying GPU device {:?}",
            self.label.as_deref().unwrap_or("<unnamed>")
        ));
    }
}

impl std::fmt::Debug for GpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuDevice")
            .field("label", &self.label)
            .field("driver", &self.driver.kind())
            .field("adapter", &self.driver.adapter_info().name)
            .finish()
    }
}

static_assertions::assert_impl_all!(GpuDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, PixelFormat, ShaderStage, TextureUsage};

    fn device() -> Arc<GpuDevice> {
        GpuDevice::new(DeviceParameters::new().with_driver(DriverKind::Dummy)).unwrap()
    }

    #[test]
    fn test_create_resources() {
        let device = device();
        assert_eq!(device.driver_kind(), DriverKind::Dummy);

        let buffer = device
            .create_buffer(&BufferDescriptor::new(64).with_usage(BufferUsage::UNIFORM))
            .unwrap();
        assert_eq!(buffer.size(), 64);
        assert!(Arc::ptr_eq(&buffer.device().unwrap(), &device));

        let texture = device
            .create_texture(&TextureDescriptor::new_2d(
                16,
                16,
                PixelFormat::Rgba8Unorm,
                TextureUsage::SHADER_READ,
            ))
            .unwrap();
        assert_eq!(texture.width(), 16);

        let shader = device
            .create_shader(&ShaderDescriptor::new(ShaderStage::Vertex, vec![1, 2, 3, 4]))
            .unwrap();
        assert_eq!(shader.stage(), ShaderStage::Vertex);
        assert_eq!(shader.entry_point(), "main");
    }

    #[test]
    fn test_invalid_descriptors_rejected() {
        let device = device();
        assert!(matches!(
            device.create_buffer(&BufferDescriptor::new(0)),
            Err(GpuError::InvalidParameter(_))
        ));
        assert!(matches!(
            device.create_cpu_buffer(None, 4, Some(&[0; 8])),
            Err(GpuError::InvalidParameter(_))
        ));
        assert!(matches!(
            device.create_shader(&ShaderDescriptor::new(ShaderStage::Fragment, Vec::new())),
            Err(GpuError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_foreign_resource_detected() {
        let a = device();
        let b = device();
        let buffer = a.create_buffer(&BufferDescriptor::new(16)).unwrap();
        assert!(a.check_owned(buffer.as_ref()).is_ok());
        assert_eq!(
            b.check_owned(buffer.as_ref()).unwrap_err(),
            GpuError::ContractViolation(ContractViolation::ForeignResource)
        );
    }

    #[test]
    fn test_zero_pool_capacity_rejected() {
        let params = DeviceParameters::new()
            .with_driver(DriverKind::Dummy)
            .with_initial_pool_capacity(0);
        assert!(matches!(
            GpuDevice::new(params),
            Err(GpuError::InvalidParameter(_))
        ));
    }
}
