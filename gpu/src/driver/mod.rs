//! Driver abstraction layer.
//!
//! Every native backend implements [`Driver`], the operation table the rest of
//! the crate is written against. Native objects travel as tagged enums
//! ([`GpuBuffer`], [`GpuTexture`], ...) with one variant per backend, so the
//! public wrappers in [`crate::resources`] stay backend-agnostic.
//!
//! # Available drivers
//!
//! - `dummy`: no native API. Buffer copies are executed on submit so transfers
//!   can be tested, nothing is rendered.
//! - `vulkan-backend`: native Vulkan through `ash`.
//!
//! Native objects release themselves on drop, so destroying a resource is
//! dropping its wrapper.

pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::fmt;
use std::time::Duration;

use parking_lot::MappedMutexGuard;

use crate::adapter::AdapterInfo;
use crate::capabilities::DeviceCapabilities;
use crate::command_pool::PoolStats;
use crate::config::{DeviceParameters, DriverKind};
use crate::error::{ContractViolation, GpuError, GpuResult};
use crate::resources::{Buffer, CpuBuffer, Pipeline, Sampler, Texture};
use crate::surface::Window;
use crate::types::{
    BufferDescriptor, BufferImageLayout, Color, Extent3d, IndexType, PipelineDescriptor,
    RenderPassDescriptor, SamplerDescriptor, ScissorRect, ShaderDescriptor, ShaderStage,
    TextureDescriptor, TextureRegion, Viewport,
};

macro_rules! native_enum {
    ($(#[$meta:meta])* $name:ident { dummy: $dummy:ty, vulkan: $vulkan:ty $(,)? }) => {
        $(#[$meta])*
        pub(crate) enum $name {
            Dummy($dummy),
            #[cfg(feature = "vulkan-backend")]
            Vulkan($vulkan),
        }

        #[allow(dead_code)]
        impl $name {
            #[allow(unreachable_patterns)]
            pub(crate) fn as_dummy(&self) -> GpuResult<&$dummy> {
                match self {
                    Self::Dummy(inner) => Ok(inner),
                    _ => Err(ContractViolation::ForeignResource.into()),
                }
            }

            #[allow(unreachable_patterns)]
            pub(crate) fn as_dummy_mut(&mut self) -> GpuResult<&mut $dummy> {
                match self {
                    Self::Dummy(inner) => Ok(inner),
                    _ => Err(ContractViolation::ForeignResource.into()),
                }
            }

            #[cfg(feature = "vulkan-backend")]
            pub(crate) fn as_vulkan(&self) -> GpuResult<&$vulkan> {
                match self {
                    Self::Vulkan(inner) => Ok(inner),
                    _ => Err(ContractViolation::ForeignResource.into()),
                }
            }

            #[cfg(feature = "vulkan-backend")]
            pub(crate) fn as_vulkan_mut(&mut self) -> GpuResult<&mut $vulkan> {
                match self {
                    Self::Vulkan(inner) => Ok(inner),
                    _ => Err(ContractViolation::ForeignResource.into()),
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    Self::Dummy(_) => f.write_str(concat!(stringify!($name), "::Dummy")),
                    #[cfg(feature = "vulkan-backend")]
                    Self::Vulkan(_) => f.write_str(concat!(stringify!($name), "::Vulkan")),
                }
            }
        }
    };
}

native_enum! {
    /// Handle to a GPU buffer.
    GpuBuffer { dummy: dummy::DummyBuffer, vulkan: vulkan::VulkanBuffer }
}

native_enum! {
    /// Handle to a host-visible staging buffer.
    GpuCpuBuffer { dummy: dummy::DummyBuffer, vulkan: vulkan::VulkanCpuBuffer }
}

native_enum! {
    /// Handle to a texture, including swap chain backbuffers.
    GpuTexture { dummy: dummy::DummyTexture, vulkan: vulkan::VulkanTexture }
}

native_enum! {
    GpuSampler { dummy: dummy::DummySampler, vulkan: vulkan::VulkanSampler }
}

native_enum! {
    GpuShader { dummy: dummy::DummyShader, vulkan: vulkan::VulkanShader }
}

native_enum! {
    GpuPipeline { dummy: dummy::DummyPipeline, vulkan: vulkan::VulkanPipeline }
}

native_enum! {
    /// Handle to a fence for CPU-GPU synchronization.
    GpuFence { dummy: dummy::DummyFence, vulkan: vulkan::VulkanFence }
}

native_enum! {
    /// A command buffer checked out of the calling thread's pool.
    GpuCommandBuffer { dummy: dummy::DummyCommandBuffer, vulkan: vulkan::VulkanCommandBuffer }
}

/// Arguments of an indexed draw.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexedDraw<'a> {
    pub index_count: u32,
    pub index_type: IndexType,
    pub index_buffer: &'a Buffer,
    /// Byte offset of the first index.
    pub index_offset: u32,
    pub instance_count: u32,
    pub base_vertex: i32,
    pub base_instance: u32,
}

/// Operation table implemented by every backend.
///
/// Recording methods assume the pass state was validated by the caller; they
/// only translate the call into native commands.
pub(crate) trait Driver: Send + Sync {
    fn kind(&self) -> DriverKind;

    fn adapter_info(&self) -> &AdapterInfo;

    fn capabilities(&self) -> DeviceCapabilities;

    /// Block until the queue has finished all submitted work.
    fn wait_idle(&self) -> GpuResult<()>;

    // --- presentation ---

    fn claim_window(&self, window: &dyn Window) -> GpuResult<()>;

    fn unclaim_window(&self, window: &dyn Window) -> GpuResult<()>;

    /// Acquire the next swap chain image of a claimed window.
    fn acquire_backbuffer(&self, window: &dyn Window)
        -> GpuResult<(GpuTexture, TextureDescriptor)>;

    fn present(&self, window: &dyn Window, swap_interval: u32) -> GpuResult<()>;

    // --- resources ---

    fn create_cpu_buffer(
        &self,
        label: Option<&str>,
        len: usize,
        initial: Option<&[u8]>,
    ) -> GpuResult<GpuCpuBuffer>;

    /// Map a CPU buffer. The mapping lives as long as the guard.
    fn lock_cpu_buffer<'a>(
        &self,
        buffer: &'a GpuCpuBuffer,
    ) -> GpuResult<MappedMutexGuard<'a, [u8]>>;

    /// Called after a guard returned by `lock_cpu_buffer` was dropped.
    fn unlock_cpu_buffer(&self, buffer: &GpuCpuBuffer);

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> GpuResult<GpuBuffer>;

    fn create_texture(&self, descriptor: &TextureDescriptor) -> GpuResult<GpuTexture>;

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GpuResult<GpuSampler>;

    fn create_shader(&self, descriptor: &ShaderDescriptor) -> GpuResult<GpuShader>;

    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> GpuResult<GpuPipeline>;

    // --- command buffers ---

    /// Check a buffer out of the calling thread's pool, reset and recording.
    fn acquire_command_buffer(&self, label: Option<&str>) -> GpuResult<GpuCommandBuffer>;

    /// Submit recorded buffers to the queue in order, signaling `fence` once
    /// all of them completed.
    fn submit(
        &self,
        buffers: &mut [&mut GpuCommandBuffer],
        fence: Option<&GpuFence>,
    ) -> GpuResult<()>;

    /// Return a never submitted buffer to its pool.
    fn abandon_command_buffer(&self, buffer: GpuCommandBuffer) -> GpuResult<()>;

    /// Return a submitted buffer whose execution finished to its pool.
    fn recycle_command_buffer(&self, buffer: GpuCommandBuffer) -> GpuResult<()>;

    /// Occupancy of the calling thread's command pool.
    fn pool_stats(&self) -> Option<PoolStats>;

    fn pool_count(&self) -> usize;

    // --- render pass ---

    fn begin_render_pass(
        &self,
        cmd: &mut GpuCommandBuffer,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> GpuResult<()>;

    fn set_pipeline(&self, cmd: &mut GpuCommandBuffer, pipeline: &Pipeline) -> GpuResult<()>;

    fn set_viewport(&self, cmd: &mut GpuCommandBuffer, viewport: &Viewport) -> GpuResult<()>;

    fn set_scissor(&self, cmd: &mut GpuCommandBuffer, scissor: &ScissorRect) -> GpuResult<()>;

    fn set_blend_constant(&self, cmd: &mut GpuCommandBuffer, color: Color) -> GpuResult<()>;

    fn set_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        buffer: &Buffer,
        offset: u32,
        index: u32,
    ) -> GpuResult<()>;

    fn set_sampler(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        sampler: &Sampler,
        index: u32,
    ) -> GpuResult<()>;

    fn set_texture(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        texture: &Texture,
        index: u32,
    ) -> GpuResult<()>;

    fn draw(
        &self,
        cmd: &mut GpuCommandBuffer,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
        base_instance: u32,
    ) -> GpuResult<()>;

    fn draw_indexed(&self, cmd: &mut GpuCommandBuffer, draw: &IndexedDraw<'_>) -> GpuResult<()>;

    fn end_render_pass(&self, cmd: &mut GpuCommandBuffer) -> GpuResult<()>;

    // --- blit pass ---

    fn begin_blit_pass(&self, cmd: &mut GpuCommandBuffer) -> GpuResult<()>;

    fn copy_texture_to_texture(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Texture, TextureRegion),
        dst: (&Texture, TextureRegion),
        extent: Extent3d,
    ) -> GpuResult<()>;

    fn fill_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        buffer: &Buffer,
        offset: u32,
        length: u32,
        value: u8,
    ) -> GpuResult<()>;

    fn generate_mipmaps(&self, cmd: &mut GpuCommandBuffer, texture: &Texture) -> GpuResult<()>;

    fn copy_cpu_to_gpu(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&CpuBuffer, u32),
        dst: (&Buffer, u32),
        length: u32,
    ) -> GpuResult<()>;

    fn copy_gpu_to_cpu(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Buffer, u32),
        dst: (&CpuBuffer, u32),
        length: u32,
    ) -> GpuResult<()>;

    fn copy_buffer_to_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Buffer, u32),
        dst: (&Buffer, u32),
        length: u32,
    ) -> GpuResult<()>;

    fn copy_buffer_to_texture(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Buffer, BufferImageLayout),
        dst: (&Texture, TextureRegion),
        extent: Extent3d,
    ) -> GpuResult<()>;

    fn copy_texture_to_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Texture, TextureRegion),
        dst: (&Buffer, BufferImageLayout),
        extent: Extent3d,
    ) -> GpuResult<()>;

    fn end_blit_pass(&self, cmd: &mut GpuCommandBuffer) -> GpuResult<()>;

    // --- fences ---

    fn create_fence(&self) -> GpuResult<GpuFence>;

    /// Non-blocking signaled check.
    fn query_fence(&self, fence: &GpuFence) -> GpuResult<bool>;

    fn reset_fence(&self, fence: &GpuFence) -> GpuResult<()>;

    /// Wait until the fence is signaled or the timeout elapsed. `None` waits
    /// without limit. Returns whether the fence is signaled.
    fn wait_fence(&self, fence: &GpuFence, timeout: Option<Duration>) -> GpuResult<bool>;
}

/// Create the driver requested by `params`.
///
/// `Auto` tries the native drivers compiled in and never falls back to the
/// dummy driver.
pub(crate) fn create_driver(params: &DeviceParameters) -> GpuResult<Box<dyn Driver>> {
    let kind = params.resolved_driver()?;
    let logger = &params.logger;

    match kind {
        DriverKind::Dummy => create_dummy(params),
        DriverKind::Vulkan => create_vulkan(params),
        DriverKind::Auto => {
            let mut failures = Vec::new();
            match create_vulkan(params) {
                Ok(driver) => return Ok(driver),
                Err(e) => {
                    logger.warn(format_args!("failed to create Vulkan driver: {e}"));
                    failures.push(format!("vulkan: {e}"));
                }
            }
            Err(GpuError::Unsupported(format!(
                "no GPU driver could be created ({})",
                failures.join("; ")
            )))
        }
    }
}

fn create_dummy(params: &DeviceParameters) -> GpuResult<Box<dyn Driver>> {
    if !cfg!(feature = "dummy") {
        return Err(GpuError::Unsupported(
            "the dummy driver is not compiled in".to_string(),
        ));
    }
    let driver = dummy::DummyDriver::new(params)?;
    params.logger.info(format_args!("using dummy GPU driver"));
    Ok(Box::new(driver))
}

#[cfg(feature = "vulkan-backend")]
fn create_vulkan(params: &DeviceParameters) -> GpuResult<Box<dyn Driver>> {
    let driver = vulkan::VulkanDriver::new(params)?;
    params.logger.info(format_args!("using Vulkan GPU driver"));
    Ok(Box::new(driver))
}

#[cfg(not(feature = "vulkan-backend"))]
fn create_vulkan(_params: &DeviceParameters) -> GpuResult<Box<dyn Driver>> {
    Err(GpuError::Unsupported(
        "the Vulkan driver is not compiled in".to_string(),
    ))
}

/// Whether a native (non-dummy) driver is compiled in.
pub fn has_native_driver() -> bool {
    cfg!(feature = "vulkan-backend")
}
