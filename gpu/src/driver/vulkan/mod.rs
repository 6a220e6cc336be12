//! Vulkan driver.
//!
//! Submodules:
//! - `instance` / `device`: instance creation, adapter probing, logical device
//! - `context`: device-wide state shared by all native objects
//! - `resources`: buffers, textures, samplers, shaders, pipelines, fences
//! - `pipeline`: binding layout, render pass cache keys, pipeline creation
//! - `command`: command pools and command recording
//! - `swapchain`: per-window surfaces and swap chains
//! - `conversion`: mappings between crate types and Vulkan types
//! - `debug`: debug utils messenger routed into the device logger

mod command;
mod context;
mod conversion;
mod debug;
mod device;
mod instance;
mod pipeline;
mod resources;
mod swapchain;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{MappedMutexGuard, Mutex};

pub use command::{VulkanAllocator, VulkanCommandBuffer};
pub use context::VulkanContext;
pub use resources::{
    VulkanBuffer, VulkanCpuBuffer, VulkanFence, VulkanPipeline, VulkanSampler, VulkanShader,
    VulkanTexture,
};
pub use swapchain::VulkanSwapchain;

use super::{
    Driver, GpuBuffer, GpuCommandBuffer, GpuCpuBuffer, GpuFence, GpuPipeline, GpuSampler,
    GpuShader, GpuTexture, IndexedDraw,
};
use crate::adapter::AdapterInfo;
use crate::capabilities::DeviceCapabilities;
use crate::command_pool::{CommandPoolRegistry, PoolStats};
use crate::config::{DeviceParameters, DriverKind};
use crate::error::{ContractViolation, GpuResult};
use crate::resources::{Buffer, CpuBuffer, Pipeline, Sampler, Texture};
use crate::surface::{Window, WindowKey};
use crate::types::{
    BufferDescriptor, BufferImageLayout, Color, Extent3d, PipelineDescriptor,
    RenderPassDescriptor, SamplerDescriptor, ScissorRect, ShaderDescriptor, ShaderStage,
    TextureDescriptor, TextureRegion, Viewport,
};

/// Driver backed by a Vulkan 1.1 device.
pub struct VulkanDriver {
    context: Arc<VulkanContext>,
    info: AdapterInfo,
    capabilities: DeviceCapabilities,
    allocator: VulkanAllocator,
    pools: CommandPoolRegistry<VulkanAllocator>,
    windows: Mutex<HashMap<WindowKey, VulkanSwapchain>>,
}

impl VulkanDriver {
    pub fn new(params: &DeviceParameters) -> GpuResult<Self> {
        let (context, info, capabilities) = VulkanContext::new(params)?;
        let context = Arc::new(context);

        Ok(Self {
            allocator: VulkanAllocator::new(context.clone()),
            pools: CommandPoolRegistry::new(params.initial_pool_capacity, params.logger.clone()),
            windows: Mutex::new(HashMap::new()),
            context,
            info,
            capabilities,
        })
    }

    fn release(&self, buffer: GpuCommandBuffer) -> GpuResult<()> {
        let cmd = match buffer {
            GpuCommandBuffer::Vulkan(cmd) => cmd,
            _ => return Err(ContractViolation::ForeignResource.into()),
        };
        match cmd.into_pooled() {
            Some(pooled) => self.pools.release(pooled),
            None => Ok(()),
        }
    }
}

impl Driver for VulkanDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Vulkan
    }

    fn adapter_info(&self) -> &AdapterInfo {
        &self.info
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn wait_idle(&self) -> GpuResult<()> {
        self.context.wait_idle()
    }

    fn claim_window(&self, window: &dyn Window) -> GpuResult<()> {
        let key = WindowKey::of(window)?;
        let mut windows = self.windows.lock();
        if windows.contains_key(&key) {
            return Ok(());
        }
        let swapchain = VulkanSwapchain::new(&self.context, window)?;
        windows.insert(key, swapchain);
        Ok(())
    }

    fn unclaim_window(&self, window: &dyn Window) -> GpuResult<()> {
        let key = WindowKey::of(window)?;
        match self.windows.lock().remove(&key) {
            Some(_) => Ok(()),
            None => Err(ContractViolation::WindowNotClaimed.into()),
        }
    }

    fn acquire_backbuffer(
        &self,
        window: &dyn Window,
    ) -> GpuResult<(GpuTexture, TextureDescriptor)> {
        let key = WindowKey::of(window)?;
        let mut windows = self.windows.lock();
        let swapchain = windows
            .get_mut(&key)
            .ok_or(ContractViolation::WindowNotClaimed)?;
        let (texture, descriptor) = swapchain.acquire(window)?;
        Ok((GpuTexture::Vulkan(texture), descriptor))
    }

    fn present(&self, window: &dyn Window, swap_interval: u32) -> GpuResult<()> {
        let key = WindowKey::of(window)?;
        let mut windows = self.windows.lock();
        let swapchain = windows
            .get_mut(&key)
            .ok_or(ContractViolation::WindowNotClaimed)?;
        swapchain.present(swap_interval)
    }

    fn create_cpu_buffer(
        &self,
        label: Option<&str>,
        len: usize,
        initial: Option<&[u8]>,
    ) -> GpuResult<GpuCpuBuffer> {
        let buffer = VulkanCpuBuffer::new(&self.context, label, len, initial)?;
        Ok(GpuCpuBuffer::Vulkan(buffer))
    }

    fn lock_cpu_buffer<'a>(
        &self,
        buffer: &'a GpuCpuBuffer,
    ) -> GpuResult<MappedMutexGuard<'a, [u8]>> {
        buffer.as_vulkan()?.map()
    }

    fn unlock_cpu_buffer(&self, buffer: &GpuCpuBuffer) {
        if let Ok(buffer) = buffer.as_vulkan() {
            buffer.flush();
        }
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> GpuResult<GpuBuffer> {
        Ok(GpuBuffer::Vulkan(VulkanBuffer::new(&self.context, descriptor)?))
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> GpuResult<GpuTexture> {
        Ok(GpuTexture::Vulkan(VulkanTexture::new(&self.context, descriptor)?))
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GpuResult<GpuSampler> {
        Ok(GpuSampler::Vulkan(VulkanSampler::new(&self.context, descriptor)?))
    }

    fn create_shader(&self, descriptor: &ShaderDescriptor) -> GpuResult<GpuShader> {
        Ok(GpuShader::Vulkan(VulkanShader::new(&self.context, descriptor)?))
    }

    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> GpuResult<GpuPipeline> {
        Ok(GpuPipeline::Vulkan(VulkanPipeline::new(&self.context, descriptor)?))
    }

    fn acquire_command_buffer(&self, label: Option<&str>) -> GpuResult<GpuCommandBuffer> {
        let pooled = self.pools.acquire(&self.allocator)?;
        Ok(GpuCommandBuffer::Vulkan(VulkanCommandBuffer::new(
            &self.context,
            pooled,
            label,
        )))
    }

    fn submit(
        &self,
        buffers: &mut [&mut GpuCommandBuffer],
        fence: Option<&GpuFence>,
    ) -> GpuResult<()> {
        command::submit(&self.context, buffers, fence)
    }

    fn abandon_command_buffer(&self, buffer: GpuCommandBuffer) -> GpuResult<()> {
        self.release(buffer)
    }

    fn recycle_command_buffer(&self, buffer: GpuCommandBuffer) -> GpuResult<()> {
        self.release(buffer)
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        self.pools.stats()
    }

    fn pool_count(&self) -> usize {
        self.pools.pool_count()
    }

    fn begin_render_pass(
        &self,
        cmd: &mut GpuCommandBuffer,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.begin_render_pass(descriptor)
    }

    fn set_pipeline(&self, cmd: &mut GpuCommandBuffer, pipeline: &Pipeline) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.set_pipeline(pipeline)
    }

    fn set_viewport(&self, cmd: &mut GpuCommandBuffer, viewport: &Viewport) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.set_viewport(viewport);
        Ok(())
    }

    fn set_scissor(&self, cmd: &mut GpuCommandBuffer, scissor: &ScissorRect) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.set_scissor(scissor);
        Ok(())
    }

    fn set_blend_constant(&self, cmd: &mut GpuCommandBuffer, color: Color) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.set_blend_constant(color);
        Ok(())
    }

    fn set_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        buffer: &Buffer,
        offset: u32,
        index: u32,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.set_buffer(stage, buffer, offset, index)
    }

    fn set_sampler(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        sampler: &Sampler,
        index: u32,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.set_sampler(stage, sampler, index)
    }

    fn set_texture(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        texture: &Texture,
        index: u32,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.set_texture(stage, texture, index)
    }

    fn draw(
        &self,
        cmd: &mut GpuCommandBuffer,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
        base_instance: u32,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?
            .draw(vertex_start, vertex_count, instance_count, base_instance)
    }

    fn draw_indexed(&self, cmd: &mut GpuCommandBuffer, draw: &IndexedDraw<'_>) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.draw_indexed(draw)
    }

    fn end_render_pass(&self, cmd: &mut GpuCommandBuffer) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.end_render_pass();
        Ok(())
    }

    fn begin_blit_pass(&self, cmd: &mut GpuCommandBuffer) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.begin_blit_pass();
        Ok(())
    }

    fn copy_texture_to_texture(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Texture, TextureRegion),
        dst: (&Texture, TextureRegion),
        extent: Extent3d,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.copy_texture_to_texture(src, dst, extent)
    }

    fn fill_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        buffer: &Buffer,
        offset: u32,
        length: u32,
        value: u8,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.fill_buffer(buffer, offset, length, value)
    }

    fn generate_mipmaps(&self, cmd: &mut GpuCommandBuffer, texture: &Texture) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.generate_mipmaps(texture)
    }

    fn copy_cpu_to_gpu(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&CpuBuffer, u32),
        dst: (&Buffer, u32),
        length: u32,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.copy_cpu_to_gpu(src, dst, length)
    }

    fn copy_gpu_to_cpu(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Buffer, u32),
        dst: (&CpuBuffer, u32),
        length: u32,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.copy_gpu_to_cpu(src, dst, length)
    }

    fn copy_buffer_to_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Buffer, u32),
        dst: (&Buffer, u32),
        length: u32,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.copy_buffer_to_buffer(src, dst, length)
    }

    fn copy_buffer_to_texture(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Buffer, BufferImageLayout),
        dst: (&Texture, TextureRegion),
        extent: Extent3d,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.copy_buffer_to_texture(src, dst, extent)
    }

    fn copy_texture_to_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Texture, TextureRegion),
        dst: (&Buffer, BufferImageLayout),
        extent: Extent3d,
    ) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.copy_texture_to_buffer(src, dst, extent)
    }

    fn end_blit_pass(&self, cmd: &mut GpuCommandBuffer) -> GpuResult<()> {
        cmd.as_vulkan_mut()?.end_blit_pass();
        Ok(())
    }

    fn create_fence(&self) -> GpuResult<GpuFence> {
        Ok(GpuFence::Vulkan(VulkanFence::new(&self.context)?))
    }

    fn query_fence(&self, fence: &GpuFence) -> GpuResult<bool> {
        fence.as_vulkan()?.is_signaled()
    }

    fn reset_fence(&self, fence: &GpuFence) -> GpuResult<()> {
        fence.as_vulkan()?.reset()
    }

    fn wait_fence(&self, fence: &GpuFence, timeout: Option<Duration>) -> GpuResult<bool> {
        fence.as_vulkan()?.wait(timeout)
    }
}

impl Drop for VulkanDriver {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            self.context
                .logger
                .warn(format_args!("failed to idle Vulkan device on shutdown: {e}"));
        }
        self.windows.lock().clear();
        self.pools.destroy_all(&self.allocator);
        self.context
            .logger
            .debug(format_args!("Vulkan driver destroyed"));
    }
}
