//! Dummy driver for testing and headless validation.
//!
//! This driver has no native API behind it. It runs adapter selection over a
//! configurable list of fake adapters, pools command buffers like a real
//! driver, and executes buffer fills and copies when a command buffer is
//! submitted so transfers can be checked end to end. Nothing is rendered and
//! textures have no storage. Fences signal at submission.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use super::{
    Driver, GpuBuffer, GpuCommandBuffer, GpuCpuBuffer, GpuFence, GpuPipeline, GpuSampler,
    GpuShader, GpuTexture, IndexedDraw,
};
use crate::adapter::{
    select_adapter_with_verdicts, AdapterDescription, AdapterInfo, AdapterType, SurfaceSupport,
};
use crate::builder::{log_adapter, log_verdicts, LogicalDevicePlan, SupportedFeatures};
use crate::capabilities::{DeviceCapabilities, InstanceCapabilities};
use crate::command_pool::{CommandAllocator, CommandPoolRegistry, PoolStats, PooledCommandBuffer};
use crate::config::{DeviceParameters, DriverKind};
use crate::error::{ContractViolation, GpuError, GpuResult};
use crate::logging::DeviceLogger;
use crate::resources::{Buffer, CpuBuffer, Pipeline, Sampler, Texture};
use crate::surface::{Window, WindowKey};
use crate::types::{
    BufferDescriptor, BufferImageLayout, Color, Extent3d, PipelineDescriptor, PixelFormat,
    RenderPassDescriptor, SamplerDescriptor, ScissorRect, ShaderDescriptor, ShaderStage,
    TextureDescriptor, TextureRegion, TextureUsage, Viewport,
};

// ============================================================================
// Native objects
// ============================================================================

/// Byte storage shared by GPU and CPU buffers.
pub struct DummyBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl DummyBuffer {
    fn new(len: usize) -> Self {
        Self {
            data: Arc::new(Mutex::new(vec![0; len])),
        }
    }
}

pub struct DummyTexture;

pub struct DummySampler;

pub struct DummyShader;

pub struct DummyPipeline;

pub struct DummyFence {
    signaled: AtomicBool,
}

/// Command recorded for execution at submit time.
enum DummyOp {
    Fill {
        dst: Arc<Mutex<Vec<u8>>>,
        offset: usize,
        length: usize,
        value: u8,
    },
    Copy {
        src: Arc<Mutex<Vec<u8>>>,
        src_offset: usize,
        dst: Arc<Mutex<Vec<u8>>>,
        dst_offset: usize,
        length: usize,
    },
}

impl DummyOp {
    /// Bounds-check the op against the current buffer sizes.
    fn validate(&self) -> GpuResult<()> {
        match self {
            Self::Fill {
                dst, offset, length, ..
            } => {
                if offset + length > dst.lock().len() {
                    return Err(out_of_bounds("fill_buffer"));
                }
            }
            Self::Copy {
                src,
                src_offset,
                dst,
                dst_offset,
                length,
            } => {
                if src_offset + length > src.lock().len() {
                    return Err(out_of_bounds("copy source"));
                }
                if dst_offset + length > dst.lock().len() {
                    return Err(out_of_bounds("copy destination"));
                }
            }
        }
        Ok(())
    }

    fn execute(&self) -> GpuResult<()> {
        match self {
            Self::Fill {
                dst,
                offset,
                length,
                value,
            } => {
                let mut data = dst.lock();
                let range = data
                    .get_mut(*offset..*offset + *length)
                    .ok_or_else(|| out_of_bounds("fill_buffer"))?;
                range.fill(*value);
            }
            Self::Copy {
                src,
                src_offset,
                dst,
                dst_offset,
                length,
            } => {
                if Arc::ptr_eq(src, dst) {
                    let mut data = src.lock();
                    if src_offset + length > data.len() || dst_offset + length > data.len() {
                        return Err(out_of_bounds("copy"));
                    }
                    data.copy_within(*src_offset..*src_offset + *length, *dst_offset);
                } else {
                    // Copy through a temporary so two locks are never held at once.
                    let bytes = src
                        .lock()
                        .get(*src_offset..*src_offset + *length)
                        .map(<[u8]>::to_vec)
                        .ok_or_else(|| out_of_bounds("copy source"))?;
                    dst.lock()
                        .get_mut(*dst_offset..*dst_offset + *length)
                        .ok_or_else(|| out_of_bounds("copy destination"))?
                        .copy_from_slice(&bytes);
                }
            }
        }
        Ok(())
    }
}

fn out_of_bounds(what: &str) -> GpuError {
    GpuError::InvalidParameter(format!("{what} range is out of bounds"))
}

pub struct DummyCommandBuffer {
    pooled: PooledCommandBuffer<DummyAllocator>,
    label: Option<String>,
    ops: Vec<DummyOp>,
}

#[cfg(test)]
impl DummyCommandBuffer {
    /// Queue a fill that only fails once the buffer is submitted.
    pub(crate) fn push_out_of_bounds_fill(&mut self) {
        self.ops.push(DummyOp::Fill {
            dst: Arc::new(Mutex::new(vec![0; 4])),
            offset: 2,
            length: 4,
            value: 0,
        });
    }
}

// ============================================================================
// Command pools
// ============================================================================

/// Hands out sequential integers as command buffer handles.
#[derive(Default)]
pub struct DummyAllocator {
    next_handle: AtomicU64,
}

impl CommandAllocator for DummyAllocator {
    type Pool = ();
    type Buffer = u64;

    fn create_pool(&self) -> GpuResult<()> {
        Ok(())
    }

    fn allocate(&self, _pool: &mut (), count: u32) -> GpuResult<Vec<u64>> {
        let first = self
            .next_handle
            .fetch_add(u64::from(count), Ordering::Relaxed);
        Ok((first..first + u64::from(count)).collect())
    }

    fn reset(&self, _buffer: u64) -> GpuResult<()> {
        Ok(())
    }

    fn begin(&self, _buffer: u64) -> GpuResult<()> {
        Ok(())
    }

    fn destroy_pool(&self, _pool: ()) {}
}

// ============================================================================
// Driver
// ============================================================================

#[derive(Debug, Default)]
struct DummySwapchain {
    acquired: bool,
}

/// Driver without a native API.
pub struct DummyDriver {
    info: AdapterInfo,
    capabilities: DeviceCapabilities,
    logger: DeviceLogger,
    allocator: DummyAllocator,
    pools: CommandPoolRegistry<DummyAllocator>,
    windows: Mutex<HashMap<WindowKey, DummySwapchain>>,
}

impl DummyDriver {
    pub fn new(params: &DeviceParameters) -> GpuResult<Self> {
        let logger = params.logger.clone();
        let adapters = params.dummy_adapters.clone().unwrap_or_else(|| {
            vec![AdapterDescription::new("Dummy Adapter", AdapterType::Discrete)
                .with_surface_support(SurfaceSupport::Headless)]
        });

        let (selection, verdicts) = select_adapter_with_verdicts(&adapters);
        log_verdicts(&logger, &adapters, &verdicts);
        let selection = selection?;
        let adapter = &adapters[selection.index];

        let plan = LogicalDevicePlan::new(
            adapter,
            &selection,
            SupportedFeatures {
                fill_mode_non_solid: true,
                sampler_anisotropy: true,
            },
        )?;
        let capabilities = plan.capabilities(InstanceCapabilities::default());
        let info = AdapterInfo {
            name: adapter.name.clone(),
            adapter_type: adapter.adapter_type,
            queue_family: plan.queue_family,
            driver_name: Some("redlilium dummy".to_string()),
            driver_info: Some(env!("CARGO_PKG_VERSION").to_string()),
            conformance_version: None,
        };
        log_adapter(&logger, &info, &capabilities);

        Ok(Self {
            info,
            capabilities,
            pools: CommandPoolRegistry::new(params.initial_pool_capacity, logger.clone()),
            logger,
            allocator: DummyAllocator::default(),
            windows: Mutex::new(HashMap::new()),
        })
    }

    fn record(&self, cmd: &mut GpuCommandBuffer, op: DummyOp) -> GpuResult<()> {
        cmd.as_dummy_mut()?.ops.push(op);
        Ok(())
    }

    fn trace(&self, cmd: &GpuCommandBuffer, what: &str) {
        if let Ok(cmd) = cmd.as_dummy() {
            self.logger.trace(format_args!(
                "DummyDriver: {what} on {:?}",
                cmd.label.as_deref().unwrap_or("<unnamed>")
            ));
        }
    }

    fn release(&self, buffer: GpuCommandBuffer) -> GpuResult<()> {
        match buffer {
            GpuCommandBuffer::Dummy(cmd) => self.pools.release(cmd.pooled),
            #[allow(unreachable_patterns)]
            _ => Err(ContractViolation::ForeignResource.into()),
        }
    }
}

impl Driver for DummyDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Dummy
    }

    fn adapter_info(&self) -> &AdapterInfo {
        &self.info
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn wait_idle(&self) -> GpuResult<()> {
        Ok(())
    }

    fn claim_window(&self, window: &dyn Window) -> GpuResult<()> {
        let key = WindowKey::of(window)?;
        self.windows.lock().entry(key).or_default();
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
        let (width, height) = window.drawable_size();
        if width == 0 || height == 0 {
            return Err(GpuError::SurfaceUnavailable(
                "window has a zero-sized drawable".to_string(),
            ));
        }
        swapchain.acquired = true;
        let descriptor =
            TextureDescriptor::new_2d(width, height, PixelFormat::Bgra8Unorm, TextureUsage::RENDER_TARGET)
                .with_label("backbuffer");
        Ok((GpuTexture::Dummy(DummyTexture), descriptor))
    }

    fn present(&self, window: &dyn Window, _swap_interval: u32) -> GpuResult<()> {
        let key = WindowKey::of(window)?;
        let mut windows = self.windows.lock();
        let swapchain = windows
            .get_mut(&key)
            .ok_or(ContractViolation::WindowNotClaimed)?;
        if !swapchain.acquired {
            return Err(ContractViolation::NoBackbufferAcquired.into());
        }
        swapchain.acquired = false;
        Ok(())
    }

    fn create_cpu_buffer(
        &self,
        label: Option<&str>,
        len: usize,
        initial: Option<&[u8]>,
    ) -> GpuResult<GpuCpuBuffer> {
        self.logger.trace(format_args!(
            "DummyDriver: creating CPU buffer {label:?} (size: {len})"
        ));
        let buffer = DummyBuffer::new(len);
        if let Some(initial) = initial {
            buffer.data.lock()[..initial.len()].copy_from_slice(initial);
        }
        Ok(GpuCpuBuffer::Dummy(buffer))
    }

    fn lock_cpu_buffer<'a>(
        &self,
        buffer: &'a GpuCpuBuffer,
    ) -> GpuResult<MappedMutexGuard<'a, [u8]>> {
        let buffer = buffer.as_dummy()?;
        Ok(MutexGuard::map(buffer.data.lock(), |data| data.as_mut_slice()))
    }

    fn unlock_cpu_buffer(&self, _buffer: &GpuCpuBuffer) {}

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> GpuResult<GpuBuffer> {
        self.logger.trace(format_args!(
            "DummyDriver: creating buffer {:?} (size: {})",
            descriptor.label, descriptor.size
        ));
        let len = usize::try_from(descriptor.size)
            .map_err(|_| GpuError::OutOfMemory(format!("{} byte buffer", descriptor.size)))?;
        Ok(GpuBuffer::Dummy(DummyBuffer::new(len)))
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> GpuResult<GpuTexture> {
        self.logger.trace(format_args!(
            "DummyDriver: creating texture {:?} ({}x{}x{})",
            descriptor.label, descriptor.width, descriptor.height, descriptor.depth_or_slices
        ));
        Ok(GpuTexture::Dummy(DummyTexture))
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GpuResult<GpuSampler> {
        self.logger.trace(format_args!(
            "DummyDriver: creating sampler {:?}",
            descriptor.label
        ));
        Ok(GpuSampler::Dummy(DummySampler))
    }

    fn create_shader(&self, descriptor: &ShaderDescriptor) -> GpuResult<GpuShader> {
        self.logger.trace(format_args!(
            "DummyDriver: creating {} shader {:?}",
            descriptor.stage.name(),
            descriptor.label
        ));
        Ok(GpuShader::Dummy(DummyShader))
    }

    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> GpuResult<GpuPipeline> {
        self.logger.trace(format_args!(
            "DummyDriver: creating pipeline {:?}",
            descriptor.label
        ));
        Ok(GpuPipeline::Dummy(DummyPipeline))
    }

    fn acquire_command_buffer(&self, label: Option<&str>) -> GpuResult<GpuCommandBuffer> {
        let pooled = self.pools.acquire(&self.allocator)?;
        Ok(GpuCommandBuffer::Dummy(DummyCommandBuffer {
            pooled,
            label: label.map(str::to_string),
            ops: Vec::new(),
        }))
    }

    fn submit(
        &self,
        buffers: &mut [&mut GpuCommandBuffer],
        fence: Option<&GpuFence>,
    ) -> GpuResult<()> {
        let fence = fence.map(GpuFence::as_dummy).transpose()?;
        // Nothing executes unless every op of every buffer is in bounds.
        for buffer in buffers.iter_mut() {
            for op in &buffer.as_dummy_mut()?.ops {
                op.validate()?;
            }
        }
        for buffer in buffers.iter_mut() {
            let cmd = buffer.as_dummy_mut()?;
            self.logger.trace(format_args!(
                "DummyDriver: executing {} commands of {:?}",
                cmd.ops.len(),
                cmd.label
            ));
            for op in cmd.ops.drain(..) {
                op.execute()?;
            }
        }
        if let Some(fence) = fence {
            fence.signaled.store(true, Ordering::Release);
        }
        Ok(())
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
        cmd.as_dummy()?;
        self.logger.trace(format_args!(
            "DummyDriver: render pass {:?} with {} color attachments",
            descriptor.label,
            descriptor.color_attachments.len()
        ));
        Ok(())
    }

    fn set_pipeline(&self, cmd: &mut GpuCommandBuffer, pipeline: &Pipeline) -> GpuResult<()> {
        pipeline.raw().as_dummy()?;
        self.trace(cmd, "set_pipeline");
        Ok(())
    }

    fn set_viewport(&self, cmd: &mut GpuCommandBuffer, _viewport: &Viewport) -> GpuResult<()> {
        self.trace(cmd, "set_viewport");
        Ok(())
    }

    fn set_scissor(&self, cmd: &mut GpuCommandBuffer, _scissor: &ScissorRect) -> GpuResult<()> {
        self.trace(cmd, "set_scissor");
        Ok(())
    }

    fn set_blend_constant(&self, cmd: &mut GpuCommandBuffer, _color: Color) -> GpuResult<()> {
        self.trace(cmd, "set_blend_constant");
        Ok(())
    }

    fn set_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        _stage: ShaderStage,
        buffer: &Buffer,
        _offset: u32,
        _index: u32,
    ) -> GpuResult<()> {
        buffer.raw().as_dummy()?;
        self.trace(cmd, "set_buffer");
        Ok(())
    }

    fn set_sampler(
        &self,
        cmd: &mut GpuCommandBuffer,
        _stage: ShaderStage,
        sampler: &Sampler,
        _index: u32,
    ) -> GpuResult<()> {
        sampler.raw().as_dummy()?;
        self.trace(cmd, "set_sampler");
        Ok(())
    }

    fn set_texture(
        &self,
        cmd: &mut GpuCommandBuffer,
        _stage: ShaderStage,
        texture: &Texture,
        _index: u32,
    ) -> GpuResult<()> {
        texture.raw().as_dummy()?;
        self.trace(cmd, "set_texture");
        Ok(())
    }

    fn draw(
        &self,
        cmd: &mut GpuCommandBuffer,
        _vertex_start: u32,
        _vertex_count: u32,
        _instance_count: u32,
        _base_instance: u32,
    ) -> GpuResult<()> {
        self.trace(cmd, "draw");
        Ok(())
    }

    fn draw_indexed(&self, cmd: &mut GpuCommandBuffer, draw: &IndexedDraw<'_>) -> GpuResult<()> {
        draw.index_buffer.raw().as_dummy()?;
        self.trace(cmd, "draw_indexed");
        Ok(())
    }

    fn end_render_pass(&self, cmd: &mut GpuCommandBuffer) -> GpuResult<()> {
        self.trace(cmd, "end_render_pass");
        Ok(())
    }

    fn begin_blit_pass(&self, cmd: &mut GpuCommandBuffer) -> GpuResult<()> {
        self.trace(cmd, "begin_blit_pass");
        Ok(())
    }

    fn copy_texture_to_texture(
        &self,
        cmd: &mut GpuCommandBuffer,
        _src: (&Texture, TextureRegion),
        _dst: (&Texture, TextureRegion),
        _extent: Extent3d,
    ) -> GpuResult<()> {
        self.trace(cmd, "copy_texture_to_texture");
        Ok(())
    }

    fn fill_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        buffer: &Buffer,
        offset: u32,
        length: u32,
        value: u8,
    ) -> GpuResult<()> {
        let dst = buffer.raw().as_dummy()?.data.clone();
        self.record(
            cmd,
            DummyOp::Fill {
                dst,
                offset: offset as usize,
                length: length as usize,
                value,
            },
        )
    }

    fn generate_mipmaps(&self, cmd: &mut GpuCommandBuffer, _texture: &Texture) -> GpuResult<()> {
        self.trace(cmd, "generate_mipmaps");
        Ok(())
    }

    fn copy_cpu_to_gpu(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&CpuBuffer, u32),
        dst: (&Buffer, u32),
        length: u32,
    ) -> GpuResult<()> {
        let op = DummyOp::Copy {
            src: src.0.raw().as_dummy()?.data.clone(),
            src_offset: src.1 as usize,
            dst: dst.0.raw().as_dummy()?.data.clone(),
            dst_offset: dst.1 as usize,
            length: length as usize,
        };
        self.record(cmd, op)
    }

    fn copy_gpu_to_cpu(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Buffer, u32),
        dst: (&CpuBuffer, u32),
        length: u32,
    ) -> GpuResult<()> {
        let op = DummyOp::Copy {
            src: src.0.raw().as_dummy()?.data.clone(),
            src_offset: src.1 as usize,
            dst: dst.0.raw().as_dummy()?.data.clone(),
            dst_offset: dst.1 as usize,
            length: length as usize,
        };
        self.record(cmd, op)
    }

    fn copy_buffer_to_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: (&Buffer, u32),
        dst: (&Buffer, u32),
        length: u32,
    ) -> GpuResult<()> {
        let op = DummyOp::Copy {
            src: src.0.raw().as_dummy()?.data.clone(),
            src_offset: src.1 as usize,
            dst: dst.0.raw().as_dummy()?.data.clone(),
            dst_offset: dst.1 as usize,
            length: length as usize,
        };
        self.record(cmd, op)
    }

    fn copy_buffer_to_texture(
        &self,
        cmd: &mut GpuCommandBuffer,
        _src: (&Buffer, BufferImageLayout),
        _dst: (&Texture, TextureRegion),
        _extent: Extent3d,
    ) -> GpuResult<()> {
        self.trace(cmd, "copy_buffer_to_texture");
        Ok(())
    }

    fn copy_texture_to_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        _src: (&Texture, TextureRegion),
        _dst: (&Buffer, BufferImageLayout),
        _extent: Extent3d,
    ) -> GpuResult<()> {
        self.trace(cmd, "copy_texture_to_buffer");
        Ok(())
    }

    fn end_blit_pass(&self, cmd: &mut GpuCommandBuffer) -> GpuResult<()> {
        self.trace(cmd, "end_blit_pass");
        Ok(())
    }

    fn create_fence(&self) -> GpuResult<GpuFence> {
        Ok(GpuFence::Dummy(DummyFence {
            signaled: AtomicBool::new(false),
        }))
    }

    fn query_fence(&self, fence: &GpuFence) -> GpuResult<bool> {
        Ok(fence.as_dummy()?.signaled.load(Ordering::Acquire))
    }

    fn reset_fence(&self, fence: &GpuFence) -> GpuResult<()> {
        fence.as_dummy()?.signaled.store(false, Ordering::Release);
        Ok(())
    }

    fn wait_fence(&self, fence: &GpuFence, _timeout: Option<Duration>) -> GpuResult<bool> {
        // Submissions complete immediately, so there is never anything to wait for.
        self.query_fence(fence)
    }
}

impl Drop for DummyDriver {
    fn drop(&mut self) {
        self.pools.destroy_all(&self.allocator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::DeviceExtensions;
    use crate::logging::tests::CapturingSink;
    use crate::surface::tests::FakeWindow;

    fn driver() -> DummyDriver {
        DummyDriver::new(&DeviceParameters::new().with_driver(DriverKind::Dummy)).unwrap()
    }

    #[test]
    fn test_default_adapter() {
        let driver = driver();
        assert_eq!(driver.adapter_info().name, "Dummy Adapter");
        assert_eq!(driver.adapter_info().adapter_type, AdapterType::Discrete);
        assert!(driver.capabilities().extensions.supports_required());
    }

    #[test]
    fn test_selection_failure_surfaces_as_unsupported() {
        let params = DeviceParameters::new().with_dummy_adapters(vec![
            AdapterDescription::new("igpu", AdapterType::Integrated),
            AdapterDescription::new("dgpu", AdapterType::Discrete)
                .with_extensions(DeviceExtensions::KHR_SWAPCHAIN),
            AdapterDescription::new("vgpu", AdapterType::Virtual),
        ]);
        assert!(matches!(
            DummyDriver::new(&params),
            Err(GpuError::Unsupported(_))
        ));
    }

    #[test]
    fn test_creation_logs_adapter() {
        let sink = Arc::new(CapturingSink::default());
        let params = DeviceParameters::new().with_log_sink(sink.clone());
        let _driver = DummyDriver::new(&params).unwrap();
        let records = sink.records.lock();
        assert!(records
            .iter()
            .any(|(_, msg)| msg.contains("GPU adapter: Dummy Adapter")));
    }

    #[test]
    fn test_ops_execute_in_order() {
        let a = Arc::new(Mutex::new(vec![0u8; 8]));
        let b = Arc::new(Mutex::new(vec![0u8; 8]));
        let ops = [
            DummyOp::Fill {
                dst: a.clone(),
                offset: 0,
                length: 4,
                value: 7,
            },
            DummyOp::Copy {
                src: a.clone(),
                src_offset: 0,
                dst: b.clone(),
                dst_offset: 4,
                length: 4,
            },
            DummyOp::Copy {
                src: b.clone(),
                src_offset: 4,
                dst: b.clone(),
                dst_offset: 0,
                length: 2,
            },
        ];
        for op in &ops {
            op.execute().unwrap();
        }
        assert_eq!(*a.lock(), [7, 7, 7, 7, 0, 0, 0, 0]);
        assert_eq!(*b.lock(), [7, 7, 0, 0, 7, 7, 7, 7]);

        let overflow = DummyOp::Fill {
            dst: a,
            offset: 6,
            length: 4,
            value: 1,
        };
        assert!(matches!(
            overflow.execute(),
            Err(GpuError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_failed_batch_applies_nothing() {
        let driver = driver();
        let data = Arc::new(Mutex::new(vec![0u8; 8]));

        let mut first = driver.acquire_command_buffer(Some("first")).unwrap();
        first.as_dummy_mut().unwrap().ops.push(DummyOp::Fill {
            dst: data.clone(),
            offset: 0,
            length: 8,
            value: 9,
        });
        let mut second = driver.acquire_command_buffer(Some("second")).unwrap();
        second.as_dummy_mut().unwrap().ops.push(DummyOp::Copy {
            src: data.clone(),
            src_offset: 4,
            dst: data.clone(),
            dst_offset: 0,
            length: 8,
        });

        assert!(matches!(
            driver.submit(&mut [&mut first, &mut second], None),
            Err(GpuError::InvalidParameter(_))
        ));
        assert_eq!(*data.lock(), [0; 8]);

        driver.abandon_command_buffer(first).unwrap();
        driver.abandon_command_buffer(second).unwrap();
    }

    #[test]
    fn test_window_lifecycle() {
        let driver = driver();
        let window = FakeWindow {
            id: 7,
            size: (320, 200),
        };
        assert_eq!(
            driver.acquire_backbuffer(&window).unwrap_err(),
            GpuError::ContractViolation(ContractViolation::WindowNotClaimed)
        );

        driver.claim_window(&window).unwrap();
        assert_eq!(
            driver.present(&window, 1).unwrap_err(),
            GpuError::ContractViolation(ContractViolation::NoBackbufferAcquired)
        );
        let (_texture, descriptor) = driver.acquire_backbuffer(&window).unwrap();
        assert_eq!((descriptor.width, descriptor.height), (320, 200));
        driver.present(&window, 1).unwrap();

        driver.unclaim_window(&window).unwrap();
        assert!(driver.unclaim_window(&window).is_err());
    }
}
