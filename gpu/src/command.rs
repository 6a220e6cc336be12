//! Command buffer recording.
//!
//! A [`CommandBuffer`] records render and blit passes for one submission. It
//! is tied to the thread that acquired it, since it came from that thread's
//! command pool, and is therefore neither `Send` nor `Sync`.
//!
//! Every call is checked against the [`PassRecorder`] state and its
//! arguments are validated before anything reaches the driver, so an
//! erroneous call records nothing.
//!
//! # Example
//!
//! ```ignore
//! let mut cmd = device.acquire_command_buffer(Some("frame"))?;
//! cmd.begin_render_pass(
//!     &RenderPassDescriptor::new()
//!         .with_color_attachment(ColorAttachment::clear(&backbuffer, Color::BLACK)),
//! )?;
//! cmd.set_pipeline(&pipeline)?;
//! cmd.set_vertex_buffer(&vertices, 0, 0)?;
//! cmd.draw(0, 3)?;
//! cmd.end_render_pass()?;
//! device.submit(&mut cmd, None)?;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use crate::device::GpuDevice;
use crate::driver::{Driver, GpuCommandBuffer, IndexedDraw};
use crate::error::{ContractViolation, GpuError, GpuResult};
use crate::pass::{PassKind, PassRecorder, RecordingState};
use crate::resources::{Buffer, CpuBuffer, Pipeline, Sampler, Texture};
use crate::types::{
    BufferImageLayout, BufferUsage, Color, Extent3d, IndexType, RenderPassDescriptor,
    ScissorRect, ShaderStage, TextureRegion, TextureUsage, Viewport, MAX_BUFFER_SLOTS,
    MAX_SAMPLER_SLOTS, MAX_TEXTURE_SLOTS,
};

/// A command buffer checked out of the calling thread's pool.
///
/// Obtain one with [`GpuDevice::acquire_command_buffer`]. It leaves the
/// recording state only through [`GpuDevice::submit`] or
/// [`GpuDevice::abandon_command_buffer`]. Dropping a buffer that was never
/// submitted abandons it.
pub struct CommandBuffer {
    device: Arc<GpuDevice>,
    raw: Option<GpuCommandBuffer>,
    recorder: PassRecorder,
    draw_state: DrawState,
    label: Option<String>,
    _not_send: PhantomData<*const ()>,
}

impl CommandBuffer {
    pub(crate) fn new(device: Arc<GpuDevice>, raw: GpuCommandBuffer, label: Option<String>) -> Self {
        Self {
            device,
            raw: Some(raw),
            recorder: PassRecorder::new(),
            draw_state: DrawState::default(),
            label,
            _not_send: PhantomData,
        }
    }

    pub fn device(&self) -> &Arc<GpuDevice> {
        &self.device
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Current recording state.
    pub fn state(&self) -> RecordingState {
        self.recorder.state()
    }

    pub(crate) fn recorder(&self) -> &PassRecorder {
        &self.recorder
    }

    pub(crate) fn belongs_to(&self, device: &GpuDevice) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.device), device)
    }

    pub(crate) fn raw_mut(&mut self) -> GpuResult<&mut GpuCommandBuffer> {
        self.raw
            .as_mut()
            .ok_or_else(|| ContractViolation::AlreadySubmitted.into())
    }

    pub(crate) fn take_raw(&mut self) -> Option<GpuCommandBuffer> {
        self.raw.take()
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.recorder.mark_submitted();
    }

    pub(crate) fn mark_failed(&mut self) {
        self.recorder.mark_failed();
    }

    /// Validate that `operation` may be recorded inside a `kind` pass, then
    /// hand the native buffer to `record`.
    fn record(
        &mut self,
        kind: PassKind,
        operation: &'static str,
        record: impl FnOnce(&dyn Driver, &mut GpuCommandBuffer) -> GpuResult<()>,
    ) -> GpuResult<()> {
        self.recorder.require(kind, operation)?;
        let raw = self
            .raw
            .as_mut()
            .ok_or(ContractViolation::AlreadySubmitted)?;
        record(self.device.driver(), raw)
    }

    fn check_owned<R: crate::resources::DeviceOwned>(&self, resource: &R) -> GpuResult<()> {
        self.device.check_owned(resource)
    }

    // ------------------------------------------------------------------
    // Render pass
    // ------------------------------------------------------------------

    /// Begin a render pass on the attachments in `descriptor`.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::PassAlreadyOpen`] when a pass is open, or
    /// [`GpuError::InvalidParameter`] for unusable attachments. The state is
    /// unchanged on error.
    pub fn begin_render_pass(&mut self, descriptor: &RenderPassDescriptor<'_>) -> GpuResult<()> {
        self.recorder.check_begin(PassKind::Render)?;
        descriptor.validate()?;
        for attachment in &descriptor.color_attachments {
            self.check_owned(attachment.texture)?;
        }
        if let Some(texture) = descriptor.depth_stencil_texture() {
            self.check_owned(texture)?;
        }
        if let Some(pipeline) = descriptor.initial_pipeline {
            self.check_owned(pipeline)?;
        }

        let raw = self
            .raw
            .as_mut()
            .ok_or(ContractViolation::AlreadySubmitted)?;
        let driver = self.device.driver();
        self.recorder.begin(PassKind::Render, || {
            driver.begin_render_pass(raw, descriptor)
        })?;
        self.draw_state = DrawState::for_pass(descriptor.initial_pipeline);
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> GpuResult<()> {
        let raw = self
            .raw
            .as_mut()
            .ok_or(ContractViolation::AlreadySubmitted)?;
        let driver = self.device.driver();
        self.recorder
            .end(PassKind::Render, "end_render_pass", || driver.end_render_pass(raw))
    }

    pub fn set_pipeline(&mut self, pipeline: &Pipeline) -> GpuResult<()> {
        self.check_owned(pipeline)?;
        self.record(PassKind::Render, "set_pipeline", |driver, raw| {
            driver.set_pipeline(raw, pipeline)
        })?;
        self.draw_state.bind_pipeline(pipeline);
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) -> GpuResult<()> {
        if viewport.width <= 0.0 || viewport.height <= 0.0 {
            return Err(GpuError::InvalidParameter(format!(
                "viewport size {}x{} must be positive",
                viewport.width, viewport.height
            )));
        }
        self.record(PassKind::Render, "set_viewport", |driver, raw| {
            driver.set_viewport(raw, viewport)
        })
    }

    pub fn set_scissor(&mut self, scissor: &ScissorRect) -> GpuResult<()> {
        self.record(PassKind::Render, "set_scissor", |driver, raw| {
            driver.set_scissor(raw, scissor)
        })
    }

    /// Constant color used by the `Constant*` blend factors.
    pub fn set_blend_constant(&mut self, color: Color) -> GpuResult<()> {
        self.record(PassKind::Render, "set_blend_constant", |driver, raw| {
            driver.set_blend_constant(raw, color)
        })
    }

    fn set_buffer(
        &mut self,
        operation: &'static str,
        stage: ShaderStage,
        buffer: &Buffer,
        offset: u32,
        index: u32,
    ) -> GpuResult<()> {
        self.check_owned(buffer)?;
        check_slot("buffer", index, MAX_BUFFER_SLOTS)?;
        if u64::from(offset) >= buffer.size() {
            return Err(GpuError::InvalidParameter(format!(
                "offset {offset} is past the end of a {} byte buffer",
                buffer.size()
            )));
        }
        self.record(PassKind::Render, operation, |driver, raw| {
            driver.set_buffer(raw, stage, buffer, offset, index)
        })
    }

    fn set_sampler(
        &mut self,
        operation: &'static str,
        stage: ShaderStage,
        sampler: &Sampler,
        index: u32,
    ) -> GpuResult<()> {
        self.check_owned(sampler)?;
        check_slot("sampler", index, MAX_SAMPLER_SLOTS)?;
        self.record(PassKind::Render, operation, |driver, raw| {
            driver.set_sampler(raw, stage, sampler, index)
        })
    }

    fn set_texture(
        &mut self,
        operation: &'static str,
        stage: ShaderStage,
        texture: &Texture,
        index: u32,
    ) -> GpuResult<()> {
        self.check_owned(texture)?;
        check_slot("texture", index, MAX_TEXTURE_SLOTS)?;
        if !texture
            .usage()
            .intersects(TextureUsage::SHADER_READ | TextureUsage::SHADER_WRITE)
        {
            return Err(GpuError::InvalidParameter(format!(
                "texture {:?} is not usable from shaders",
                texture.label()
            )));
        }
        self.record(PassKind::Render, operation, |driver, raw| {
            driver.set_texture(raw, stage, texture, index)
        })
    }

    /// Bind `buffer` at slot `index` of the vertex stage, starting at
    /// `offset` bytes. Slots used by the pipeline's vertex attributes feed
    /// vertex input; other slots are uniform buffers.
    pub fn set_vertex_buffer(&mut self, buffer: &Buffer, offset: u32, index: u32) -> GpuResult<()> {
        self.set_buffer("set_vertex_buffer", ShaderStage::Vertex, buffer, offset, index)?;
        self.draw_state.vertex_buffers |= 1 << index;
        Ok(())
    }

    pub fn set_vertex_sampler(&mut self, sampler: &Sampler, index: u32) -> GpuResult<()> {
        self.set_sampler("set_vertex_sampler", ShaderStage::Vertex, sampler, index)
    }

    pub fn set_vertex_texture(&mut self, texture: &Texture, index: u32) -> GpuResult<()> {
        self.set_texture("set_vertex_texture", ShaderStage::Vertex, texture, index)
    }

    /// Bind a uniform buffer at slot `index` of the fragment stage.
    pub fn set_fragment_buffer(
        &mut self,
        buffer: &Buffer,
        offset: u32,
        index: u32,
    ) -> GpuResult<()> {
        self.set_buffer("set_fragment_buffer", ShaderStage::Fragment, buffer, offset, index)
    }

    pub fn set_fragment_sampler(&mut self, sampler: &Sampler, index: u32) -> GpuResult<()> {
        self.set_sampler("set_fragment_sampler", ShaderStage::Fragment, sampler, index)
    }

    pub fn set_fragment_texture(&mut self, texture: &Texture, index: u32) -> GpuResult<()> {
        self.set_texture("set_fragment_texture", ShaderStage::Fragment, texture, index)
    }

    /// Draw `vertex_count` vertices starting at `vertex_start`.
    pub fn draw(&mut self, vertex_start: u32, vertex_count: u32) -> GpuResult<()> {
        self.record_draw("draw", |driver, raw| {
            driver.draw(raw, vertex_start, vertex_count, 1, 0)
        })
    }

    pub fn draw_instanced(
        &mut self,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
        base_instance: u32,
    ) -> GpuResult<()> {
        self.record_draw("draw_instanced", |driver, raw| {
            driver.draw(raw, vertex_start, vertex_count, instance_count, base_instance)
        })
    }

    /// Draw `index_count` indices read from `index_buffer` at byte offset
    /// `index_offset`.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        index_type: IndexType,
        index_buffer: &Buffer,
        index_offset: u32,
    ) -> GpuResult<()> {
        self.draw_indexed_inner(
            "draw_indexed",
            &IndexedDraw {
                index_count,
                index_type,
                index_buffer,
                index_offset,
                instance_count: 1,
                base_vertex: 0,
                base_instance: 0,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_instanced_indexed(
        &mut self,
        index_count: u32,
        index_type: IndexType,
        index_buffer: &Buffer,
        index_offset: u32,
        instance_count: u32,
        base_vertex: i32,
        base_instance: u32,
    ) -> GpuResult<()> {
        self.draw_indexed_inner(
            "draw_instanced_indexed",
            &IndexedDraw {
                index_count,
                index_type,
                index_buffer,
                index_offset,
                instance_count,
                base_vertex,
                base_instance,
            },
        )
    }

    fn draw_indexed_inner(&mut self, operation: &'static str, draw: &IndexedDraw<'_>) -> GpuResult<()> {
        let buffer = draw.index_buffer;
        self.check_owned(buffer)?;
        if !buffer.usage().contains(BufferUsage::INDEX) {
            return Err(GpuError::InvalidParameter(format!(
                "buffer {:?} was not created with INDEX usage",
                buffer.label()
            )));
        }
        if draw.index_offset % draw.index_type.size() != 0 {
            return Err(GpuError::InvalidParameter(format!(
                "index offset {} is not aligned to the index size",
                draw.index_offset
            )));
        }
        self.record_draw(operation, |driver, raw| driver.draw_indexed(raw, draw))
    }

    /// Like [`Self::record`] for draws, which also need a pipeline and every
    /// vertex buffer slot it reads.
    fn record_draw(
        &mut self,
        operation: &'static str,
        record: impl FnOnce(&dyn Driver, &mut GpuCommandBuffer) -> GpuResult<()>,
    ) -> GpuResult<()> {
        self.recorder.require(PassKind::Render, operation)?;
        self.draw_state.check(operation)?;
        self.record(PassKind::Render, operation, record)
    }

    // ------------------------------------------------------------------
    // Blit pass
    // ------------------------------------------------------------------

    pub fn begin_blit_pass(&mut self) -> GpuResult<()> {
        let raw = self
            .raw
            .as_mut()
            .ok_or(ContractViolation::AlreadySubmitted)?;
        let driver = self.device.driver();
        self.recorder
            .begin(PassKind::Blit, || driver.begin_blit_pass(raw))
    }

    pub fn end_blit_pass(&mut self) -> GpuResult<()> {
        let raw = self
            .raw
            .as_mut()
            .ok_or(ContractViolation::AlreadySubmitted)?;
        let driver = self.device.driver();
        self.recorder
            .end(PassKind::Blit, "end_blit_pass", || driver.end_blit_pass(raw))
    }

    /// Copy a box of texels between textures of the same format.
    pub fn copy_texture_to_texture(
        &mut self,
        src: &Texture,
        src_region: TextureRegion,
        dst: &Texture,
        dst_region: TextureRegion,
        extent: Extent3d,
    ) -> GpuResult<()> {
        self.check_owned(src)?;
        self.check_owned(dst)?;
        if src.format() != dst.format() {
            return Err(GpuError::InvalidParameter(format!(
                "cannot copy {:?} texels into a {:?} texture",
                src.format(),
                dst.format()
            )));
        }
        check_region(src, &src_region, extent)?;
        check_region(dst, &dst_region, extent)?;
        check_blit_target(dst)?;
        self.record(PassKind::Blit, "copy_texture_to_texture", |driver, raw| {
            driver.copy_texture_to_texture(raw, (src, src_region), (dst, dst_region), extent)
        })
    }

    /// Fill `length` bytes of `buffer` at `offset` with `value`.
    ///
    /// Offset and length must be multiples of 4.
    pub fn fill_buffer(&mut self, buffer: &Buffer, offset: u32, length: u32, value: u8) -> GpuResult<()> {
        self.check_owned(buffer)?;
        if offset % 4 != 0 || length % 4 != 0 {
            return Err(GpuError::InvalidParameter(format!(
                "fill range {offset}+{length} is not 4-byte aligned"
            )));
        }
        check_buffer_range(buffer, offset, length)?;
        self.record(PassKind::Blit, "fill_buffer", |driver, raw| {
            driver.fill_buffer(raw, buffer, offset, length, value)
        })
    }

    /// Regenerate mip levels 1.. of `texture` from level 0.
    pub fn generate_mipmaps(&mut self, texture: &Texture) -> GpuResult<()> {
        self.check_owned(texture)?;
        if texture.format().is_depth_stencil() {
            return Err(GpuError::InvalidParameter(
                "cannot generate mipmaps for a depth/stencil texture".to_string(),
            ));
        }
        check_blit_target(texture)?;
        self.record(PassKind::Blit, "generate_mipmaps", |driver, raw| {
            if texture.mip_levels() > 1 {
                driver.generate_mipmaps(raw, texture)
            } else {
                Ok(())
            }
        })
    }

    pub fn copy_cpu_to_gpu(
        &mut self,
        src: &CpuBuffer,
        src_offset: u32,
        dst: &Buffer,
        dst_offset: u32,
        length: u32,
    ) -> GpuResult<()> {
        self.check_owned(src)?;
        self.check_owned(dst)?;
        check_cpu_range(src, src_offset, length)?;
        check_buffer_range(dst, dst_offset, length)?;
        self.record(PassKind::Blit, "copy_cpu_to_gpu", |driver, raw| {
            driver.copy_cpu_to_gpu(raw, (src, src_offset), (dst, dst_offset), length)
        })
    }

    pub fn copy_gpu_to_cpu(
        &mut self,
        src: &Buffer,
        src_offset: u32,
        dst: &CpuBuffer,
        dst_offset: u32,
        length: u32,
    ) -> GpuResult<()> {
        self.check_owned(src)?;
        self.check_owned(dst)?;
        check_buffer_range(src, src_offset, length)?;
        check_cpu_range(dst, dst_offset, length)?;
        self.record(PassKind::Blit, "copy_gpu_to_cpu", |driver, raw| {
            driver.copy_gpu_to_cpu(raw, (src, src_offset), (dst, dst_offset), length)
        })
    }

    /// Copy between buffers. Overlapping ranges of the same buffer are
    /// rejected.
    pub fn copy_buffer_to_buffer(
        &mut self,
        src: &Buffer,
        src_offset: u32,
        dst: &Buffer,
        dst_offset: u32,
        length: u32,
    ) -> GpuResult<()> {
        self.check_owned(src)?;
        self.check_owned(dst)?;
        check_buffer_range(src, src_offset, length)?;
        check_buffer_range(dst, dst_offset, length)?;
        if std::ptr::eq(src, dst)
            && src_offset < dst_offset.saturating_add(length)
            && dst_offset < src_offset.saturating_add(length)
        {
            return Err(GpuError::InvalidParameter(
                "source and destination ranges overlap".to_string(),
            ));
        }
        self.record(PassKind::Blit, "copy_buffer_to_buffer", |driver, raw| {
            driver.copy_buffer_to_buffer(raw, (src, src_offset), (dst, dst_offset), length)
        })
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        src: &Buffer,
        layout: BufferImageLayout,
        dst: &Texture,
        region: TextureRegion,
        extent: Extent3d,
    ) -> GpuResult<()> {
        self.check_owned(src)?;
        self.check_owned(dst)?;
        check_region(dst, &region, extent)?;
        check_image_layout(src, &layout, dst, extent)?;
        check_blit_target(dst)?;
        self.record(PassKind::Blit, "copy_buffer_to_texture", |driver, raw| {
            driver.copy_buffer_to_texture(raw, (src, layout), (dst, region), extent)
        })
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        src: &Texture,
        region: TextureRegion,
        dst: &Buffer,
        layout: BufferImageLayout,
        extent: Extent3d,
    ) -> GpuResult<()> {
        self.check_owned(src)?;
        self.check_owned(dst)?;
        check_region(src, &region, extent)?;
        check_image_layout(dst, &layout, src, extent)?;
        self.record(PassKind::Blit, "copy_texture_to_buffer", |driver, raw| {
            driver.copy_texture_to_buffer(raw, (src, region), (dst, layout), extent)
        })
    }
}

fn check_slot(kind: &str, index: u32, max: u32) -> GpuResult<()> {
    if index >= max {
        return Err(GpuError::InvalidParameter(format!(
            "{kind} slot {index} exceeds the maximum of {max}"
        )));
    }
    Ok(())
}

fn check_buffer_range(buffer: &Buffer, offset: u32, length: u32) -> GpuResult<()> {
    if length == 0 || !buffer.contains_range(offset, length) {
        return Err(GpuError::InvalidParameter(format!(
            "range {offset}+{length} does not fit buffer {:?} of {} bytes",
            buffer.label(),
            buffer.size()
        )));
    }
    Ok(())
}

fn check_cpu_range(buffer: &CpuBuffer, offset: u32, length: u32) -> GpuResult<()> {
    if length == 0 || !buffer.contains_range(offset, length) {
        return Err(GpuError::InvalidParameter(format!(
            "range {offset}+{length} does not fit CPU buffer {:?} of {} bytes",
            buffer.label(),
            buffer.len()
        )));
    }
    Ok(())
}

/// Render pass bindings a draw depends on. Reset at every render pass.
#[derive(Debug, Default)]
struct DrawState {
    /// Vertex buffer slots the bound pipeline reads, `None` until a pipeline
    /// is bound.
    pipeline_slots: Option<Vec<u32>>,
    /// Bit `n` is set once vertex slot `n` holds a buffer.
    vertex_buffers: u32,
}

impl DrawState {
    fn for_pass(pipeline: Option<&Pipeline>) -> Self {
        let mut state = Self::default();
        if let Some(pipeline) = pipeline {
            state.bind_pipeline(pipeline);
        }
        state
    }

    fn bind_pipeline(&mut self, pipeline: &Pipeline) {
        let mut slots: Vec<u32> = pipeline
            .descriptor()
            .vertex_attributes
            .iter()
            .map(|attribute| attribute.index)
            .collect();
        slots.sort_unstable();
        slots.dedup();
        self.pipeline_slots = Some(slots);
    }

    fn check(&self, operation: &str) -> GpuResult<()> {
        let Some(slots) = &self.pipeline_slots else {
            return Err(GpuError::InvalidParameter(format!(
                "{operation} issued without a pipeline"
            )));
        };
        match slots
            .iter()
            .find(|&&slot| self.vertex_buffers & (1 << slot) == 0)
        {
            Some(slot) => Err(GpuError::InvalidParameter(format!(
                "{operation} reads vertex slot {slot}, which has no buffer bound"
            ))),
            None => Ok(()),
        }
    }
}

fn check_region(texture: &Texture, region: &TextureRegion, extent: Extent3d) -> GpuResult<()> {
    if extent.is_empty() || !texture.contains_region(region, extent) {
        return Err(GpuError::InvalidParameter(format!(
            "region {region:?} with extent {extent:?} does not fit texture {:?}",
            texture.label()
        )));
    }
    Ok(())
}

fn check_image_layout(
    buffer: &Buffer,
    layout: &BufferImageLayout,
    texture: &Texture,
    extent: Extent3d,
) -> GpuResult<()> {
    let required = layout.required_size(extent, texture.format().bytes_per_pixel());
    if required > buffer.size() {
        return Err(GpuError::InvalidParameter(format!(
            "buffer {:?} holds {} bytes, the copy starting at offset {} ends at {}",
            buffer.label(),
            buffer.size(),
            layout.offset,
            required
        )));
    }
    Ok(())
}

fn check_blit_target(texture: &Texture) -> GpuResult<()> {
    if texture.is_backbuffer() {
        return Err(GpuError::InvalidParameter(
            "swap chain images can only be written by render passes".to_string(),
        ));
    }
    Ok(())
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        let Some(raw) = self.raw.take() else {
            return;
        };
        if self.recorder.is_submitted() {
            // Never recycled. The native handle stays parked in its pool.
            self.device.logger().debug(format_args!(
                "command buffer {:?} dropped without recycling",
                self.label
            ));
            drop(raw);
            return;
        }
        if let Err(e) = self.device.driver().abandon_command_buffer(raw) {
            self.device
                .logger()
                .warn(format_args!("failed to abandon command buffer: {e}"));
        }
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("label", &self.label)
            .field("state", &self.recorder.state())
            .finish()
    }
}

static_assertions::assert_not_impl_any!(CommandBuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BufferDescriptor, ColorAttachment, PipelineDescriptor, PixelFormat, ShaderDescriptor,
        TextureDescriptor, VertexAttribute, VertexFormat,
    };
    use crate::{DeviceParameters, DriverKind};

    fn device() -> Arc<GpuDevice> {
        GpuDevice::new(DeviceParameters::new().with_driver(DriverKind::Dummy)).unwrap()
    }

    fn target(device: &Arc<GpuDevice>) -> Arc<Texture> {
        device
            .create_texture(&TextureDescriptor::new_2d(
                32,
                32,
                PixelFormat::Rgba8Unorm,
                TextureUsage::RENDER_TARGET | TextureUsage::SHADER_READ,
            ))
            .unwrap()
    }

    fn pipeline(device: &Arc<GpuDevice>, attributes: &[VertexAttribute]) -> Arc<Pipeline> {
        let vs = device
            .create_shader(&ShaderDescriptor::new(ShaderStage::Vertex, vec![0; 4]))
            .unwrap();
        let fs = device
            .create_shader(&ShaderDescriptor::new(ShaderStage::Fragment, vec![0; 4]))
            .unwrap();
        let descriptor = attributes
            .iter()
            .fold(PipelineDescriptor::new(vs, fs), |descriptor, attribute| {
                descriptor.with_vertex_attribute(*attribute)
            });
        device.create_pipeline(&descriptor).unwrap()
    }

    #[test]
    fn test_draw_outside_pass_rejected() {
        let device = device();
        let mut cmd = device.acquire_command_buffer(None).unwrap();
        assert_eq!(
            cmd.draw(0, 3).unwrap_err(),
            GpuError::ContractViolation(ContractViolation::PassNotOpen {
                operation: "draw",
                required: "render"
            })
        );
        assert_eq!(cmd.state(), RecordingState::Recording);
    }

    #[test]
    fn test_render_pass_records() {
        let device = device();
        let texture = target(&device);
        let mut cmd = device.acquire_command_buffer(Some("frame")).unwrap();

        let pass = RenderPassDescriptor::new()
            .with_color_attachment(ColorAttachment::clear(&texture, Color::BLACK));
        cmd.begin_render_pass(&pass).unwrap();
        assert_eq!(cmd.state(), RecordingState::InPass(PassKind::Render));

        assert_eq!(
            cmd.begin_render_pass(&pass).unwrap_err(),
            GpuError::ContractViolation(ContractViolation::PassAlreadyOpen { open: "render" })
        );
        cmd.set_viewport(&Viewport::new(0.0, 0.0, 32.0, 32.0)).unwrap();
        cmd.set_scissor(&ScissorRect::new(0, 0, 32, 32)).unwrap();
        cmd.set_pipeline(&pipeline(&device, &[])).unwrap();
        cmd.draw(0, 3).unwrap();
        cmd.draw_instanced(0, 3, 4, 0).unwrap();
        assert!(cmd.fill_buffer(
            &device.create_buffer(&BufferDescriptor::new(16)).unwrap(),
            0,
            16,
            0
        )
        .is_err());
        cmd.end_render_pass().unwrap();

        device.submit(&mut cmd, None).unwrap();
        assert_eq!(cmd.state(), RecordingState::Submitted);
        assert!(cmd.begin_blit_pass().is_err());
        device.recycle_command_buffer(cmd).unwrap();
    }

    #[test]
    fn test_blit_validation() {
        let device = device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64).with_usage(BufferUsage::VERTEX))
            .unwrap();
        let mut cmd = device.acquire_command_buffer(None).unwrap();
        cmd.begin_blit_pass().unwrap();

        assert!(matches!(
            cmd.fill_buffer(&buffer, 0, 65, 0),
            Err(GpuError::InvalidParameter(_))
        ));
        assert!(matches!(
            cmd.fill_buffer(&buffer, 2, 4, 0),
            Err(GpuError::InvalidParameter(_))
        ));
        assert!(matches!(
            cmd.copy_buffer_to_buffer(&buffer, 0, &buffer, 16, 32),
            Err(GpuError::InvalidParameter(_))
        ));
        cmd.copy_buffer_to_buffer(&buffer, 0, &buffer, 32, 32).unwrap();
        cmd.end_blit_pass().unwrap();
    }

    #[test]
    fn test_index_buffer_requirements() {
        let device = device();
        let texture = target(&device);
        let vertices = device
            .create_buffer(&BufferDescriptor::new(64).with_usage(BufferUsage::VERTEX))
            .unwrap();
        let indices = device
            .create_buffer(&BufferDescriptor::new(64).with_usage(BufferUsage::INDEX))
            .unwrap();
        let pipeline = pipeline(&device, &[]);
        let mut cmd = device.acquire_command_buffer(None).unwrap();
        cmd.begin_render_pass(
            &RenderPassDescriptor::new()
                .with_color_attachment(ColorAttachment::load(&texture))
                .with_pipeline(&pipeline),
        )
        .unwrap();

        assert!(cmd.draw_indexed(3, IndexType::U16, &vertices, 0).is_err());
        assert!(cmd.draw_indexed(3, IndexType::U32, &indices, 2).is_err());
        cmd.draw_indexed(3, IndexType::U16, &indices, 2).unwrap();
        cmd.draw_instanced_indexed(3, IndexType::U32, &indices, 4, 2, -1, 0)
            .unwrap();
        cmd.end_render_pass().unwrap();
    }

    #[test]
    fn test_draw_requires_pipeline_and_vertex_buffers() {
        let device = device();
        let texture = target(&device);
        let vertices = device
            .create_buffer(&BufferDescriptor::new(64).with_usage(BufferUsage::VERTEX))
            .unwrap();
        let plain = pipeline(&device, &[]);
        let textured = pipeline(
            &device,
            &[
                VertexAttribute::new(VertexFormat::Float2, 0, 16, 1),
                VertexAttribute::new(VertexFormat::Float2, 8, 16, 1),
            ],
        );
        let pass = RenderPassDescriptor::new()
            .with_color_attachment(ColorAttachment::load(&texture));
        let mut cmd = device.acquire_command_buffer(None).unwrap();

        cmd.begin_render_pass(&pass).unwrap();
        assert!(matches!(
            cmd.draw(0, 3),
            Err(GpuError::InvalidParameter(_))
        ));
        cmd.set_pipeline(&textured).unwrap();
        assert!(matches!(
            cmd.draw_instanced(0, 3, 2, 0),
            Err(GpuError::InvalidParameter(_))
        ));
        cmd.set_vertex_buffer(&vertices, 0, 0).unwrap();
        assert!(cmd.draw(0, 3).is_err());
        cmd.set_vertex_buffer(&vertices, 0, 1).unwrap();
        cmd.draw(0, 3).unwrap();
        cmd.end_render_pass().unwrap();

        // Bindings do not carry over into the next pass.
        cmd.begin_render_pass(&pass).unwrap();
        assert!(cmd.draw(0, 3).is_err());
        cmd.end_render_pass().unwrap();

        cmd.begin_render_pass(&pass.clone().with_pipeline(&plain)).unwrap();
        cmd.draw(0, 3).unwrap();
        cmd.end_render_pass().unwrap();
        assert_eq!(cmd.state(), RecordingState::Recording);
    }

    #[test]
    fn test_buffer_texture_copy_ends_at_buffer_end() {
        let device = device();
        let texture = device
            .create_texture(&TextureDescriptor::new_2d(
                4,
                4,
                PixelFormat::Rgba8Unorm,
                TextureUsage::SHADER_READ,
            ))
            .unwrap();
        let buffer = device.create_buffer(&BufferDescriptor::new(128)).unwrap();
        let extent = Extent3d::new(4, 4, 1);
        let mut cmd = device.acquire_command_buffer(None).unwrap();
        cmd.begin_blit_pass().unwrap();

        let at_end = BufferImageLayout::packed(64);
        cmd.copy_buffer_to_texture(&buffer, at_end, &texture, TextureRegion::default(), extent)
            .unwrap();
        cmd.copy_texture_to_buffer(&texture, TextureRegion::default(), &buffer, at_end, extent)
            .unwrap();
        assert!(matches!(
            cmd.copy_buffer_to_texture(
                &buffer,
                BufferImageLayout::packed(68),
                &texture,
                TextureRegion::default(),
                extent
            ),
            Err(GpuError::InvalidParameter(_))
        ));
        cmd.end_blit_pass().unwrap();
    }

    #[test]
    fn test_failed_submit_only_allows_abandon() {
        let device = device();
        let mut cmd = device.acquire_command_buffer(None).unwrap();
        cmd.raw_mut()
            .unwrap()
            .as_dummy_mut()
            .unwrap()
            .push_out_of_bounds_fill();

        assert!(matches!(
            device.submit(&mut cmd, None),
            Err(GpuError::InvalidParameter(_))
        ));
        assert_eq!(cmd.state(), RecordingState::Failed);
        assert_eq!(
            cmd.begin_blit_pass().unwrap_err(),
            GpuError::ContractViolation(ContractViolation::SubmitFailed)
        );
        assert_eq!(
            device.submit(&mut cmd, None).unwrap_err(),
            GpuError::ContractViolation(ContractViolation::SubmitFailed)
        );
        device.abandon_command_buffer(cmd).unwrap();
        assert_eq!(device.pool_stats().unwrap().free, 2);
    }

    #[test]
    fn test_drop_unsubmitted_returns_to_pool() {
        let device = device();
        {
            let _cmd = device.acquire_command_buffer(None).unwrap();
            assert_eq!(device.pool_stats().unwrap().free, 1);
        }
        assert_eq!(device.pool_stats().unwrap().free, 2);

        let cmd = device.acquire_command_buffer(None).unwrap();
        assert_eq!(
            device.recycle_command_buffer(cmd).unwrap_err(),
            GpuError::ContractViolation(ContractViolation::NotSubmitted)
        );
        // The rejected buffer was abandoned on drop.
        assert_eq!(device.pool_stats().unwrap().free, 2);
    }
}
