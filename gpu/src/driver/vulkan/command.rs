//! Command pools, command buffers and command recording.
//!
//! Bindings set inside a render pass are collected and written into
//! descriptor sets right before each draw. Descriptor pools and framebuffers
//! created while recording belong to the command buffer and are destroyed
//! once it is recycled or abandoned.

use std::sync::Arc;

use ash::vk;

use super::context::{Transients, VulkanContext};
use super::conversion::{
    convert_aspect, convert_index_type, convert_load_op, copy_aspect, map_vk_error,
};
use super::pipeline::{
    set_index, ColorTargetKey, DepthStencilTargetKey, RenderPassKey, SAMPLER_BINDING_BASE,
    TEXTURE_BINDING_BASE,
};
use super::resources::VulkanTexture;
use crate::command_pool::{CommandAllocator, PooledCommandBuffer};
use crate::driver::{GpuCommandBuffer, GpuFence, IndexedDraw};
use crate::error::{GpuError, GpuResult};
use crate::resources::{Buffer, CpuBuffer, Pipeline, Sampler, Texture};
use crate::types::{
    BufferImageLayout, Color, Extent3d, PassInit, RenderPassDescriptor, ScissorRect,
    ShaderStage, TextureRegion, TextureType, Viewport, MAX_BUFFER_SLOTS, MAX_SAMPLER_SLOTS,
    MAX_TEXTURE_SLOTS,
};

/// Descriptor sets allocated per transient descriptor pool.
const SETS_PER_POOL: u32 = 64;

// ============================================================================
// Command pools
// ============================================================================

/// Creates native command pools on the device queue family.
pub struct VulkanAllocator {
    context: Arc<VulkanContext>,
}

impl VulkanAllocator {
    pub fn new(context: Arc<VulkanContext>) -> Self {
        Self { context }
    }
}

impl CommandAllocator for VulkanAllocator {
    type Pool = vk::CommandPool;
    type Buffer = vk::CommandBuffer;

    fn create_pool(&self) -> GpuResult<vk::CommandPool> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.context.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        unsafe { self.context.device.create_command_pool(&pool_info, None) }
            .map_err(|e| map_vk_error("vkCreateCommandPool", e))
    }

    fn allocate(&self, pool: &mut vk::CommandPool, count: u32) -> GpuResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.context.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| map_vk_error("vkAllocateCommandBuffers", e))
    }

    fn reset(&self, buffer: vk::CommandBuffer) -> GpuResult<()> {
        unsafe {
            self.context
                .device
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::RELEASE_RESOURCES)
        }
        .map_err(|e| map_vk_error("vkResetCommandBuffer", e))
    }

    fn begin(&self, buffer: vk::CommandBuffer) -> GpuResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe { self.context.device.begin_command_buffer(buffer, &begin_info) }
            .map_err(|e| map_vk_error("vkBeginCommandBuffer", e))
    }

    fn destroy_pool(&self, pool: vk::CommandPool) {
        // Destroying the pool frees every buffer allocated from it.
        unsafe { self.context.device.destroy_command_pool(pool, None) };
    }
}

// ============================================================================
// Binding state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundBuffer {
    buffer: vk::Buffer,
    size: u64,
    offset: u64,
}

/// Resources bound to one shader stage.
#[derive(Debug, Clone)]
struct StageBindings {
    buffers: [Option<BoundBuffer>; MAX_BUFFER_SLOTS as usize],
    textures: [Option<vk::ImageView>; MAX_TEXTURE_SLOTS as usize],
    samplers: [Option<vk::Sampler>; MAX_SAMPLER_SLOTS as usize],
    dirty: bool,
}

impl Default for StageBindings {
    fn default() -> Self {
        Self {
            buffers: [None; MAX_BUFFER_SLOTS as usize],
            textures: [None; MAX_TEXTURE_SLOTS as usize],
            samplers: [None; MAX_SAMPLER_SLOTS as usize],
            dirty: true,
        }
    }
}

#[derive(Debug, Default)]
struct BindingState {
    pipeline: Option<vk::Pipeline>,
    vertex_slots: Vec<u32>,
    vertex_dirty: bool,
    stages: [StageBindings; 2],
    descriptor_pool: Option<vk::DescriptorPool>,
}

impl BindingState {
    fn stage_mut(&mut self, stage: ShaderStage) -> &mut StageBindings {
        &mut self.stages[set_index(stage) as usize]
    }

    fn mark_all_dirty(&mut self) {
        self.vertex_dirty = true;
        for stage in &mut self.stages {
            stage.dirty = true;
        }
    }
}

// ============================================================================
// Command buffers
// ============================================================================

/// A pooled native command buffer and what its recording created.
pub struct VulkanCommandBuffer {
    pooled: Option<PooledCommandBuffer<VulkanAllocator>>,
    context: Arc<VulkanContext>,
    label: Option<String>,
    transients: Transients,
    bindings: BindingState,
    ended: bool,
}

impl VulkanCommandBuffer {
    pub fn new(
        context: &Arc<VulkanContext>,
        pooled: PooledCommandBuffer<VulkanAllocator>,
        label: Option<&str>,
    ) -> Self {
        Self {
            pooled: Some(pooled),
            context: context.clone(),
            label: label.map(str::to_string),
            transients: Transients::default(),
            bindings: BindingState::default(),
            ended: false,
        }
    }

    fn raw(&self) -> vk::CommandBuffer {
        self.pooled
            .as_ref()
            .map(PooledCommandBuffer::raw)
            .unwrap_or_else(vk::CommandBuffer::null)
    }

    fn device(&self) -> &ash::Device {
        &self.context.device
    }

    /// Release recording transients and hand the pooled buffer back.
    ///
    /// The caller guarantees the GPU no longer uses this buffer.
    pub fn into_pooled(mut self) -> Option<PooledCommandBuffer<VulkanAllocator>> {
        let mut transients = std::mem::take(&mut self.transients);
        unsafe { transients.destroy(&self.context.device) };
        self.pooled.take()
    }

    /// End recording once; later submissions reuse the ended buffer.
    fn finish(&mut self) -> GpuResult<vk::CommandBuffer> {
        let raw = self.raw();
        if !self.ended {
            unsafe { self.device().end_command_buffer(raw) }
                .map_err(|e| map_vk_error("vkEndCommandBuffer", e))?;
            self.ended = true;
            if let Some(label) = &self.label {
                self.context
                    .logger
                    .trace(format_args!("VulkanDriver: ended command buffer {label:?}"));
            }
        }
        Ok(raw)
    }

    /// Make all prior writes visible to every later command and the host.
    fn full_barrier(&self) {
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
            .dst_access_mask(
                vk::AccessFlags::MEMORY_READ
                    | vk::AccessFlags::MEMORY_WRITE
                    | vk::AccessFlags::HOST_READ,
            );
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.raw(),
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS | vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            )
        };
    }

    fn transition(
        &self,
        texture: &VulkanTexture,
        aspect: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(texture.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            });
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.raw(),
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            )
        };
    }

    /// Run `record` with `textures` in `GENERAL` layout, moving backbuffers
    /// out of and back into their presentable layout around it.
    fn with_transfer_layout(
        &self,
        textures: &[(&VulkanTexture, vk::ImageAspectFlags)],
        record: impl FnOnce(),
    ) {
        for (texture, aspect) in textures {
            if texture.resting_layout != vk::ImageLayout::GENERAL {
                self.transition(texture, *aspect, texture.resting_layout, vk::ImageLayout::GENERAL);
            }
        }
        record();
        for (texture, aspect) in textures {
            if texture.resting_layout != vk::ImageLayout::GENERAL {
                self.transition(texture, *aspect, vk::ImageLayout::GENERAL, texture.resting_layout);
            }
        }
    }

    // --- render pass ---

    pub fn begin_render_pass(&mut self, descriptor: &RenderPassDescriptor<'_>) -> GpuResult<()> {
        self.full_barrier();

        let mut views = Vec::with_capacity(descriptor.color_attachments.len() + 1);
        let mut clear_values = Vec::with_capacity(descriptor.color_attachments.len() + 1);
        let mut colors = Vec::with_capacity(descriptor.color_attachments.len());

        for attachment in &descriptor.color_attachments {
            let texture = attachment.texture.raw().as_vulkan()?;
            colors.push(ColorTargetKey {
                format: texture.format,
                load: convert_load_op(&attachment.init),
                layout: texture.resting_layout,
            });
            views.push(texture.attachment_view());
            let color = match attachment.init {
                PassInit::Clear(color) => color.to_array(),
                _ => [0.0; 4],
            };
            clear_values.push(vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            });
        }

        let depth_stencil = match descriptor.depth_stencil_texture() {
            Some(texture) => {
                let texture = texture.raw().as_vulkan()?;
                let depth = descriptor.depth_attachment.map(|a| a.init);
                let stencil = descriptor.stencil_attachment.map(|a| a.init);
                views.push(texture.attachment_view());
                clear_values.push(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: match depth {
                            Some(PassInit::Clear(value)) => value,
                            _ => 1.0,
                        },
                        stencil: match stencil {
                            Some(PassInit::Clear(value)) => value,
                            _ => 0,
                        },
                    },
                });
                Some(DepthStencilTargetKey {
                    format: texture.format,
                    depth_load: depth
                        .map(|init| convert_load_op(&init))
                        .unwrap_or(vk::AttachmentLoadOp::DONT_CARE),
                    stencil_load: stencil
                        .map(|init| convert_load_op(&init))
                        .unwrap_or(vk::AttachmentLoadOp::DONT_CARE),
                    layout: texture.resting_layout,
                })
            }
            None => None,
        };

        let key = RenderPassKey {
            colors,
            depth_stencil,
        };
        let render_pass = self.context.render_pass(&key)?;

        let (width, height) = descriptor.render_area();
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&views)
            .width(width)
            .height(height)
            .layers(1);
        let framebuffer = unsafe { self.device().create_framebuffer(&framebuffer_info, None) }
            .map_err(|e| map_vk_error("vkCreateFramebuffer", e))?;
        self.transients.framebuffers.push(framebuffer);

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width, height },
        };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        let cmd = self.raw();
        unsafe {
            let device = self.device();
            device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(
                cmd,
                0,
                &[vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: width as f32,
                    height: height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }],
            );
            device.cmd_set_scissor(cmd, 0, &[render_area]);
            device.cmd_set_blend_constants(cmd, &[0.0; 4]);
        }

        self.bindings = BindingState::default();
        if let Some(pipeline) = descriptor.initial_pipeline {
            self.set_pipeline(pipeline)?;
        }
        Ok(())
    }

    pub fn end_render_pass(&mut self) {
        unsafe { self.device().cmd_end_render_pass(self.raw()) };
        self.bindings.pipeline = None;
    }

    pub fn set_pipeline(&mut self, pipeline: &Pipeline) -> GpuResult<()> {
        let native = pipeline.raw().as_vulkan()?;
        unsafe {
            self.device().cmd_bind_pipeline(
                self.raw(),
                vk::PipelineBindPoint::GRAPHICS,
                native.pipeline,
            )
        };
        self.bindings.pipeline = Some(native.pipeline);
        self.bindings.vertex_slots.clone_from(&native.vertex_slots);
        self.bindings.mark_all_dirty();
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) {
        let viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.device().cmd_set_viewport(self.raw(), 0, &[viewport]) };
    }

    pub fn set_scissor(&mut self, scissor: &ScissorRect) {
        let rect = vk::Rect2D {
            offset: vk::Offset2D {
                x: scissor.x as i32,
                y: scissor.y as i32,
            },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };
        unsafe { self.device().cmd_set_scissor(self.raw(), 0, &[rect]) };
    }

    pub fn set_blend_constant(&mut self, color: Color) {
        unsafe {
            self.device()
                .cmd_set_blend_constants(self.raw(), &color.to_array())
        };
    }

    pub fn set_buffer(
        &mut self,
        stage: ShaderStage,
        buffer: &Buffer,
        offset: u32,
        index: u32,
    ) -> GpuResult<()> {
        let native = buffer.raw().as_vulkan()?;
        let bound = BoundBuffer {
            buffer: native.buffer,
            size: buffer.size(),
            offset: u64::from(offset),
        };
        let state = &mut self.bindings;
        let slot = &mut state.stage_mut(stage).buffers[index as usize];
        if *slot != Some(bound) {
            *slot = Some(bound);
            if stage == ShaderStage::Vertex && state.vertex_slots.contains(&index) {
                state.vertex_dirty = true;
            } else {
                state.stage_mut(stage).dirty = true;
            }
        }
        Ok(())
    }

    pub fn set_texture(&mut self, stage: ShaderStage, texture: &Texture, index: u32) -> GpuResult<()> {
        let view = texture.raw().as_vulkan()?.view;
        let bindings = self.bindings.stage_mut(stage);
        if bindings.textures[index as usize] != Some(view) {
            bindings.textures[index as usize] = Some(view);
            bindings.dirty = true;
        }
        Ok(())
    }

    pub fn set_sampler(&mut self, stage: ShaderStage, sampler: &Sampler, index: u32) -> GpuResult<()> {
        let sampler = sampler.raw().as_vulkan()?.sampler;
        let bindings = self.bindings.stage_mut(stage);
        if bindings.samplers[index as usize] != Some(sampler) {
            bindings.samplers[index as usize] = Some(sampler);
            bindings.dirty = true;
        }
        Ok(())
    }

    pub fn draw(
        &mut self,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
        base_instance: u32,
    ) -> GpuResult<()> {
        self.flush_bindings()?;
        unsafe {
            self.device().cmd_draw(
                self.raw(),
                vertex_count,
                instance_count,
                vertex_start,
                base_instance,
            )
        };
        Ok(())
    }

    pub(crate) fn draw_indexed(&mut self, draw: &IndexedDraw<'_>) -> GpuResult<()> {
        let index_buffer = draw.index_buffer.raw().as_vulkan()?.buffer;
        self.flush_bindings()?;
        let cmd = self.raw();
        unsafe {
            let device = self.device();
            device.cmd_bind_index_buffer(
                cmd,
                index_buffer,
                u64::from(draw.index_offset),
                convert_index_type(draw.index_type),
            );
            device.cmd_draw_indexed(
                cmd,
                draw.index_count,
                draw.instance_count,
                0,
                draw.base_vertex,
                draw.base_instance,
            );
        }
        Ok(())
    }

    /// Bind vertex streams and write descriptor sets changed since the last
    /// draw.
    fn flush_bindings(&mut self) -> GpuResult<()> {
        if self.bindings.pipeline.is_none() {
            return Err(GpuError::InvalidParameter(
                "draw issued without a pipeline".to_string(),
            ));
        }

        if self.bindings.vertex_dirty {
            let vertex = &self.bindings.stages[set_index(ShaderStage::Vertex) as usize];
            let mut buffers = Vec::with_capacity(self.bindings.vertex_slots.len());
            for &slot in &self.bindings.vertex_slots {
                let bound = vertex.buffers[slot as usize].ok_or_else(|| {
                    GpuError::InvalidParameter(format!("no vertex buffer bound at slot {slot}"))
                })?;
                buffers.push((slot, bound));
            }
            for (slot, bound) in buffers {
                unsafe {
                    self.device().cmd_bind_vertex_buffers(
                        self.raw(),
                        slot,
                        &[bound.buffer],
                        &[bound.offset],
                    )
                };
            }
            self.bindings.vertex_dirty = false;
        }

        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            if self.bindings.stages[set_index(stage) as usize].dirty {
                self.write_descriptor_set(stage)?;
                self.bindings.stages[set_index(stage) as usize].dirty = false;
            }
        }
        Ok(())
    }

    fn write_descriptor_set(&mut self, stage: ShaderStage) -> GpuResult<()> {
        let set = self.allocate_descriptor_set(stage)?;
        let limits = &self.context.limits;
        let layout = &self.context.bindings;
        let bindings = &self.bindings.stages[set_index(stage) as usize];
        let vertex_slots: &[u32] = if stage == ShaderStage::Vertex {
            &self.bindings.vertex_slots
        } else {
            &[]
        };

        let mut buffer_infos = Vec::new();
        for (slot, bound) in bindings.buffers.iter().enumerate().take(layout.uniform_slots as usize) {
            let Some(bound) = bound else { continue };
            if vertex_slots.contains(&(slot as u32)) {
                continue;
            }
            let alignment = limits.min_uniform_buffer_offset_alignment.max(1);
            if bound.offset % alignment != 0 {
                return Err(GpuError::InvalidParameter(format!(
                    "uniform buffer offset {} is not a multiple of {alignment}",
                    bound.offset
                )));
            }
            let range = bound
                .size
                .saturating_sub(bound.offset)
                .min(u64::from(limits.max_uniform_buffer_range));
            buffer_infos.push((
                slot as u32,
                [vk::DescriptorBufferInfo {
                    buffer: bound.buffer,
                    offset: bound.offset,
                    range,
                }],
            ));
        }

        let image_infos: Vec<(u32, [vk::DescriptorImageInfo; 1])> = bindings
            .textures
            .iter()
            .enumerate()
            .take(layout.texture_slots as usize)
            .filter_map(|(slot, view)| {
                view.map(|view| {
                    (
                        TEXTURE_BINDING_BASE + slot as u32,
                        [vk::DescriptorImageInfo {
                            sampler: vk::Sampler::null(),
                            image_view: view,
                            image_layout: vk::ImageLayout::GENERAL,
                        }],
                    )
                })
            })
            .collect();

        let sampler_infos: Vec<(u32, [vk::DescriptorImageInfo; 1])> = bindings
            .samplers
            .iter()
            .enumerate()
            .take(layout.sampler_slots as usize)
            .filter_map(|(slot, sampler)| {
                sampler.map(|sampler| {
                    (
                        SAMPLER_BINDING_BASE + slot as u32,
                        [vk::DescriptorImageInfo {
                            sampler,
                            image_view: vk::ImageView::null(),
                            image_layout: vk::ImageLayout::UNDEFINED,
                        }],
                    )
                })
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = buffer_infos
            .iter()
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(info)
            })
            .chain(image_infos.iter().map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                    .image_info(info)
            }))
            .chain(sampler_infos.iter().map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .image_info(info)
            }))
            .collect();

        unsafe {
            self.device().update_descriptor_sets(&writes, &[]);
            self.device().cmd_bind_descriptor_sets(
                self.raw(),
                vk::PipelineBindPoint::GRAPHICS,
                layout.pipeline_layout,
                set_index(stage),
                &[set],
                &[],
            );
        }
        Ok(())
    }

    fn allocate_descriptor_set(&mut self, stage: ShaderStage) -> GpuResult<vk::DescriptorSet> {
        let layouts = [self.context.bindings.set_layouts[set_index(stage) as usize]];

        if let Some(pool) = self.bindings.descriptor_pool {
            let alloc_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);
            match unsafe { self.device().allocate_descriptor_sets(&alloc_info) } {
                Ok(sets) => return Ok(sets[0]),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {}
                Err(e) => return Err(map_vk_error("vkAllocateDescriptorSets", e)),
            }
        }

        let pool = self.create_descriptor_pool()?;
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        unsafe { self.device().allocate_descriptor_sets(&alloc_info) }
            .map(|sets| sets[0])
            .map_err(|e| map_vk_error("vkAllocateDescriptorSets", e))
    }

    fn create_descriptor_pool(&mut self) -> GpuResult<vk::DescriptorPool> {
        let sizes = self.context.bindings.pool_sizes(SETS_PER_POOL);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(SETS_PER_POOL)
            .pool_sizes(&sizes);
        let pool = unsafe { self.device().create_descriptor_pool(&pool_info, None) }
            .map_err(|e| map_vk_error("vkCreateDescriptorPool", e))?;
        self.transients.descriptor_pools.push(pool);
        self.bindings.descriptor_pool = Some(pool);
        Ok(pool)
    }

    // --- blit pass ---

    pub fn begin_blit_pass(&mut self) {
        self.full_barrier();
    }

    pub fn end_blit_pass(&mut self) {
        self.full_barrier();
    }

    pub fn copy_texture_to_texture(
        &mut self,
        src: (&Texture, TextureRegion),
        dst: (&Texture, TextureRegion),
        extent: Extent3d,
    ) -> GpuResult<()> {
        let src_native = src.0.raw().as_vulkan()?;
        let dst_native = dst.0.raw().as_vulkan()?;
        let src_aspect = convert_aspect(src.0.format());
        let dst_aspect = convert_aspect(dst.0.format());

        let (src_subresource, src_offset, depth) =
            copy_location(src.0.texture_type(), &src.1, src_aspect, extent.depth);
        let (dst_subresource, dst_offset, _) =
            copy_location(dst.0.texture_type(), &dst.1, dst_aspect, extent.depth);

        let region = vk::ImageCopy {
            src_subresource,
            src_offset,
            dst_subresource,
            dst_offset,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth,
            },
        };

        self.with_transfer_layout(&[(src_native, src_aspect), (dst_native, dst_aspect)], || unsafe {
            self.device().cmd_copy_image(
                self.raw(),
                src_native.image,
                vk::ImageLayout::GENERAL,
                dst_native.image,
                vk::ImageLayout::GENERAL,
                &[region],
            )
        });
        self.full_barrier();
        Ok(())
    }

    pub fn fill_buffer(&mut self, buffer: &Buffer, offset: u32, length: u32, value: u8) -> GpuResult<()> {
        let native = buffer.raw().as_vulkan()?;
        unsafe {
            self.device().cmd_fill_buffer(
                self.raw(),
                native.buffer,
                u64::from(offset),
                u64::from(length),
                u32::from_ne_bytes([value; 4]),
            )
        };
        self.full_barrier();
        Ok(())
    }

    pub fn generate_mipmaps(&mut self, texture: &Texture) -> GpuResult<()> {
        let native = texture.raw().as_vulkan()?;
        let features = self.context.format_features(native.format);
        let blit = vk::FormatFeatureFlags::BLIT_SRC | vk::FormatFeatureFlags::BLIT_DST;
        if !features.contains(blit) {
            return Err(GpuError::Unsupported(format!(
                "{:?} textures cannot be blitted to build mipmaps",
                texture.format()
            )));
        }
        let filter = if features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR) {
            vk::Filter::LINEAR
        } else {
            vk::Filter::NEAREST
        };

        let descriptor = texture.descriptor();
        let aspect = copy_aspect(texture.format());
        let layers = descriptor.array_layers();
        let offset_of = |extent: Extent3d| vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: extent.depth as i32,
        };

        for level in 1..descriptor.mip_levels {
            let subresource = |mip_level| vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level,
                base_array_layer: 0,
                layer_count: layers,
            };
            let region = vk::ImageBlit {
                src_subresource: subresource(level - 1),
                src_offsets: [
                    vk::Offset3D::default(),
                    offset_of(descriptor.mip_extent(level - 1)),
                ],
                dst_subresource: subresource(level),
                dst_offsets: [vk::Offset3D::default(), offset_of(descriptor.mip_extent(level))],
            };
            unsafe {
                self.device().cmd_blit_image(
                    self.raw(),
                    native.image,
                    vk::ImageLayout::GENERAL,
                    native.image,
                    vk::ImageLayout::GENERAL,
                    &[region],
                    filter,
                )
            };
            self.full_barrier();
        }
        Ok(())
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, region: vk::BufferCopy) {
        unsafe {
            self.device()
                .cmd_copy_buffer(self.raw(), src, dst, &[region])
        };
        self.full_barrier();
    }

    pub fn copy_cpu_to_gpu(
        &mut self,
        src: (&CpuBuffer, u32),
        dst: (&Buffer, u32),
        length: u32,
    ) -> GpuResult<()> {
        let src_buffer = src.0.raw().as_vulkan()?.buffer;
        let dst_buffer = dst.0.raw().as_vulkan()?.buffer;
        self.copy_buffer(src_buffer, dst_buffer, buffer_copy(src.1, dst.1, length));
        Ok(())
    }

    pub fn copy_gpu_to_cpu(
        &mut self,
        src: (&Buffer, u32),
        dst: (&CpuBuffer, u32),
        length: u32,
    ) -> GpuResult<()> {
        let src_buffer = src.0.raw().as_vulkan()?.buffer;
        let dst_buffer = dst.0.raw().as_vulkan()?.buffer;
        self.copy_buffer(src_buffer, dst_buffer, buffer_copy(src.1, dst.1, length));
        Ok(())
    }

    pub fn copy_buffer_to_buffer(
        &mut self,
        src: (&Buffer, u32),
        dst: (&Buffer, u32),
        length: u32,
    ) -> GpuResult<()> {
        let src_buffer = src.0.raw().as_vulkan()?.buffer;
        let dst_buffer = dst.0.raw().as_vulkan()?.buffer;
        self.copy_buffer(src_buffer, dst_buffer, buffer_copy(src.1, dst.1, length));
        Ok(())
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        src: (&Buffer, BufferImageLayout),
        dst: (&Texture, TextureRegion),
        extent: Extent3d,
    ) -> GpuResult<()> {
        let buffer = src.0.raw().as_vulkan()?.buffer;
        let texture = dst.0.raw().as_vulkan()?;
        let aspect = copy_aspect(dst.0.format());
        let region = buffer_image_copy(dst.0, &dst.1, &src.1, aspect, extent)?;

        self.with_transfer_layout(&[(texture, aspect)], || unsafe {
            self.device().cmd_copy_buffer_to_image(
                self.raw(),
                buffer,
                texture.image,
                vk::ImageLayout::GENERAL,
                &[region],
            )
        });
        self.full_barrier();
        Ok(())
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        src: (&Texture, TextureRegion),
        dst: (&Buffer, BufferImageLayout),
        extent: Extent3d,
    ) -> GpuResult<()> {
        let texture = src.0.raw().as_vulkan()?;
        let buffer = dst.0.raw().as_vulkan()?.buffer;
        let aspect = copy_aspect(src.0.format());
        let region = buffer_image_copy(src.0, &src.1, &dst.1, aspect, extent)?;

        self.with_transfer_layout(&[(texture, aspect)], || unsafe {
            self.device().cmd_copy_image_to_buffer(
                self.raw(),
                texture.image,
                vk::ImageLayout::GENERAL,
                buffer,
                &[region],
            )
        });
        self.full_barrier();
        Ok(())
    }
}

impl Drop for VulkanCommandBuffer {
    fn drop(&mut self) {
        // A buffer dropped without being recycled may still be executing.
        self.context
            .retire(std::mem::take(&mut self.transients));
    }
}

fn buffer_copy(src_offset: u32, dst_offset: u32, length: u32) -> vk::BufferCopy {
    vk::BufferCopy {
        src_offset: u64::from(src_offset),
        dst_offset: u64::from(dst_offset),
        size: u64::from(length),
    }
}

/// Subresource, offset and depth extent of a copy touching `region`.
///
/// 3D textures address depth through the origin; layered textures copy
/// `depth` consecutive layers starting at `region.slice`.
fn copy_location(
    texture_type: TextureType,
    region: &TextureRegion,
    aspect: vk::ImageAspectFlags,
    depth: u32,
) -> (vk::ImageSubresourceLayers, vk::Offset3D, u32) {
    let origin = region.origin;
    if texture_type == TextureType::D3 {
        (
            vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: region.level,
                base_array_layer: 0,
                layer_count: 1,
            },
            vk::Offset3D {
                x: origin.x as i32,
                y: origin.y as i32,
                z: origin.z as i32,
            },
            depth,
        )
    } else {
        (
            vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: region.level,
                base_array_layer: region.slice,
                layer_count: depth.max(1),
            },
            vk::Offset3D {
                x: origin.x as i32,
                y: origin.y as i32,
                z: 0,
            },
            1,
        )
    }
}

fn buffer_image_copy(
    texture: &Texture,
    region: &TextureRegion,
    layout: &BufferImageLayout,
    aspect: vk::ImageAspectFlags,
    extent: Extent3d,
) -> GpuResult<vk::BufferImageCopy> {
    let bytes_per_pixel = texture.format().bytes_per_pixel();
    let invalid = |msg: String| Err(GpuError::InvalidParameter(msg));

    if layout.offset % bytes_per_pixel != 0 || layout.offset % 4 != 0 {
        return invalid(format!(
            "buffer offset {} must be a multiple of 4 and of the texel size",
            layout.offset
        ));
    }
    if layout.bytes_per_row % bytes_per_pixel != 0 {
        return invalid(format!(
            "bytes_per_row {} is not a multiple of the texel size {bytes_per_pixel}",
            layout.bytes_per_row
        ));
    }
    let row_bytes = if layout.bytes_per_row == 0 {
        extent.width * bytes_per_pixel
    } else {
        layout.bytes_per_row
    };
    if layout.bytes_per_image % row_bytes.max(1) != 0 {
        return invalid(format!(
            "bytes_per_image {} is not a multiple of the row size {row_bytes}",
            layout.bytes_per_image
        ));
    }

    let (image_subresource, image_offset, depth) =
        copy_location(texture.texture_type(), region, aspect, extent.depth);
    Ok(vk::BufferImageCopy {
        buffer_offset: u64::from(layout.offset),
        buffer_row_length: layout.bytes_per_row / bytes_per_pixel,
        buffer_image_height: layout.bytes_per_image / row_bytes.max(1),
        image_subresource,
        image_offset,
        image_extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth,
        },
    })
}

/// End every buffer and submit them in one batch.
pub(crate) fn submit(
    context: &VulkanContext,
    buffers: &mut [&mut GpuCommandBuffer],
    fence: Option<&GpuFence>,
) -> GpuResult<()> {
    let fence = match fence {
        Some(fence) => fence.as_vulkan()?.fence,
        None => vk::Fence::null(),
    };

    let mut raws = Vec::with_capacity(buffers.len());
    for buffer in buffers.iter_mut() {
        raws.push(buffer.as_vulkan_mut()?.finish()?);
    }

    if raws.is_empty() {
        return context.queue_submit(&[], fence);
    }
    let submit_info = vk::SubmitInfo::default().command_buffers(&raws);
    context.queue_submit(&[submit_info], fence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::texture::tests::detached;
    use crate::types::{Origin3d, PixelFormat, TextureDescriptor, TextureUsage};

    #[test]
    fn test_copy_location_layered() {
        let region = TextureRegion::new(2, 1, Origin3d::new(4, 8, 0));
        let (subresource, offset, depth) = copy_location(
            TextureType::D2Array,
            &region,
            vk::ImageAspectFlags::COLOR,
            3,
        );
        assert_eq!(subresource.base_array_layer, 2);
        assert_eq!(subresource.layer_count, 3);
        assert_eq!(subresource.mip_level, 1);
        assert_eq!((offset.x, offset.y, offset.z), (4, 8, 0));
        assert_eq!(depth, 1);
    }

    #[test]
    fn test_copy_location_volume() {
        let region = TextureRegion::new(0, 0, Origin3d::new(0, 0, 5));
        let (subresource, offset, depth) =
            copy_location(TextureType::D3, &region, vk::ImageAspectFlags::COLOR, 2);
        assert_eq!(subresource.layer_count, 1);
        assert_eq!(offset.z, 5);
        assert_eq!(depth, 2);
    }

    #[test]
    fn test_buffer_image_copy_units() {
        let texture = detached(TextureDescriptor::new_2d(
            64,
            64,
            PixelFormat::Rgba8Unorm,
            TextureUsage::SHADER_READ,
        ));
        let copy = buffer_image_copy(
            &texture,
            &TextureRegion::base(),
            &BufferImageLayout::new(256, 512, 512 * 16),
            vk::ImageAspectFlags::COLOR,
            Extent3d::new_2d(16, 16),
        )
        .unwrap();
        assert_eq!(copy.buffer_row_length, 128);
        assert_eq!(copy.buffer_image_height, 16);

        let packed = buffer_image_copy(
            &texture,
            &TextureRegion::base(),
            &BufferImageLayout::packed(0),
            vk::ImageAspectFlags::COLOR,
            Extent3d::new_2d(16, 16),
        )
        .unwrap();
        assert_eq!((packed.buffer_row_length, packed.buffer_image_height), (0, 0));

        let misaligned = buffer_image_copy(
            &texture,
            &TextureRegion::base(),
            &BufferImageLayout::new(0, 66, 0),
            vk::ImageAspectFlags::COLOR,
            Extent3d::new_2d(16, 16),
        );
        assert!(matches!(misaligned, Err(GpuError::InvalidParameter(_))));
    }
}
