//! Binding model, render pass cache keys and graphics pipeline creation.
//!
//! Every pipeline shares one layout with two descriptor sets, set 0 for the
//! vertex stage and set 1 for the fragment stage. Within a set, uniform
//! buffer slot `i` is binding `i`, texture slot `i` is binding
//! `TEXTURE_BINDING_BASE + i` and sampler slot `i` is binding
//! `SAMPLER_BINDING_BASE + i`. Buffer slots used as vertex streams by the
//! bound pipeline are bound as vertex buffers instead.

use std::ffi::CString;

use ash::vk;

use super::context::VulkanContext;
use super::conversion::{
    convert_blend_factor, convert_blend_op, convert_compare_function, convert_cull_mode,
    convert_fill_mode, convert_front_face, convert_stencil_op, convert_topology,
    convert_vertex_format, convert_write_mask, is_dual_source, map_vk_error,
};
use crate::error::{GpuError, GpuResult};
use crate::types::{
    ColorAttachmentState, FillMode, PipelineDescriptor, ShaderStage, MAX_BUFFER_SLOTS,
    MAX_SAMPLER_SLOTS, MAX_TEXTURE_SLOTS,
};

pub const TEXTURE_BINDING_BASE: u32 = MAX_BUFFER_SLOTS;
pub const SAMPLER_BINDING_BASE: u32 = TEXTURE_BINDING_BASE + MAX_TEXTURE_SLOTS;

/// Descriptor set index of a shader stage.
pub fn set_index(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => 0,
        ShaderStage::Fragment => 1,
    }
}

fn stage_flags(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
    }
}

// ============================================================================
// Binding layout
// ============================================================================

/// The descriptor set layouts and pipeline layout shared by all pipelines.
pub struct BindingLayout {
    pub set_layouts: [vk::DescriptorSetLayout; 2],
    pub pipeline_layout: vk::PipelineLayout,
    /// Uniform buffer slots per stage the device can bind.
    pub uniform_slots: u32,
    pub texture_slots: u32,
    pub sampler_slots: u32,
}

impl BindingLayout {
    pub fn new(device: &ash::Device, limits: &vk::PhysicalDeviceLimits) -> GpuResult<Self> {
        let uniform_slots = MAX_BUFFER_SLOTS.min(limits.max_per_stage_descriptor_uniform_buffers);
        let texture_slots =
            MAX_TEXTURE_SLOTS.min(limits.max_per_stage_descriptor_sampled_images);
        let sampler_slots = MAX_SAMPLER_SLOTS.min(limits.max_per_stage_descriptor_samplers);

        let mut set_layouts = [vk::DescriptorSetLayout::null(); 2];
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            let flags = stage_flags(stage);
            let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..uniform_slots)
                .map(|slot| (slot, vk::DescriptorType::UNIFORM_BUFFER))
                .chain(
                    (0..texture_slots)
                        .map(|slot| (TEXTURE_BINDING_BASE + slot, vk::DescriptorType::SAMPLED_IMAGE)),
                )
                .chain(
                    (0..sampler_slots)
                        .map(|slot| (SAMPLER_BINDING_BASE + slot, vk::DescriptorType::SAMPLER)),
                )
                .map(|(binding, ty)| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(binding)
                        .descriptor_type(ty)
                        .descriptor_count(1)
                        .stage_flags(flags)
                })
                .collect();

            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            match unsafe { device.create_descriptor_set_layout(&create_info, None) } {
                Ok(layout) => set_layouts[set_index(stage) as usize] = layout,
                Err(e) => {
                    destroy_set_layouts(device, &set_layouts);
                    return Err(map_vk_error("vkCreateDescriptorSetLayout", e));
                }
            }
        }

        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let pipeline_layout = match unsafe { device.create_pipeline_layout(&layout_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                destroy_set_layouts(device, &set_layouts);
                return Err(map_vk_error("vkCreatePipelineLayout", e));
            }
        };

        Ok(Self {
            set_layouts,
            pipeline_layout,
            uniform_slots,
            texture_slots,
            sampler_slots,
        })
    }

    /// Descriptor counts of one set, per type, for sizing descriptor pools.
    pub fn pool_sizes(&self, sets: u32) -> [vk::DescriptorPoolSize; 3] {
        [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: self.uniform_slots.max(1) * sets,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: self.texture_slots.max(1) * sets,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: self.sampler_slots.max(1) * sets,
            },
        ]
    }

    /// # Safety
    ///
    /// No pipeline or descriptor set created from this layout may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_pipeline_layout(self.pipeline_layout, None) };
        destroy_set_layouts(device, &self.set_layouts);
    }
}

fn destroy_set_layouts(device: &ash::Device, layouts: &[vk::DescriptorSetLayout]) {
    for layout in layouts {
        if *layout != vk::DescriptorSetLayout::null() {
            unsafe { device.destroy_descriptor_set_layout(*layout, None) };
        }
    }
}

// ============================================================================
// Render passes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetKey {
    pub format: vk::Format,
    pub load: vk::AttachmentLoadOp,
    /// Layout the image rests in outside of render passes.
    pub layout: vk::ImageLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilTargetKey {
    pub format: vk::Format,
    pub depth_load: vk::AttachmentLoadOp,
    pub stencil_load: vk::AttachmentLoadOp,
    pub layout: vk::ImageLayout,
}

/// Everything a cached `VkRenderPass` depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassKey {
    pub colors: Vec<ColorTargetKey>,
    pub depth_stencil: Option<DepthStencilTargetKey>,
}

impl RenderPassKey {
    /// A key compatible with every render pass `descriptor` can draw in.
    pub fn compatible_with(context: &VulkanContext, descriptor: &PipelineDescriptor) -> Self {
        Self {
            colors: descriptor
                .color_attachments
                .iter()
                .map(|attachment| ColorTargetKey {
                    format: context.vk_format(attachment.format),
                    load: vk::AttachmentLoadOp::DONT_CARE,
                    layout: vk::ImageLayout::GENERAL,
                })
                .collect(),
            depth_stencil: descriptor
                .depth_stencil_format()
                .map(|format| DepthStencilTargetKey {
                    format: context.vk_format(format),
                    depth_load: vk::AttachmentLoadOp::DONT_CARE,
                    stencil_load: vk::AttachmentLoadOp::DONT_CARE,
                    layout: vk::ImageLayout::GENERAL,
                }),
        }
    }
}

fn initial_layout(load: vk::AttachmentLoadOp, resting: vk::ImageLayout) -> vk::ImageLayout {
    if load == vk::AttachmentLoadOp::LOAD {
        resting
    } else {
        vk::ImageLayout::UNDEFINED
    }
}

/// Create a single-subpass render pass for `key`.
pub fn create_render_pass(device: &ash::Device, key: &RenderPassKey) -> GpuResult<vk::RenderPass> {
    let mut attachments = Vec::with_capacity(key.colors.len() + 1);
    let mut color_refs = Vec::with_capacity(key.colors.len());

    for color in &key.colors {
        color_refs.push(
            vk::AttachmentReference::default()
                .attachment(attachments.len() as u32)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
        attachments.push(
            vk::AttachmentDescription::default()
                .format(color.format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(color.load)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(initial_layout(color.load, color.layout))
                .final_layout(color.layout),
        );
    }

    let depth_ref = key.depth_stencil.map(|depth| {
        let reference = vk::AttachmentReference::default()
            .attachment(attachments.len() as u32)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let loads_anything = depth.depth_load == vk::AttachmentLoadOp::LOAD
            || depth.stencil_load == vk::AttachmentLoadOp::LOAD;
        attachments.push(
            vk::AttachmentDescription::default()
                .format(depth.format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(depth.depth_load)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(depth.stencil_load)
                .stencil_store_op(vk::AttachmentStoreOp::STORE)
                .initial_layout(if loads_anything {
                    depth.layout
                } else {
                    vk::ImageLayout::UNDEFINED
                })
                .final_layout(depth.layout),
        );
        reference
    });

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if let Some(depth_ref) = depth_ref.as_ref() {
        subpass = subpass.depth_stencil_attachment(depth_ref);
    }
    let subpasses = [subpass];

    let access = vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE;
    let dependencies = [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::ALL_COMMANDS)
            .dst_stage_mask(vk::PipelineStageFlags::ALL_COMMANDS)
            .src_access_mask(access)
            .dst_access_mask(access),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::ALL_COMMANDS)
            .dst_stage_mask(vk::PipelineStageFlags::ALL_COMMANDS)
            .src_access_mask(access)
            .dst_access_mask(access),
    ];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&create_info, None) }
        .map_err(|e| map_vk_error("vkCreateRenderPass", e))
}

// ============================================================================
// Graphics pipelines
// ============================================================================

fn convert_color_attachment(state: &ColorAttachmentState) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(state.blending_enabled)
        .src_color_blend_factor(convert_blend_factor(state.rgb_src_factor))
        .dst_color_blend_factor(convert_blend_factor(state.rgb_dst_factor))
        .color_blend_op(convert_blend_op(state.rgb_blend_op))
        .src_alpha_blend_factor(convert_blend_factor(state.alpha_src_factor))
        .dst_alpha_blend_factor(convert_blend_factor(state.alpha_dst_factor))
        .alpha_blend_op(convert_blend_op(state.alpha_blend_op))
        .color_write_mask(convert_write_mask(state.write_mask))
}

/// Reject pipeline state the logical device was not created to support.
fn check_supported(context: &VulkanContext, descriptor: &PipelineDescriptor) -> GpuResult<()> {
    let dual_source = descriptor.color_attachments.iter().any(|state| {
        state.blending_enabled
            && [
                state.rgb_src_factor,
                state.rgb_dst_factor,
                state.alpha_src_factor,
                state.alpha_dst_factor,
            ]
            .into_iter()
            .any(is_dual_source)
    });
    if dual_source {
        return Err(GpuError::Unsupported(
            "dual-source blend factors are not enabled on this device".to_string(),
        ));
    }
    if descriptor.depth_bias.clamp != 0.0 {
        return Err(GpuError::Unsupported(
            "depth bias clamp is not enabled on this device".to_string(),
        ));
    }
    if descriptor.fill_mode == FillMode::Line && !context.features.fill_mode_non_solid {
        return Err(GpuError::Unsupported(
            "line fill mode requires fillModeNonSolid".to_string(),
        ));
    }
    Ok(())
}

/// Build a graphics pipeline. Returns the pipeline and the buffer slots it
/// reads vertex streams from.
pub fn create_graphics_pipeline(
    context: &VulkanContext,
    descriptor: &PipelineDescriptor,
) -> GpuResult<(vk::Pipeline, Vec<u32>)> {
    check_supported(context, descriptor)?;

    let vertex = descriptor.vertex_shader.raw().as_vulkan()?;
    let fragment = descriptor.fragment_shader.raw().as_vulkan()?;

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex.module)
            .name(&vertex.entry_point),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment.module)
            .name(&fragment.entry_point),
    ];

    let slots = descriptor.vertex_buffer_slots();
    let binding_descriptions: Vec<vk::VertexInputBindingDescription> = slots
        .iter()
        .map(|&(slot, stride)| {
            vk::VertexInputBindingDescription::default()
                .binding(slot)
                .stride(stride)
                .input_rate(vk::VertexInputRate::VERTEX)
        })
        .collect();

    let attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = descriptor
        .vertex_attributes
        .iter()
        .enumerate()
        .map(|(location, attribute)| {
            vk::VertexInputAttributeDescription::default()
                .location(location as u32)
                .binding(attribute.index)
                .format(convert_vertex_format(attribute.format))
                .offset(attribute.offset)
        })
        .collect();

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(convert_topology(descriptor.topology))
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let bias = &descriptor.depth_bias;
    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(convert_fill_mode(descriptor.fill_mode))
        .line_width(1.0)
        .cull_mode(convert_cull_mode(descriptor.cull_mode))
        .front_face(convert_front_face(descriptor.front_face))
        .depth_bias_enable(bias.is_enabled())
        .depth_bias_constant_factor(bias.constant)
        .depth_bias_slope_factor(bias.slope_scale)
        .depth_bias_clamp(0.0);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let ds = &descriptor.depth_stencil;
    let stencil_face = |reference: u32| vk::StencilOpState {
        fail_op: convert_stencil_op(ds.stencil_fail),
        pass_op: convert_stencil_op(ds.depth_and_stencil_pass),
        depth_fail_op: convert_stencil_op(ds.depth_fail),
        compare_op: convert_compare_function(ds.stencil_function),
        compare_mask: ds.stencil_read_mask,
        write_mask: ds.stencil_write_mask,
        reference,
    };
    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(ds.depth_format.is_some())
        .depth_write_enable(ds.depth_format.is_some() && ds.depth_write_enabled)
        .depth_compare_op(convert_compare_function(ds.depth_function))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(ds.stencil_format.is_some())
        .front(stencil_face(ds.stencil_reference_front))
        .back(stencil_face(ds.stencil_reference_back));

    let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = descriptor
        .color_attachments
        .iter()
        .map(convert_color_attachment)
        .collect();

    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_states = [
        vk::DynamicState::VIEWPORT,
        vk::DynamicState::SCISSOR,
        vk::DynamicState::BLEND_CONSTANTS,
    ];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let render_pass = context.render_pass(&RenderPassKey::compatible_with(context, descriptor))?;

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(context.bindings.pipeline_layout)
        .render_pass(render_pass)
        .subpass(0);

    let pipelines = unsafe {
        context
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| map_vk_error("vkCreateGraphicsPipelines", e))?;

    Ok((pipelines[0], slots.into_iter().map(|(slot, _)| slot).collect()))
}

/// Convert an entry point name for shader stage creation.
pub fn entry_point_name(entry_point: &str) -> GpuResult<CString> {
    CString::new(entry_point).map_err(|e| {
        GpuError::InvalidParameter(format!(
            "invalid entry point name (contains null byte): {e}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_ranges_do_not_overlap() {
        assert_eq!(TEXTURE_BINDING_BASE, MAX_BUFFER_SLOTS);
        assert!(SAMPLER_BINDING_BASE >= TEXTURE_BINDING_BASE + MAX_TEXTURE_SLOTS);
        assert_ne!(set_index(ShaderStage::Vertex), set_index(ShaderStage::Fragment));
    }

    #[test]
    fn test_initial_layout_discards_unless_loading() {
        assert_eq!(
            initial_layout(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::GENERAL),
            vk::ImageLayout::UNDEFINED
        );
        assert_eq!(
            initial_layout(vk::AttachmentLoadOp::LOAD, vk::ImageLayout::PRESENT_SRC_KHR),
            vk::ImageLayout::PRESENT_SRC_KHR
        );
    }

    #[test]
    fn test_dual_source_detection() {
        use crate::types::{BlendFactor, PixelFormat};

        let mut state = ColorAttachmentState::alpha_blended(PixelFormat::Rgba8Unorm);
        assert!(![state.rgb_src_factor, state.rgb_dst_factor]
            .into_iter()
            .any(is_dual_source));
        state.rgb_dst_factor = BlendFactor::OneMinusSource1Color;
        assert!(is_dual_source(state.rgb_dst_factor));
    }
}
