//! Native buffers, textures, samplers, shaders, pipelines and fences.
//!
//! Each object owns its handles and releases them on drop. Dropping an
//! object the GPU still references is a caller error; the front end only
//! drops resources once nothing recorded against them is pending.

use std::io::Cursor;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use super::context::VulkanContext;
use super::conversion::{
    convert_address_mode, convert_aspect, convert_border_color, convert_buffer_usage,
    convert_compare_function, convert_filter_mode, convert_image_type, convert_mip_filter,
    convert_texture_usage, convert_view_type, copy_aspect, map_vk_error,
};
use super::pipeline::{create_graphics_pipeline, entry_point_name};
use crate::error::{GpuError, GpuResult};
use crate::types::{
    AddressMode, BorderColor, BufferDescriptor, PipelineDescriptor, SamplerDescriptor,
    ShaderDescriptor, TextureDescriptor, TextureType, TextureUsage,
};

/// Create a buffer and bind freshly allocated memory to it.
fn create_raw_buffer(
    context: &VulkanContext,
    name: &str,
    size: u64,
    usage: vk::BufferUsageFlags,
    location: MemoryLocation,
) -> GpuResult<(vk::Buffer, Allocation)> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(size.max(1))
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let device = &context.device;
    let buffer = unsafe { device.create_buffer(&buffer_info, None) }
        .map_err(|e| map_vk_error("vkCreateBuffer", e))?;

    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let allocation = match context.allocate(&AllocationCreateDesc {
        name,
        requirements,
        location,
        linear: true,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    }) {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    if let Err(e) =
        unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
    {
        context.free(allocation);
        unsafe { device.destroy_buffer(buffer, None) };
        return Err(map_vk_error("vkBindBufferMemory", e));
    }

    Ok((buffer, allocation))
}

// ============================================================================
// Buffers
// ============================================================================

/// Device-local buffer.
pub struct VulkanBuffer {
    context: Arc<VulkanContext>,
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
}

impl VulkanBuffer {
    pub fn new(context: &Arc<VulkanContext>, descriptor: &BufferDescriptor) -> GpuResult<Self> {
        let name = descriptor.label.as_deref().unwrap_or("buffer");
        let (buffer, allocation) = create_raw_buffer(
            context,
            name,
            descriptor.size,
            convert_buffer_usage(descriptor.usage),
            MemoryLocation::GpuOnly,
        )?;
        Ok(Self {
            context: context.clone(),
            buffer,
            allocation: Some(allocation),
        })
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            self.context.free(allocation);
        }
    }
}

/// Pointer and length of a persistent mapping.
struct MappedRange {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is only dereferenced through the owning mutex.
unsafe impl Send for MappedRange {}

/// Host-visible staging buffer, persistently mapped.
pub struct VulkanCpuBuffer {
    context: Arc<VulkanContext>,
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    mapped: Mutex<MappedRange>,
    coherent: bool,
}

impl VulkanCpuBuffer {
    pub fn new(
        context: &Arc<VulkanContext>,
        label: Option<&str>,
        len: usize,
        initial: Option<&[u8]>,
    ) -> GpuResult<Self> {
        let (buffer, allocation) = create_raw_buffer(
            context,
            label.unwrap_or("cpu buffer"),
            len as u64,
            vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
        )?;

        let ptr = match allocation.mapped_ptr() {
            Some(ptr) => ptr.cast::<u8>(),
            None => {
                context.free(allocation);
                unsafe { context.device.destroy_buffer(buffer, None) };
                return Err(GpuError::Backend(
                    "host-visible allocation is not mapped".to_string(),
                ));
            }
        };
        let coherent = allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT);

        let cpu_buffer = Self {
            context: context.clone(),
            buffer,
            allocation: Some(allocation),
            mapped: Mutex::new(MappedRange { ptr, len }),
            coherent,
        };

        if let Some(initial) = initial {
            {
                let mut mapped = cpu_buffer.map()?;
                mapped[..initial.len()].copy_from_slice(initial);
            }
            cpu_buffer.flush();
        }
        Ok(cpu_buffer)
    }

    /// Lock the mapping, making device writes visible first.
    pub fn map(&self) -> GpuResult<MappedMutexGuard<'_, [u8]>> {
        let guard = self.mapped.lock();
        if !self.coherent {
            if let Some(range) = self.whole_range() {
                unsafe { self.context.device.invalidate_mapped_memory_ranges(&[range]) }
                    .map_err(|e| map_vk_error("vkInvalidateMappedMemoryRanges", e))?;
            }
        }
        Ok(MutexGuard::map(guard, |range| {
            // SAFETY: the allocation stays mapped for the lifetime of the buffer
            unsafe { std::slice::from_raw_parts_mut(range.ptr.as_ptr(), range.len) }
        }))
    }

    /// Make host writes visible to the device. Does not take the mapping lock.
    pub fn flush(&self) {
        if self.coherent {
            return;
        }
        if let Some(range) = self.whole_range() {
            if let Err(e) = unsafe { self.context.device.flush_mapped_memory_ranges(&[range]) } {
                self.context
                    .logger
                    .warn(format_args!("failed to flush CPU buffer: {e:?}"));
            }
        }
    }

    fn whole_range(&self) -> Option<vk::MappedMemoryRange<'static>> {
        let allocation = self.allocation.as_ref()?;
        let atom = self.context.limits.non_coherent_atom_size.max(1);
        Some(
            vk::MappedMemoryRange::default()
                .memory(unsafe { allocation.memory() })
                .offset(allocation.offset() / atom * atom)
                .size(vk::WHOLE_SIZE),
        )
    }
}

impl Drop for VulkanCpuBuffer {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            self.context.free(allocation);
        }
    }
}

// ============================================================================
// Textures
// ============================================================================

/// An image and its views. Backbuffers borrow their image and view from the
/// swap chain and release nothing.
pub struct VulkanTexture {
    context: Arc<VulkanContext>,
    pub image: vk::Image,
    /// View over every level and layer.
    pub view: vk::ImageView,
    /// Single-level 2D view used as a render target, when `view` is not one.
    attachment_view: Option<vk::ImageView>,
    allocation: Option<Allocation>,
    pub format: vk::Format,
    /// Layout the image is kept in between commands.
    pub resting_layout: vk::ImageLayout,
    owned: bool,
}

fn subresource_range(
    aspect: vk::ImageAspectFlags,
    levels: u32,
    layers: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: levels,
        base_array_layer: 0,
        layer_count: layers,
    }
}

impl VulkanTexture {
    pub fn new(context: &Arc<VulkanContext>, descriptor: &TextureDescriptor) -> GpuResult<Self> {
        let device = &context.device;
        let format = context.vk_format(descriptor.format);
        let usage = convert_texture_usage(
            descriptor.usage,
            descriptor.format,
            context.format_features(format),
        );
        let extent = descriptor.extent();
        let layers = descriptor.array_layers();

        let flags = if descriptor.texture_type.is_cube() {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(convert_image_type(descriptor.texture_type))
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: extent.depth,
            })
            .mip_levels(descriptor.mip_levels)
            .array_layers(layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&image_info, None) }
            .map_err(|e| map_vk_error("vkCreateImage", e))?;

        // From here on the partially built texture releases what it holds on
        // the error path.
        let mut texture = Self {
            context: context.clone(),
            image,
            view: vk::ImageView::null(),
            attachment_view: None,
            allocation: None,
            format,
            resting_layout: vk::ImageLayout::GENERAL,
            owned: true,
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let allocation = context.allocate(&AllocationCreateDesc {
            name: descriptor.label.as_deref().unwrap_or("texture"),
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
            .map_err(|e| map_vk_error("vkBindImageMemory", e))?;
        texture.allocation = Some(allocation);

        // Sampled views of depth/stencil images may only cover the depth aspect.
        let aspect = convert_aspect(descriptor.format);
        let view_aspect = copy_aspect(descriptor.format);
        let range = subresource_range(aspect, descriptor.mip_levels, layers);
        texture.view = create_view(
            device,
            image,
            convert_view_type(descriptor.texture_type),
            format,
            subresource_range(view_aspect, descriptor.mip_levels, layers),
        )?;

        let plain_2d = descriptor.texture_type == TextureType::D2
            && descriptor.mip_levels == 1
            && view_aspect == aspect;
        if descriptor.usage.contains(TextureUsage::RENDER_TARGET) && !plain_2d {
            texture.attachment_view = Some(create_view(
                device,
                image,
                vk::ImageViewType::TYPE_2D,
                format,
                subresource_range(aspect, 1, 1),
            )?);
        }

        context.one_shot(|cmd| {
            let barrier = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::GENERAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range);
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                )
            };
        })?;

        Ok(texture)
    }

    /// Wrap a swap chain image.
    pub fn backbuffer(
        context: &Arc<VulkanContext>,
        image: vk::Image,
        view: vk::ImageView,
        format: vk::Format,
    ) -> Self {
        Self {
            context: context.clone(),
            image,
            view,
            attachment_view: None,
            allocation: None,
            format,
            resting_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            owned: false,
        }
    }

    /// View to bind as a framebuffer attachment.
    pub fn attachment_view(&self) -> vk::ImageView {
        self.attachment_view.unwrap_or(self.view)
    }
}

fn create_view(
    device: &ash::Device,
    image: vk::Image,
    view_type: vk::ImageViewType,
    format: vk::Format,
    range: vk::ImageSubresourceRange,
) -> GpuResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .subresource_range(range);
    unsafe { device.create_image_view(&view_info, None) }
        .map_err(|e| map_vk_error("vkCreateImageView", e))
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        let device = &self.context.device;
        unsafe {
            if let Some(view) = self.attachment_view.take() {
                device.destroy_image_view(view, None);
            }
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
            device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.context.free(allocation);
        }
    }
}

// ============================================================================
// Samplers
// ============================================================================

pub struct VulkanSampler {
    context: Arc<VulkanContext>,
    pub sampler: vk::Sampler,
}

impl VulkanSampler {
    pub fn new(context: &Arc<VulkanContext>, descriptor: &SamplerDescriptor) -> GpuResult<Self> {
        let modes = [
            descriptor.address_mode_u,
            descriptor.address_mode_v,
            descriptor.address_mode_w,
        ];
        let border_color = if modes.contains(&AddressMode::ClampToBorderColor) {
            descriptor.border_color
        } else {
            BorderColor::TransparentBlack
        };

        let anisotropy_enabled =
            context.features.sampler_anisotropy && descriptor.max_anisotropy > 1;
        let max_anisotropy =
            f32::from(descriptor.max_anisotropy).min(context.limits.max_sampler_anisotropy);
        let (mipmap_mode, max_lod) = convert_mip_filter(descriptor.mip_filter);

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(convert_filter_mode(descriptor.mag_filter))
            .min_filter(convert_filter_mode(descriptor.min_filter))
            .mipmap_mode(mipmap_mode)
            .address_mode_u(convert_address_mode(descriptor.address_mode_u))
            .address_mode_v(convert_address_mode(descriptor.address_mode_v))
            .address_mode_w(convert_address_mode(descriptor.address_mode_w))
            .mip_lod_bias(0.0)
            .anisotropy_enable(anisotropy_enabled)
            .max_anisotropy(if anisotropy_enabled { max_anisotropy } else { 1.0 })
            .compare_enable(descriptor.compare.is_some())
            .compare_op(
                descriptor
                    .compare
                    .map(convert_compare_function)
                    .unwrap_or(vk::CompareOp::ALWAYS),
            )
            .min_lod(0.0)
            .max_lod(max_lod)
            .border_color(convert_border_color(border_color))
            .unnormalized_coordinates(false);

        let sampler = unsafe { context.device.create_sampler(&sampler_info, None) }
            .map_err(|e| map_vk_error("vkCreateSampler", e))?;

        Ok(Self {
            context: context.clone(),
            sampler,
        })
    }
}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_sampler(self.sampler, None) };
    }
}

// ============================================================================
// Shaders and pipelines
// ============================================================================

pub struct VulkanShader {
    context: Arc<VulkanContext>,
    pub module: vk::ShaderModule,
    pub entry_point: std::ffi::CString,
}

impl VulkanShader {
    pub fn new(context: &Arc<VulkanContext>, descriptor: &ShaderDescriptor) -> GpuResult<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(&descriptor.bytecode)).map_err(|e| {
            GpuError::InvalidParameter(format!("shader bytecode is not valid SPIR-V: {e}"))
        })?;
        let entry_point = entry_point_name(&descriptor.entry_point)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { context.device.create_shader_module(&create_info, None) }
            .map_err(|e| map_vk_error("vkCreateShaderModule", e))?;

        Ok(Self {
            context: context.clone(),
            module,
            entry_point,
        })
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_shader_module(self.module, None) };
    }
}

pub struct VulkanPipeline {
    context: Arc<VulkanContext>,
    pub pipeline: vk::Pipeline,
    /// Buffer slots the pipeline reads vertex streams from.
    pub vertex_slots: Vec<u32>,
}

impl VulkanPipeline {
    pub fn new(context: &Arc<VulkanContext>, descriptor: &PipelineDescriptor) -> GpuResult<Self> {
        let (pipeline, vertex_slots) = create_graphics_pipeline(context, descriptor)?;
        Ok(Self {
            context: context.clone(),
            pipeline,
            vertex_slots,
        })
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_pipeline(self.pipeline, None) };
    }
}

// ============================================================================
// Fences
// ============================================================================

pub struct VulkanFence {
    context: Arc<VulkanContext>,
    pub fence: vk::Fence,
}

impl VulkanFence {
    pub fn new(context: &Arc<VulkanContext>) -> GpuResult<Self> {
        let fence = unsafe {
            context
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
        }
        .map_err(|e| map_vk_error("vkCreateFence", e))?;
        Ok(Self {
            context: context.clone(),
            fence,
        })
    }

    pub fn is_signaled(&self) -> GpuResult<bool> {
        unsafe { self.context.device.get_fence_status(self.fence) }
            .map_err(|e| map_vk_error("vkGetFenceStatus", e))
    }

    pub fn reset(&self) -> GpuResult<()> {
        unsafe { self.context.device.reset_fences(&[self.fence]) }
            .map_err(|e| map_vk_error("vkResetFences", e))
    }

    /// Wait for the fence. `None` waits without limit.
    pub fn wait(&self, timeout: Option<Duration>) -> GpuResult<bool> {
        let timeout_ns = timeout
            .map(|t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX);
        match unsafe {
            self.context
                .device
                .wait_for_fences(&[self.fence], true, timeout_ns)
        } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(map_vk_error("vkWaitForFences", e)),
        }
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_fence(self.fence, None) };
    }
}
