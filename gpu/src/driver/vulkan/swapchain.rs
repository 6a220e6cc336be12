//! Per-window surfaces and swap chains.

use std::sync::Arc;

use ash::vk;

use super::context::VulkanContext;
use super::conversion::{map_vk_error, pixel_format_from_vk, select_present_mode};
use super::resources::VulkanTexture;
use crate::error::{ContractViolation, GpuError, GpuResult};
use crate::surface::{handle_error, Window};
use crate::types::{PixelFormat, TextureDescriptor, TextureUsage};

/// Surface formats in order of preference.
const PREFERRED_FORMATS: &[vk::Format] = &[
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::R8G8B8A8_UNORM,
];

struct SwapchainImage {
    image: vk::Image,
    view: vk::ImageView,
    /// Signaled by the queue before the image is presented.
    render_finished: vk::Semaphore,
    /// Whether the image was moved out of `UNDEFINED` yet.
    initialized: bool,
}

/// Swap chain of one claimed window.
pub struct VulkanSwapchain {
    context: Arc<VulkanContext>,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<SwapchainImage>,
    format: vk::Format,
    pixel_format: PixelFormat,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    swap_interval: u32,
    acquire_fence: vk::Fence,
    acquired: Option<u32>,
    needs_recreate: bool,
}

impl VulkanSwapchain {
    /// Create a surface for `window`. The swap chain itself is built on the
    /// first acquire.
    pub fn new(context: &Arc<VulkanContext>, window: &dyn Window) -> GpuResult<Self> {
        let display = window.display_handle().map_err(handle_error)?;
        let handle = window.window_handle().map_err(handle_error)?;

        let surface = unsafe {
            ash_window::create_surface(
                &context.entry,
                &context.instance,
                display.as_raw(),
                handle.as_raw(),
                None,
            )
        }
        .map_err(|e| match e {
            vk::Result::ERROR_EXTENSION_NOT_PRESENT => {
                GpuError::Unsupported("no surface extension for this window system".to_string())
            }
            other => map_vk_error("vkCreateSurfaceKHR", other),
        })?;

        let supported = unsafe {
            context.surface_loader.get_physical_device_surface_support(
                context.physical_device,
                context.queue_family,
                surface,
            )
        };
        if !matches!(supported, Ok(true)) {
            unsafe { context.surface_loader.destroy_surface(surface, None) };
            return Err(GpuError::Unsupported(
                "the device queue cannot present to this window".to_string(),
            ));
        }

        let acquire_fence = match unsafe {
            context
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
        } {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { context.surface_loader.destroy_surface(surface, None) };
                return Err(map_vk_error("vkCreateFence", e));
            }
        };

        Ok(Self {
            context: context.clone(),
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            format: vk::Format::UNDEFINED,
            pixel_format: PixelFormat::Bgra8Unorm,
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            swap_interval: 1,
            acquire_fence,
            acquired: None,
            needs_recreate: true,
        })
    }

    /// Acquire the next image, rebuilding the swap chain first when the
    /// window changed.
    pub fn acquire(&mut self, window: &dyn Window) -> GpuResult<(VulkanTexture, TextureDescriptor)> {
        let (width, height) = window.drawable_size();
        if width == 0 || height == 0 {
            return Err(GpuError::SurfaceUnavailable(
                "window has a zero-sized drawable".to_string(),
            ));
        }

        if let Some(index) = self.acquired {
            return Ok(self.backbuffer(index));
        }

        if self.needs_recreate || (self.extent.width, self.extent.height) != (width, height) {
            self.recreate(width, height)?;
        }

        let device = &self.context.device;
        let acquired = unsafe {
            self.context.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                vk::Semaphore::null(),
                self.acquire_fence,
            )
        };
        let index = match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.needs_recreate = true;
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_recreate = true;
                return Err(GpuError::SurfaceUnavailable(
                    "swap chain is out of date".to_string(),
                ));
            }
            Err(e) => return Err(map_vk_error("vkAcquireNextImageKHR", e)),
        };

        unsafe {
            device
                .wait_for_fences(&[self.acquire_fence], true, u64::MAX)
                .map_err(|e| map_vk_error("vkWaitForFences", e))?;
            device
                .reset_fences(&[self.acquire_fence])
                .map_err(|e| map_vk_error("vkResetFences", e))?;
        }

        let image = &mut self.images[index as usize];
        if !image.initialized {
            let raw = image.image;
            self.context.one_shot(|cmd| {
                let barrier = vk::ImageMemoryBarrier::default()
                    .dst_access_mask(vk::AccessFlags::MEMORY_READ)
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(raw)
                    .subresource_range(color_range());
                unsafe {
                    device.cmd_pipeline_barrier(
                        cmd,
                        vk::PipelineStageFlags::TOP_OF_PIPE,
                        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    )
                };
            })?;
            image.initialized = true;
        }

        self.acquired = Some(index);
        Ok(self.backbuffer(index))
    }

    /// Present the acquired image once all submitted work has executed.
    pub fn present(&mut self, swap_interval: u32) -> GpuResult<()> {
        let index = self
            .acquired
            .take()
            .ok_or(ContractViolation::NoBackbufferAcquired)?;

        let semaphores = [self.images[index as usize].render_finished];
        let signal = vk::SubmitInfo::default().signal_semaphores(&semaphores);
        self.context.queue_submit(&[signal], vk::Fence::null())?;

        let swapchains = [self.swapchain];
        let indices = [index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match self.context.queue_present(&present_info) {
            Ok(false) => {}
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.needs_recreate = true,
            Err(e) => return Err(map_vk_error("vkQueuePresentKHR", e)),
        }

        if swap_interval != self.swap_interval {
            self.swap_interval = swap_interval;
            self.needs_recreate = true;
        }
        Ok(())
    }

    fn backbuffer(&self, index: u32) -> (VulkanTexture, TextureDescriptor) {
        let image = &self.images[index as usize];
        let texture = VulkanTexture::backbuffer(
            &self.context,
            image.image,
            image.view,
            self.format,
        );
        let descriptor = TextureDescriptor::new_2d(
            self.extent.width,
            self.extent.height,
            self.pixel_format,
            TextureUsage::RENDER_TARGET,
        )
        .with_label("backbuffer");
        (texture, descriptor)
    }

    fn recreate(&mut self, width: u32, height: u32) -> GpuResult<()> {
        let context = self.context.clone();
        // Old images may still be referenced by pending work.
        context.wait_idle()?;

        let loader = &context.surface_loader;
        let physical_device = context.physical_device;
        let capabilities = unsafe {
            loader.get_physical_device_surface_capabilities(physical_device, self.surface)
        }
        .map_err(|e| map_vk_error("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))?;
        let formats =
            unsafe { loader.get_physical_device_surface_formats(physical_device, self.surface) }
                .map_err(|e| map_vk_error("vkGetPhysicalDeviceSurfaceFormatsKHR", e))?;
        let present_modes = unsafe {
            loader.get_physical_device_surface_present_modes(physical_device, self.surface)
        }
        .map_err(|e| map_vk_error("vkGetPhysicalDeviceSurfacePresentModesKHR", e))?;

        let surface_format = PREFERRED_FORMATS
            .iter()
            .find_map(|preferred| formats.iter().find(|f| f.format == *preferred))
            .copied()
            .ok_or_else(|| {
                GpuError::Unsupported("surface offers no supported color format".to_string())
            })?;
        let pixel_format = pixel_format_from_vk(surface_format.format).ok_or_else(|| {
            GpuError::Unsupported(format!("surface format {:?}", surface_format.format))
        })?;

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::SurfaceUnavailable(
                "surface has a zero-sized extent".to_string(),
            ));
        }

        let image_count = (capabilities.min_image_count + 1).min(if capabilities.max_image_count > 0 {
            capabilities.max_image_count
        } else {
            u32::MAX
        });
        let present_mode = select_present_mode(self.swap_interval, &present_modes);
        let transfer = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | (capabilities.supported_usage_flags & transfer);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        let swapchain_loader = &context.swapchain_loader;
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| map_vk_error("vkCreateSwapchainKHR", e))?;

        self.destroy_swapchain();
        self.swapchain = swapchain;

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(|e| map_vk_error("vkGetSwapchainImagesKHR", e))?;
        let device = &context.device;
        for image in images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(color_range());
            let view = unsafe { device.create_image_view(&view_info, None) }
                .map_err(|e| map_vk_error("vkCreateImageView", e))?;
            let render_finished =
                match unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) } {
                    Ok(semaphore) => semaphore,
                    Err(e) => {
                        unsafe { device.destroy_image_view(view, None) };
                        return Err(map_vk_error("vkCreateSemaphore", e));
                    }
                };
            self.images.push(SwapchainImage {
                image,
                view,
                render_finished,
                initialized: false,
            });
        }

        self.format = surface_format.format;
        self.pixel_format = pixel_format;
        self.extent = extent;
        self.present_mode = present_mode;
        self.needs_recreate = false;

        context.logger.info(format_args!(
            "Created Vulkan swapchain: {}x{} with {} images ({:?}, {:?})",
            extent.width,
            extent.height,
            self.images.len(),
            surface_format.format,
            present_mode
        ));
        Ok(())
    }

    /// Destroy the per-image objects. The swap chain handle itself is
    /// destroyed unless it is null.
    fn destroy_swapchain(&mut self) {
        let device = &self.context.device;
        for image in self.images.drain(..) {
            unsafe {
                device.destroy_image_view(image.view, None);
                device.destroy_semaphore(image.render_finished, None);
            }
        }
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.context
                    .swapchain_loader
                    .destroy_swapchain(self.swapchain, None)
            };
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            self.context
                .logger
                .warn(format_args!("failed to idle before destroying swap chain: {e}"));
        }
        self.destroy_swapchain();
        unsafe {
            self.context.device.destroy_fence(self.acquire_fence, None);
            self.context
                .surface_loader
                .destroy_surface(self.surface, None);
        }
    }
}
