//! Device-wide Vulkan state shared by the driver and every native object.
//!
//! Native objects hold an `Arc<VulkanContext>` and destroy themselves on drop,
//! so the context, and with it the logical device, lives until the last of
//! them is gone.

use std::collections::HashMap;
use std::mem::ManuallyDrop;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;

use super::conversion::{convert_pixel_format, map_allocation_error, map_vk_error};
use super::debug::DebugMessenger;
use super::device::{self, PhysicalCandidate};
use super::instance::{create_instance, InstanceBundle};
use super::pipeline::{create_render_pass, BindingLayout, RenderPassKey};
use crate::adapter::{select_adapter_with_verdicts, AdapterDescription, AdapterInfo};
use crate::builder::{log_adapter, log_verdicts, LogicalDevicePlan, SupportedFeatures};
use crate::capabilities::DeviceCapabilities;
use crate::config::DeviceParameters;
use crate::error::{GpuError, GpuResult};
use crate::logging::DeviceLogger;
use crate::types::PixelFormat;

/// Objects owned by a command buffer for the duration of one recording.
#[derive(Default)]
pub struct Transients {
    pub framebuffers: Vec<vk::Framebuffer>,
    pub descriptor_pools: Vec<vk::DescriptorPool>,
}

impl Transients {
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty() && self.descriptor_pools.is_empty()
    }

    /// # Safety
    ///
    /// No command buffer referencing these objects may be pending.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { device.destroy_framebuffer(framebuffer, None) };
        }
        for pool in self.descriptor_pools.drain(..) {
            unsafe { device.destroy_descriptor_pool(pool, None) };
        }
    }
}

/// Command buffer used for blocking one-shot work such as initial layout
/// transitions.
struct ImmediateSubmit {
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

impl ImmediateSubmit {
    fn new(device: &ash::Device, queue_family: u32) -> GpuResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        let pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(|e| map_vk_error("vkCreateCommandPool", e))?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(map_vk_error("vkAllocateCommandBuffers", e));
            }
        };

        let fence = match unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) } {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(map_vk_error("vkCreateFence", e));
            }
        };

        Ok(Self {
            pool,
            buffer,
            fence,
        })
    }

    unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_fence(self.fence, None);
            device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Everything created on top of the instance.
struct DeviceParts {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,
    allocator: Allocator,
    limits: vk::PhysicalDeviceLimits,
    features: SupportedFeatures,
    depth_stencil_format: vk::Format,
    bindings: BindingLayout,
    immediate: ImmediateSubmit,
    info: AdapterInfo,
    plan: LogicalDevicePlan,
}

/// Shared Vulkan device state.
pub struct VulkanContext {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    messenger: Option<DebugMessenger>,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family: u32,
    /// Queue access must be externally synchronized.
    queue: Mutex<vk::Queue>,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub limits: vk::PhysicalDeviceLimits,
    pub features: SupportedFeatures,
    /// Native format backing `PixelFormat::Depth24Stencil8`.
    depth_stencil_format: vk::Format,
    pub bindings: BindingLayout,
    render_passes: Mutex<HashMap<RenderPassKey, vk::RenderPass>>,
    /// Transients of command buffers dropped while possibly in flight.
    retired: Mutex<Vec<Transients>>,
    immediate: Mutex<ImmediateSubmit>,
    pub logger: DeviceLogger,
}

impl VulkanContext {
    /// Load Vulkan, pick an adapter and create the logical device.
    pub fn new(params: &DeviceParameters) -> GpuResult<(Self, AdapterInfo, DeviceCapabilities)> {
        let logger = params.logger.clone();

        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Unsupported(format!("failed to load Vulkan: {e}")))?;

        let label = params.label.as_deref().unwrap_or("RedLilium");
        let InstanceBundle {
            instance,
            messenger,
            capabilities: instance_caps,
        } = create_instance(&entry, label, params.debug_mode, &logger)?;

        let parts = match create_device_parts(&instance, &logger) {
            Ok(parts) => parts,
            Err(e) => {
                unsafe {
                    if let Some(messenger) = &messenger {
                        messenger.destroy();
                    }
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let capabilities = parts.plan.capabilities(instance_caps);
        log_adapter(&logger, &parts.info, &capabilities);

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &parts.device);

        let context = Self {
            entry,
            instance,
            messenger,
            physical_device: parts.physical_device,
            device: parts.device,
            queue_family: parts.queue_family,
            queue: Mutex::new(parts.queue),
            allocator: ManuallyDrop::new(Mutex::new(parts.allocator)),
            surface_loader,
            swapchain_loader,
            limits: parts.limits,
            features: parts.features,
            depth_stencil_format: parts.depth_stencil_format,
            bindings: parts.bindings,
            render_passes: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
            immediate: Mutex::new(parts.immediate),
            logger,
        };
        Ok((context, parts.info, capabilities))
    }

    /// Native format for a pixel format on this device.
    pub fn vk_format(&self, format: PixelFormat) -> vk::Format {
        match format {
            PixelFormat::Depth24Stencil8 => self.depth_stencil_format,
            other => convert_pixel_format(other),
        }
    }

    /// Optimal tiling features of a native format.
    pub fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
        .optimal_tiling_features
    }

    pub fn queue_submit(&self, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> GpuResult<()> {
        let queue = self.queue.lock();
        unsafe { self.device.queue_submit(*queue, submits, fence) }
            .map_err(|e| map_vk_error("vkQueueSubmit", e))
    }

    /// Present on the device queue. Returns whether the swap chain is
    /// suboptimal.
    pub fn queue_present(&self, info: &vk::PresentInfoKHR<'_>) -> Result<bool, vk::Result> {
        let queue = self.queue.lock();
        unsafe { self.swapchain_loader.queue_present(*queue, info) }
    }

    /// Wait for the queue to drain, then destroy retired transients.
    pub fn wait_idle(&self) -> GpuResult<()> {
        {
            let queue = self.queue.lock();
            unsafe { self.device.queue_wait_idle(*queue) }
                .map_err(|e| map_vk_error("vkQueueWaitIdle", e))?;
        }
        self.destroy_retired();
        Ok(())
    }

    fn destroy_retired(&self) {
        let retired = std::mem::take(&mut *self.retired.lock());
        for mut transients in retired {
            unsafe { transients.destroy(&self.device) };
        }
    }

    /// Keep transients alive until the next idle point.
    pub fn retire(&self, transients: Transients) {
        if !transients.is_empty() {
            self.retired.lock().push(transients);
        }
    }

    pub fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> GpuResult<Allocation> {
        self.allocator
            .lock()
            .allocate(desc)
            .map_err(|e| map_allocation_error(desc.name, e))
    }

    pub fn free(&self, allocation: Allocation) {
        if let Err(e) = self.allocator.lock().free(allocation) {
            self.logger
                .warn(format_args!("failed to free GPU allocation: {e}"));
        }
    }

    /// Cached render pass for `key`, created on first use.
    pub fn render_pass(&self, key: &RenderPassKey) -> GpuResult<vk::RenderPass> {
        let mut passes = self.render_passes.lock();
        if let Some(pass) = passes.get(key) {
            return Ok(*pass);
        }
        let pass = create_render_pass(&self.device, key)?;
        passes.insert(key.clone(), pass);
        Ok(pass)
    }

    /// Record with `record` and execute on the queue, blocking until done.
    pub fn one_shot(&self, record: impl FnOnce(vk::CommandBuffer)) -> GpuResult<()> {
        let immediate = self.immediate.lock();
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(immediate.buffer, &begin_info) }
            .map_err(|e| map_vk_error("vkBeginCommandBuffer", e))?;

        record(immediate.buffer);

        unsafe { self.device.end_command_buffer(immediate.buffer) }
            .map_err(|e| map_vk_error("vkEndCommandBuffer", e))?;

        let buffers = [immediate.buffer];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);
        self.queue_submit(&[submit], immediate.fence)?;

        unsafe {
            self.device
                .wait_for_fences(&[immediate.fence], true, u64::MAX)
                .map_err(|e| map_vk_error("vkWaitForFences", e))?;
            self.device
                .reset_fences(&[immediate.fence])
                .map_err(|e| map_vk_error("vkResetFences", e))
        }
    }
}

fn create_device_parts(instance: &ash::Instance, logger: &DeviceLogger) -> GpuResult<DeviceParts> {
    let candidates = device::probe_adapters(instance, logger)?;
    let descriptions: Vec<AdapterDescription> = candidates
        .iter()
        .map(|candidate| candidate.description.clone())
        .collect();

    let (selection, verdicts) = select_adapter_with_verdicts(&descriptions);
    log_verdicts(logger, &descriptions, &verdicts);
    let selection = selection?;

    let PhysicalCandidate {
        handle: physical_device,
        description,
        features,
    } = &candidates[selection.index];
    let physical_device = *physical_device;

    let plan = LogicalDevicePlan::new(description, &selection, *features)?;
    let device = device::create_logical_device(instance, physical_device, &plan)?;

    match create_device_objects(instance, physical_device, &device, &plan) {
        Ok((allocator, bindings, immediate, depth_stencil_format)) => {
            let queue = unsafe { device.get_device_queue(plan.queue_family, 0) };
            let mut info = AdapterInfo {
                name: description.name.clone(),
                adapter_type: description.adapter_type,
                queue_family: plan.queue_family,
                ..Default::default()
            };
            if plan.capabilities(Default::default()).has_driver_properties() {
                device::query_driver_properties(instance, physical_device, &mut info);
            }

            Ok(DeviceParts {
                physical_device,
                queue_family: plan.queue_family,
                queue,
                allocator,
                limits: device::device_limits(instance, physical_device),
                features: plan.features,
                depth_stencil_format,
                bindings,
                immediate,
                info,
                plan,
                device,
            })
        }
        Err(e) => {
            unsafe { device.destroy_device(None) };
            Err(e)
        }
    }
}

fn create_device_objects(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: &ash::Device,
    plan: &LogicalDevicePlan,
) -> GpuResult<(Allocator, BindingLayout, ImmediateSubmit, vk::Format)> {
    let depth_stencil_format = if device::format_supports(
        instance,
        physical_device,
        vk::Format::D24_UNORM_S8_UINT,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    ) {
        vk::Format::D24_UNORM_S8_UINT
    } else {
        vk::Format::D32_SFLOAT_S8_UINT
    };

    let limits = device::device_limits(instance, physical_device);
    let bindings = BindingLayout::new(device, &limits)?;

    let immediate = match ImmediateSubmit::new(device, plan.queue_family) {
        Ok(immediate) => immediate,
        Err(e) => {
            unsafe { bindings.destroy(device) };
            return Err(e);
        }
    };

    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device: device.clone(),
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    });
    let allocator = match allocator {
        Ok(allocator) => allocator,
        Err(e) => {
            unsafe {
                immediate.destroy(device);
                bindings.destroy(device);
            }
            return Err(map_allocation_error("memory allocator", e));
        }
    };

    Ok((allocator, bindings, immediate, depth_stencil_format))
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        self.destroy_retired();

        unsafe {
            self.immediate.lock().destroy(&self.device);
            for (_, pass) in self.render_passes.lock().drain() {
                self.device.destroy_render_pass(pass, None);
            }
            self.bindings.destroy(&self.device);

            // The allocator frees its memory blocks on drop, which needs the device.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
            if let Some(messenger) = &self.messenger {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
        self.logger.debug(format_args!("Vulkan context destroyed"));
    }
}
