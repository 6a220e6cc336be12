//! Type conversions between crate types and Vulkan types.

use ash::vk;

use crate::adapter::{AdapterType, QueueCapabilities};
use crate::error::GpuError;
use crate::types::{
    AddressMode, BlendFactor, BlendOp, BorderColor, BufferUsage, ColorWriteMask, CompareFunction,
    CullMode, FillMode, FilterMode, FrontFace, IndexType, MipFilter, PassInit, PixelFormat,
    PrimitiveTopology, StencilOperation, TextureType, TextureUsage, VertexFormat,
};

/// Translate a native result code into a [`GpuError`].
///
/// `what` names the failed operation and becomes the message prefix.
pub fn map_vk_error(what: &str, result: vk::Result) -> GpuError {
    let message = format!("{what}: {result:?}");
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_OUT_OF_POOL_MEMORY
        | vk::Result::ERROR_FRAGMENTED_POOL
        | vk::Result::ERROR_FRAGMENTATION
        | vk::Result::ERROR_TOO_MANY_OBJECTS => GpuError::OutOfMemory(message),
        vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost(message),
        vk::Result::ERROR_OUT_OF_DATE_KHR
        | vk::Result::ERROR_SURFACE_LOST_KHR
        | vk::Result::SUBOPTIMAL_KHR => GpuError::SurfaceUnavailable(message),
        vk::Result::ERROR_INITIALIZATION_FAILED
        | vk::Result::ERROR_INCOMPATIBLE_DRIVER
        | vk::Result::ERROR_EXTENSION_NOT_PRESENT
        | vk::Result::ERROR_LAYER_NOT_PRESENT
        | vk::Result::ERROR_FEATURE_NOT_PRESENT
        | vk::Result::ERROR_FORMAT_NOT_SUPPORTED
        | vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => GpuError::Unsupported(message),
        _ => GpuError::Backend(message),
    }
}

/// Translate a memory allocator failure.
pub fn map_allocation_error(what: &str, err: gpu_allocator::AllocationError) -> GpuError {
    match err {
        gpu_allocator::AllocationError::OutOfMemory => {
            GpuError::OutOfMemory(format!("{what}: device memory exhausted"))
        }
        other => GpuError::Backend(format!("{what}: {other}")),
    }
}

pub fn convert_adapter_type(device_type: vk::PhysicalDeviceType) -> AdapterType {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterType::Discrete,
        vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterType::Virtual,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterType::Integrated,
        vk::PhysicalDeviceType::CPU => AdapterType::Software,
        _ => AdapterType::Other,
    }
}

pub fn convert_queue_flags(flags: vk::QueueFlags) -> QueueCapabilities {
    let mut result = QueueCapabilities::empty();
    if flags.contains(vk::QueueFlags::GRAPHICS) {
        result |= QueueCapabilities::GRAPHICS;
    }
    if flags.contains(vk::QueueFlags::COMPUTE) {
        result |= QueueCapabilities::COMPUTE;
    }
    if flags.contains(vk::QueueFlags::TRANSFER) {
        result |= QueueCapabilities::TRANSFER;
    }
    result
}

// ============================================================================
// Formats
// ============================================================================

/// Convert PixelFormat to its preferred Vulkan format.
///
/// Depth formats may be substituted by the device when unsupported, see
/// `VulkanContext::vk_format`.
pub fn convert_pixel_format(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::B5G6R5Unorm => vk::Format::R5G6B5_UNORM_PACK16,
        PixelFormat::Bgr5A1Unorm => vk::Format::A1R5G5B5_UNORM_PACK16,
        PixelFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        PixelFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        PixelFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        PixelFormat::Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
    }
}

/// The PixelFormat a swap chain format is exposed as.
pub fn pixel_format_from_vk(format: vk::Format) -> Option<PixelFormat> {
    match format {
        vk::Format::R8G8B8A8_UNORM => Some(PixelFormat::Rgba8Unorm),
        vk::Format::R8G8B8A8_SRGB => Some(PixelFormat::Rgba8UnormSrgb),
        vk::Format::B8G8R8A8_UNORM => Some(PixelFormat::Bgra8Unorm),
        vk::Format::B8G8R8A8_SRGB => Some(PixelFormat::Bgra8UnormSrgb),
        vk::Format::R5G6B5_UNORM_PACK16 => Some(PixelFormat::B5G6R5Unorm),
        vk::Format::A1R5G5B5_UNORM_PACK16 => Some(PixelFormat::Bgr5A1Unorm),
        _ => None,
    }
}

/// Aspects covered by views of a texture in `format`.
pub fn convert_aspect(format: PixelFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth_stencil() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Aspect used when copying between buffers and textures, which transfer
/// one aspect at a time.
pub fn copy_aspect(format: PixelFormat) -> vk::ImageAspectFlags {
    if format.is_depth_stencil() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

// ============================================================================
// Usage
// ============================================================================

/// Convert BufferUsage flags. Every buffer can take part in transfers.
pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut result = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;

    if usage.contains(BufferUsage::VERTEX) {
        result |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }

    result
}

/// Convert TextureUsage flags, dropping storage usage the format cannot
/// provide according to `features`.
pub fn convert_texture_usage(
    usage: TextureUsage,
    format: PixelFormat,
    features: vk::FormatFeatureFlags,
) -> vk::ImageUsageFlags {
    let mut result = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;

    if usage.contains(TextureUsage::SHADER_READ) {
        result |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::SHADER_WRITE)
        && features.contains(vk::FormatFeatureFlags::STORAGE_IMAGE)
    {
        result |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::RENDER_TARGET) {
        if format.is_depth_stencil() {
            result |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            result |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
    }

    result
}

pub fn convert_image_type(texture_type: TextureType) -> vk::ImageType {
    match texture_type {
        TextureType::D1 => vk::ImageType::TYPE_1D,
        TextureType::D3 => vk::ImageType::TYPE_3D,
        TextureType::D2 | TextureType::D2Array | TextureType::Cube | TextureType::CubeArray => {
            vk::ImageType::TYPE_2D
        }
    }
}

pub fn convert_view_type(texture_type: TextureType) -> vk::ImageViewType {
    match texture_type {
        TextureType::D1 => vk::ImageViewType::TYPE_1D,
        TextureType::D2 => vk::ImageViewType::TYPE_2D,
        TextureType::D2Array => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureType::D3 => vk::ImageViewType::TYPE_3D,
        TextureType::Cube => vk::ImageViewType::CUBE,
        TextureType::CubeArray => vk::ImageViewType::CUBE_ARRAY,
    }
}

// ============================================================================
// Samplers
// ============================================================================

pub fn convert_filter_mode(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

/// Mipmap mode and the maximum LOD it implies.
pub fn convert_mip_filter(filter: MipFilter) -> (vk::SamplerMipmapMode, f32) {
    match filter {
        MipFilter::NotMipmapped => (vk::SamplerMipmapMode::NEAREST, 0.0),
        MipFilter::Nearest => (vk::SamplerMipmapMode::NEAREST, vk::LOD_CLAMP_NONE),
        MipFilter::Linear => (vk::SamplerMipmapMode::LINEAR, vk::LOD_CLAMP_NONE),
    }
}

/// Convert an address mode. `ClampToZero` samples a transparent black
/// border regardless of the descriptor's border color.
pub fn convert_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        // Mirror-clamp needs an extension the device is not created with.
        AddressMode::MirrorClampToEdge => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToZero | AddressMode::ClampToBorderColor => {
            vk::SamplerAddressMode::CLAMP_TO_BORDER
        }
    }
}

pub fn convert_border_color(color: BorderColor) -> vk::BorderColor {
    match color {
        BorderColor::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        BorderColor::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
        BorderColor::OpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
    }
}

pub fn convert_compare_function(func: CompareFunction) -> vk::CompareOp {
    match func {
        CompareFunction::Never => vk::CompareOp::NEVER,
        CompareFunction::Less => vk::CompareOp::LESS,
        CompareFunction::Equal => vk::CompareOp::EQUAL,
        CompareFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunction::Greater => vk::CompareOp::GREATER,
        CompareFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunction::Always => vk::CompareOp::ALWAYS,
    }
}

// ============================================================================
// Pipeline state
// ============================================================================

pub fn convert_topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::Point => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::Line => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::Triangle => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

pub fn convert_vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::UChar2 => vk::Format::R8G8_UINT,
        VertexFormat::UChar4 => vk::Format::R8G8B8A8_UINT,
        VertexFormat::Char2 => vk::Format::R8G8_SINT,
        VertexFormat::Char4 => vk::Format::R8G8B8A8_SINT,
        VertexFormat::UChar2Normalized => vk::Format::R8G8_UNORM,
        VertexFormat::UChar4Normalized => vk::Format::R8G8B8A8_UNORM,
        VertexFormat::Char2Normalized => vk::Format::R8G8_SNORM,
        VertexFormat::Char4Normalized => vk::Format::R8G8B8A8_SNORM,
        VertexFormat::UShort => vk::Format::R16_UINT,
        VertexFormat::UShort2 => vk::Format::R16G16_UINT,
        VertexFormat::UShort4 => vk::Format::R16G16B16A16_UINT,
        VertexFormat::Short => vk::Format::R16_SINT,
        VertexFormat::Short2 => vk::Format::R16G16_SINT,
        VertexFormat::Short4 => vk::Format::R16G16B16A16_SINT,
        VertexFormat::UShortNormalized => vk::Format::R16_UNORM,
        VertexFormat::UShort2Normalized => vk::Format::R16G16_UNORM,
        VertexFormat::UShort4Normalized => vk::Format::R16G16B16A16_UNORM,
        VertexFormat::ShortNormalized => vk::Format::R16_SNORM,
        VertexFormat::Short2Normalized => vk::Format::R16G16_SNORM,
        VertexFormat::Short4Normalized => vk::Format::R16G16B16A16_SNORM,
        VertexFormat::Half => vk::Format::R16_SFLOAT,
        VertexFormat::Half2 => vk::Format::R16G16_SFLOAT,
        VertexFormat::Half4 => vk::Format::R16G16B16A16_SFLOAT,
        VertexFormat::Float => vk::Format::R32_SFLOAT,
        VertexFormat::Float2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::UInt => vk::Format::R32_UINT,
        VertexFormat::UInt2 => vk::Format::R32G32_UINT,
        VertexFormat::UInt3 => vk::Format::R32G32B32_UINT,
        VertexFormat::UInt4 => vk::Format::R32G32B32A32_UINT,
        VertexFormat::Int => vk::Format::R32_SINT,
        VertexFormat::Int2 => vk::Format::R32G32_SINT,
        VertexFormat::Int3 => vk::Format::R32G32B32_SINT,
        VertexFormat::Int4 => vk::Format::R32G32B32A32_SINT,
    }
}

pub fn convert_blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub fn convert_blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SourceColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSourceColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SourceAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSourceAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DestinationColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDestinationColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::DestinationAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDestinationAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::SourceAlphaSaturated => vk::BlendFactor::SRC_ALPHA_SATURATE,
        BlendFactor::BlendColor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::OneMinusBlendColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::BlendAlpha => vk::BlendFactor::CONSTANT_ALPHA,
        BlendFactor::OneMinusBlendAlpha => vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA,
        BlendFactor::Source1Color => vk::BlendFactor::SRC1_COLOR,
        BlendFactor::OneMinusSource1Color => vk::BlendFactor::ONE_MINUS_SRC1_COLOR,
        BlendFactor::Source1Alpha => vk::BlendFactor::SRC1_ALPHA,
        BlendFactor::OneMinusSource1Alpha => vk::BlendFactor::ONE_MINUS_SRC1_ALPHA,
    }
}

/// Whether the factor reads the second fragment output.
pub fn is_dual_source(factor: BlendFactor) -> bool {
    matches!(
        factor,
        BlendFactor::Source1Color
            | BlendFactor::OneMinusSource1Color
            | BlendFactor::Source1Alpha
            | BlendFactor::OneMinusSource1Alpha
    )
}

pub fn convert_write_mask(mask: ColorWriteMask) -> vk::ColorComponentFlags {
    let mut result = vk::ColorComponentFlags::empty();
    if mask.contains(ColorWriteMask::RED) {
        result |= vk::ColorComponentFlags::R;
    }
    if mask.contains(ColorWriteMask::GREEN) {
        result |= vk::ColorComponentFlags::G;
    }
    if mask.contains(ColorWriteMask::BLUE) {
        result |= vk::ColorComponentFlags::B;
    }
    if mask.contains(ColorWriteMask::ALPHA) {
        result |= vk::ColorComponentFlags::A;
    }
    result
}

pub fn convert_stencil_op(op: StencilOperation) -> vk::StencilOp {
    match op {
        StencilOperation::Keep => vk::StencilOp::KEEP,
        StencilOperation::Zero => vk::StencilOp::ZERO,
        StencilOperation::Replace => vk::StencilOp::REPLACE,
        StencilOperation::IncrementClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOperation::DecrementClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOperation::Invert => vk::StencilOp::INVERT,
        StencilOperation::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOperation::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn convert_fill_mode(mode: FillMode) -> vk::PolygonMode {
    match mode {
        FillMode::Fill => vk::PolygonMode::FILL,
        FillMode::Line => vk::PolygonMode::LINE,
    }
}

pub fn convert_front_face(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub fn convert_cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::None => vk::CullModeFlags::NONE,
    }
}

pub fn convert_index_type(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

pub fn convert_load_op<T>(init: &PassInit<T>) -> vk::AttachmentLoadOp {
    match init {
        PassInit::Undefined => vk::AttachmentLoadOp::DONT_CARE,
        PassInit::Load => vk::AttachmentLoadOp::LOAD,
        PassInit::Clear(_) => vk::AttachmentLoadOp::CLEAR,
    }
}

// ============================================================================
// Presentation
// ============================================================================

/// Pick a present mode for a swap interval.
///
/// Interval 0 prefers immediate, then mailbox. Everything else is FIFO,
/// which every surface supports.
pub fn select_present_mode(
    swap_interval: u32,
    available: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    if swap_interval == 0 {
        for mode in [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX] {
            if available.contains(&mode) {
                return mode;
            }
        }
    }
    vk::PresentModeKHR::FIFO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_error_categories() {
        let kind = |result| map_vk_error("op", result).kind();
        assert_eq!(
            kind(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(
            kind(vk::Result::ERROR_OUT_OF_POOL_MEMORY),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(kind(vk::Result::ERROR_OUT_OF_DATE_KHR), ErrorKind::Transient);
        assert_eq!(kind(vk::Result::ERROR_SURFACE_LOST_KHR), ErrorKind::Transient);
        assert_eq!(
            kind(vk::Result::ERROR_INCOMPATIBLE_DRIVER),
            ErrorKind::Unsupported
        );
        assert!(matches!(
            map_vk_error("op", vk::Result::ERROR_DEVICE_LOST),
            GpuError::DeviceLost(_)
        ));
        assert!(matches!(
            map_vk_error("op", vk::Result::ERROR_UNKNOWN),
            GpuError::Backend(_)
        ));
    }

    #[test]
    fn test_error_message_names_operation() {
        let err = map_vk_error("vkCreateBuffer", vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert!(err.to_string().contains("vkCreateBuffer"));
    }

    #[test]
    fn test_present_mode_selection() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(select_present_mode(0, &all), vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(select_present_mode(1, &all), vk::PresentModeKHR::FIFO);
        assert_eq!(
            select_present_mode(0, &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(0, &[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_swapchain_formats_map_back() {
        for format in [
            PixelFormat::Rgba8Unorm,
            PixelFormat::Bgra8Unorm,
            PixelFormat::Bgra8UnormSrgb,
        ] {
            assert_eq!(pixel_format_from_vk(convert_pixel_format(format)), Some(format));
        }
        assert_eq!(pixel_format_from_vk(vk::Format::D24_UNORM_S8_UINT), None);
    }

    #[test]
    fn test_texture_usage() {
        let usage = convert_texture_usage(
            TextureUsage::SHADER_READ | TextureUsage::RENDER_TARGET,
            PixelFormat::Depth24Stencil8,
            vk::FormatFeatureFlags::empty(),
        );
        assert!(usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert!(usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert!(!usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));

        // Storage is only requested when the format supports it.
        let without = convert_texture_usage(
            TextureUsage::SHADER_WRITE,
            PixelFormat::Bgra8UnormSrgb,
            vk::FormatFeatureFlags::SAMPLED_IMAGE,
        );
        assert!(!without.contains(vk::ImageUsageFlags::STORAGE));
        let with = convert_texture_usage(
            TextureUsage::SHADER_WRITE,
            PixelFormat::Rgba8Unorm,
            vk::FormatFeatureFlags::STORAGE_IMAGE,
        );
        assert!(with.contains(vk::ImageUsageFlags::STORAGE));
    }

    #[test]
    fn test_buffer_usage_always_transfers() {
        let usage = convert_buffer_usage(BufferUsage::INDEX);
        assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST));
        assert!(usage.contains(vk::BufferUsageFlags::INDEX_BUFFER));
        assert!(!usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
    }
}
