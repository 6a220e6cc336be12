//! Render pipeline descriptors.
//!
//! A pipeline bundles the two shader stages with every piece of fixed function
//! state. Vertex attributes describe where each shader input comes from: the
//! attribute's position in [`PipelineDescriptor::vertex_attributes`] is its
//! shader location, and [`VertexAttribute::index`] names the buffer slot set
//! with `set_vertex_buffer`.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bitflags::bitflags;

use super::{CompareFunction, PixelFormat};
use crate::error::{GpuError, GpuResult};
use crate::resources::Shader;
use crate::types::ShaderStage;

/// Maximum number of color attachments in a pass or pipeline.
pub const MAX_COLOR_ATTACHMENTS: usize = 4;
/// Maximum number of vertex attributes in a pipeline.
pub const MAX_VERTEX_ATTRIBUTES: usize = 32;
/// Buffer slots per shader stage.
pub const MAX_BUFFER_SLOTS: u32 = 16;
/// Texture slots per shader stage.
pub const MAX_TEXTURE_SLOTS: u32 = 16;
/// Sampler slots per shader stage.
pub const MAX_SAMPLER_SLOTS: u32 = 16;

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    Point,
    Line,
    LineStrip,
    #[default]
    Triangle,
    TriangleStrip,
}

/// Format of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    UChar2,
    UChar4,
    Char2,
    Char4,
    UChar2Normalized,
    UChar4Normalized,
    Char2Normalized,
    Char4Normalized,
    UShort,
    UShort2,
    UShort4,
    Short,
    Short2,
    Short4,
    UShortNormalized,
    UShort2Normalized,
    UShort4Normalized,
    ShortNormalized,
    Short2Normalized,
    Short4Normalized,
    Half,
    Half2,
    Half4,
    Float,
    Float2,
    Float3,
    Float4,
    UInt,
    UInt2,
    UInt3,
    UInt4,
    Int,
    Int2,
    Int3,
    Int4,
}

impl VertexFormat {
    /// Size of one attribute value in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::UChar2 | Self::Char2 | Self::UChar2Normalized | Self::Char2Normalized => 2,
            Self::UChar4 | Self::Char4 | Self::UChar4Normalized | Self::Char4Normalized => 4,
            Self::UShort | Self::Short | Self::UShortNormalized | Self::ShortNormalized => 2,
            Self::UShort2 | Self::Short2 | Self::UShort2Normalized | Self::Short2Normalized => 4,
            Self::UShort4 | Self::Short4 | Self::UShort4Normalized | Self::Short4Normalized => 8,
            Self::Half => 2,
            Self::Half2 => 4,
            Self::Half4 => 8,
            Self::Float | Self::UInt | Self::Int => 4,
            Self::Float2 | Self::UInt2 | Self::Int2 => 8,
            Self::Float3 | Self::UInt3 | Self::Int3 => 12,
            Self::Float4 | Self::UInt4 | Self::Int4 => 16,
        }
    }
}

/// One vertex shader input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub format: VertexFormat,
    /// Byte offset inside one vertex.
    pub offset: u32,
    /// Bytes between consecutive vertices in the source buffer.
    pub stride: u32,
    /// Buffer slot the attribute is read from.
    pub index: u32,
}

impl VertexAttribute {
    pub fn new(format: VertexFormat, offset: u32, stride: u32, index: u32) -> Self {
        Self {
            format,
            offset,
            stride,
            index,
        }
    }
}

/// Blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend equation operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SourceColor,
    OneMinusSourceColor,
    SourceAlpha,
    OneMinusSourceAlpha,
    DestinationColor,
    OneMinusDestinationColor,
    DestinationAlpha,
    OneMinusDestinationAlpha,
    SourceAlphaSaturated,
    BlendColor,
    OneMinusBlendColor,
    BlendAlpha,
    OneMinusBlendAlpha,
    Source1Color,
    OneMinusSource1Color,
    Source1Alpha,
    OneMinusSource1Alpha,
}

bitflags! {
    /// Color channels written by a color attachment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u32 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Format and blend state of one pipeline color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorAttachmentState {
    pub format: PixelFormat,
    pub write_mask: ColorWriteMask,
    pub blending_enabled: bool,
    pub rgb_blend_op: BlendOp,
    pub rgb_src_factor: BlendFactor,
    pub rgb_dst_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub alpha_src_factor: BlendFactor,
    pub alpha_dst_factor: BlendFactor,
}

impl ColorAttachmentState {
    /// Opaque attachment that replaces the destination.
    pub fn new(format: PixelFormat) -> Self {
        Self {
            format,
            write_mask: ColorWriteMask::all(),
            blending_enabled: false,
            rgb_blend_op: BlendOp::Add,
            rgb_src_factor: BlendFactor::One,
            rgb_dst_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            alpha_src_factor: BlendFactor::One,
            alpha_dst_factor: BlendFactor::Zero,
        }
    }

    /// Standard non-premultiplied alpha blending.
    pub fn alpha_blended(format: PixelFormat) -> Self {
        Self {
            blending_enabled: true,
            rgb_src_factor: BlendFactor::SourceAlpha,
            rgb_dst_factor: BlendFactor::OneMinusSourceAlpha,
            alpha_src_factor: BlendFactor::One,
            alpha_dst_factor: BlendFactor::OneMinusSourceAlpha,
            ..Self::new(format)
        }
    }

    pub fn with_write_mask(mut self, mask: ColorWriteMask) -> Self {
        self.write_mask = mask;
        self
    }
}

/// Stencil buffer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

/// Polygon rasterization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Fill,
    /// Wireframe.
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    Back,
    Front,
    None,
}

/// Depth and stencil test state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    /// Depth attachment format, `None` when the pipeline has no depth.
    pub depth_format: Option<PixelFormat>,
    /// Stencil attachment format, `None` when the pipeline has no stencil.
    pub stencil_format: Option<PixelFormat>,
    pub depth_write_enabled: bool,
    pub depth_function: CompareFunction,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub stencil_reference_front: u32,
    pub stencil_reference_back: u32,
    pub stencil_function: CompareFunction,
    pub stencil_fail: StencilOperation,
    pub depth_fail: StencilOperation,
    pub depth_and_stencil_pass: StencilOperation,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_format: None,
            stencil_format: None,
            depth_write_enabled: false,
            depth_function: CompareFunction::Always,
            stencil_read_mask: 0xFFFF_FFFF,
            stencil_write_mask: 0xFFFF_FFFF,
            stencil_reference_front: 0,
            stencil_reference_back: 0,
            stencil_function: CompareFunction::Always,
            stencil_fail: StencilOperation::Keep,
            depth_fail: StencilOperation::Keep,
            depth_and_stencil_pass: StencilOperation::Keep,
        }
    }
}

impl DepthStencilState {
    /// Depth testing with writes, no stencil.
    pub fn depth(format: PixelFormat, function: CompareFunction) -> Self {
        Self {
            depth_format: Some(format),
            depth_write_enabled: true,
            depth_function: function,
            ..Default::default()
        }
    }
}

/// Constant depth bias applied during rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBias {
    pub constant: f32,
    pub slope_scale: f32,
    pub clamp: f32,
}

impl DepthBias {
    pub fn is_enabled(&self) -> bool {
        self.constant != 0.0 || self.slope_scale != 0.0
    }

    fn bits(&self) -> [u32; 3] {
        [
            self.constant.to_bits(),
            self.slope_scale.to_bits(),
            self.clamp.to_bits(),
        ]
    }
}

/// Descriptor for creating a render pipeline.
///
/// Equality and hashing treat shaders by identity, so two descriptors built
/// from the same shader objects compare equal.
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub label: Option<String>,
    pub topology: PrimitiveTopology,
    pub vertex_shader: Arc<Shader>,
    pub fragment_shader: Arc<Shader>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub color_attachments: Vec<ColorAttachmentState>,
    pub depth_stencil: DepthStencilState,
    pub fill_mode: FillMode,
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
    pub depth_bias: DepthBias,
}

impl PipelineDescriptor {
    /// Default state for the given shaders: triangles, back face culling,
    /// no attributes and no attachments.
    pub fn new(vertex_shader: Arc<Shader>, fragment_shader: Arc<Shader>) -> Self {
        Self {
            label: None,
            topology: PrimitiveTopology::Triangle,
            vertex_shader,
            fragment_shader,
            vertex_attributes: Vec::new(),
            color_attachments: Vec::new(),
            depth_stencil: DepthStencilState::default(),
            fill_mode: FillMode::Fill,
            front_face: FrontFace::CounterClockwise,
            cull_mode: CullMode::Back,
            depth_bias: DepthBias::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_vertex_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.vertex_attributes.push(attribute);
        self
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachmentState) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_stencil(mut self, state: DepthStencilState) -> Self {
        self.depth_stencil = state;
        self
    }

    pub fn with_fill_mode(mut self, fill_mode: FillMode) -> Self {
        self.fill_mode = fill_mode;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_front_face(mut self, front_face: FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn with_depth_bias(mut self, bias: DepthBias) -> Self {
        self.depth_bias = bias;
        self
    }

    /// Vertex buffer slots referenced by attributes, with their stride, in
    /// ascending slot order.
    pub fn vertex_buffer_slots(&self) -> Vec<(u32, u32)> {
        let mut slots: Vec<(u32, u32)> = Vec::new();
        for attribute in &self.vertex_attributes {
            if !slots.iter().any(|(index, _)| *index == attribute.index) {
                slots.push((attribute.index, attribute.stride));
            }
        }
        slots.sort_unstable_by_key(|(index, _)| *index);
        slots
    }

    pub(crate) fn validate(&self) -> GpuResult<()> {
        let invalid = |msg: String| Err(GpuError::InvalidParameter(msg));

        if self.vertex_shader.stage() != ShaderStage::Vertex {
            return invalid("vertex_shader is not a vertex stage shader".to_string());
        }
        if self.fragment_shader.stage() != ShaderStage::Fragment {
            return invalid("fragment_shader is not a fragment stage shader".to_string());
        }
        if self.vertex_attributes.len() > MAX_VERTEX_ATTRIBUTES {
            return invalid(format!(
                "{} vertex attributes exceed the limit of {MAX_VERTEX_ATTRIBUTES}",
                self.vertex_attributes.len()
            ));
        }
        if self.color_attachments.len() > MAX_COLOR_ATTACHMENTS {
            return invalid(format!(
                "{} color attachments exceed the limit of {MAX_COLOR_ATTACHMENTS}",
                self.color_attachments.len()
            ));
        }
        for (location, attribute) in self.vertex_attributes.iter().enumerate() {
            if attribute.index >= MAX_BUFFER_SLOTS {
                return invalid(format!(
                    "vertex attribute {location} reads buffer slot {} (limit {MAX_BUFFER_SLOTS})",
                    attribute.index
                ));
            }
            let shares_slot = self.vertex_attributes[..location]
                .iter()
                .find(|other| other.index == attribute.index);
            if let Some(other) = shares_slot {
                if other.stride != attribute.stride {
                    return invalid(format!(
                        "vertex attributes on slot {} disagree on stride ({} vs {})",
                        attribute.index, other.stride, attribute.stride
                    ));
                }
            }
        }
        if self
            .color_attachments
            .iter()
            .any(|attachment| attachment.format.is_depth_stencil())
        {
            return invalid("color attachment uses a depth/stencil format".to_string());
        }
        let ds = &self.depth_stencil;
        if ds.depth_format.is_some_and(|format| !format.is_depth_stencil()) {
            return invalid("depth_format is not a depth format".to_string());
        }
        if ds.stencil_format.is_some_and(|format| !format.has_stencil()) {
            return invalid("stencil_format has no stencil component".to_string());
        }
        if let (Some(depth), Some(stencil)) = (ds.depth_format, ds.stencil_format) {
            if depth != stencil {
                return invalid("depth and stencil formats must match".to_string());
            }
        }
        Ok(())
    }

    /// Depth/stencil attachment format, if either aspect is used.
    pub fn depth_stencil_format(&self) -> Option<PixelFormat> {
        self.depth_stencil
            .depth_format
            .or(self.depth_stencil.stencil_format)
    }
}

impl PartialEq for PipelineDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
            && self.topology == other.topology
            && Arc::ptr_eq(&self.vertex_shader, &other.vertex_shader)
            && Arc::ptr_eq(&self.fragment_shader, &other.fragment_shader)
            && self.vertex_attributes == other.vertex_attributes
            && self.color_attachments == other.color_attachments
            && self.depth_stencil == other.depth_stencil
            && self.fill_mode == other.fill_mode
            && self.front_face == other.front_face
            && self.cull_mode == other.cull_mode
            && self.depth_bias.bits() == other.depth_bias.bits()
    }
}

impl Eq for PipelineDescriptor {}

impl Hash for PipelineDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.label.hash(state);
        self.topology.hash(state);
        std::ptr::hash(Arc::as_ptr(&self.vertex_shader), state);
        std::ptr::hash(Arc::as_ptr(&self.fragment_shader), state);
        self.vertex_attributes.hash(state);
        self.color_attachments.hash(state);
        self.depth_stencil.hash(state);
        self.fill_mode.hash(state);
        self.front_face.hash(state);
        self.cull_mode.hash(state);
        self.depth_bias.bits().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_format_sizes() {
        assert_eq!(VertexFormat::Float3.size(), 12);
        assert_eq!(VertexFormat::UChar4Normalized.size(), 4);
        assert_eq!(VertexFormat::Half2.size(), 4);
        assert_eq!(VertexFormat::Short4.size(), 8);
    }

    #[test]
    fn test_blend_presets() {
        let opaque = ColorAttachmentState::new(PixelFormat::Bgra8Unorm);
        assert!(!opaque.blending_enabled);
        assert_eq!(opaque.write_mask, ColorWriteMask::all());
        let blended = ColorAttachmentState::alpha_blended(PixelFormat::Bgra8Unorm);
        assert!(blended.blending_enabled);
        assert_eq!(blended.rgb_dst_factor, BlendFactor::OneMinusSourceAlpha);
    }

    #[test]
    fn test_depth_bias_enabled() {
        assert!(!DepthBias::default().is_enabled());
        assert!(DepthBias {
            constant: 1.0,
            ..Default::default()
        }
        .is_enabled());
    }
}
