//! Format enums, usage flags, and descriptor structs for GPU resources.

mod attachment;
mod buffer;
mod common;
mod pipeline;
mod sampler;
mod shader;
mod texture;

pub use attachment::{
    ColorAttachment, DepthAttachment, PassInit, RenderPassDescriptor, StencilAttachment,
};
pub use buffer::{BufferDescriptor, BufferUsage};
pub use common::{
    BufferImageLayout, Color, CompareFunction, Extent3d, IndexType, Origin3d, ScissorRect,
    TextureRegion, Viewport,
};
pub use pipeline::{
    BlendFactor, BlendOp, ColorAttachmentState, ColorWriteMask, CullMode, DepthBias,
    DepthStencilState, FillMode, FrontFace, PipelineDescriptor, PrimitiveTopology,
    StencilOperation, VertexAttribute, VertexFormat, MAX_BUFFER_SLOTS, MAX_COLOR_ATTACHMENTS,
    MAX_SAMPLER_SLOTS, MAX_TEXTURE_SLOTS, MAX_VERTEX_ATTRIBUTES,
};
pub use sampler::{AddressMode, BorderColor, FilterMode, MipFilter, SamplerDescriptor};
pub use shader::{ShaderDescriptor, ShaderStage};
pub use texture::{PixelFormat, TextureDescriptor, TextureType, TextureUsage};
