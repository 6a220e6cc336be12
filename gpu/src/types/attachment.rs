//! Render pass attachment descriptors.

use super::{Color, TextureUsage, MAX_COLOR_ATTACHMENTS};
use crate::error::{GpuError, GpuResult};
use crate::resources::{Pipeline, Texture};

/// What an attachment contains when the pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PassInit<T> {
    /// Previous contents are discarded and undefined.
    Undefined,
    /// Previous contents are preserved.
    #[default]
    Load,
    /// The attachment is cleared to the given value.
    Clear(T),
}

impl<T> PassInit<T> {
    pub fn is_load(&self) -> bool {
        matches!(self, Self::Load)
    }
}

/// A color target of a render pass.
#[derive(Debug, Clone, Copy)]
pub struct ColorAttachment<'a> {
    /// Must have been created with [`TextureUsage::RENDER_TARGET`].
    pub texture: &'a Texture,
    pub init: PassInit<Color>,
}

impl<'a> ColorAttachment<'a> {
    pub fn load(texture: &'a Texture) -> Self {
        Self {
            texture,
            init: PassInit::Load,
        }
    }

    pub fn clear(texture: &'a Texture, color: Color) -> Self {
        Self {
            texture,
            init: PassInit::Clear(color),
        }
    }
}

/// The depth target of a render pass.
#[derive(Debug, Clone, Copy)]
pub struct DepthAttachment<'a> {
    pub texture: &'a Texture,
    pub init: PassInit<f32>,
}

impl<'a> DepthAttachment<'a> {
    pub fn clear(texture: &'a Texture, depth: f32) -> Self {
        Self {
            texture,
            init: PassInit::Clear(depth),
        }
    }
}

/// The stencil target of a render pass.
///
/// Must reference the same texture as the depth attachment when both are set.
#[derive(Debug, Clone, Copy)]
pub struct StencilAttachment<'a> {
    pub texture: &'a Texture,
    pub init: PassInit<u32>,
}

impl<'a> StencilAttachment<'a> {
    pub fn clear(texture: &'a Texture, stencil: u32) -> Self {
        Self {
            texture,
            init: PassInit::Clear(stencil),
        }
    }
}

/// Everything needed to begin a render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescriptor<'a> {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment<'a>>,
    pub depth_attachment: Option<DepthAttachment<'a>>,
    pub stencil_attachment: Option<StencilAttachment<'a>>,
    /// Pipeline bound right after the pass begins.
    pub initial_pipeline: Option<&'a Pipeline>,
}

impl<'a> RenderPassDescriptor<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachment<'a>) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_attachment(mut self, attachment: DepthAttachment<'a>) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    pub fn with_stencil_attachment(mut self, attachment: StencilAttachment<'a>) -> Self {
        self.stencil_attachment = Some(attachment);
        self
    }

    pub fn with_pipeline(mut self, pipeline: &'a Pipeline) -> Self {
        self.initial_pipeline = Some(pipeline);
        self
    }

    /// The combined depth/stencil texture, if any.
    pub fn depth_stencil_texture(&self) -> Option<&'a Texture> {
        self.depth_attachment
            .map(|attachment| attachment.texture)
            .or(self.stencil_attachment.map(|attachment| attachment.texture))
    }

    /// Framebuffer size shared by every attachment.
    pub fn render_area(&self) -> (u32, u32) {
        self.color_attachments
            .first()
            .map(|attachment| attachment.texture)
            .or(self.depth_stencil_texture())
            .map(|texture| (texture.width(), texture.height()))
            .unwrap_or((0, 0))
    }

    pub(crate) fn validate(&self) -> GpuResult<()> {
        let invalid = |msg: String| Err(GpuError::InvalidParameter(msg));

        if self.color_attachments.is_empty() || self.color_attachments.len() > MAX_COLOR_ATTACHMENTS
        {
            return invalid(format!(
                "render pass needs 1..={MAX_COLOR_ATTACHMENTS} color attachments, got {}",
                self.color_attachments.len()
            ));
        }

        let (width, height) = self.render_area();
        let check_target = |what: &str, texture: &Texture| -> GpuResult<()> {
            if !texture.usage().contains(TextureUsage::RENDER_TARGET) {
                return invalid(format!("{what} texture was not created as a render target"));
            }
            if (texture.width(), texture.height()) != (width, height) {
                return invalid(format!(
                    "{what} texture is {}x{}, pass is {width}x{height}",
                    texture.width(),
                    texture.height()
                ));
            }
            Ok(())
        };

        for attachment in &self.color_attachments {
            if attachment.texture.format().is_depth_stencil() {
                return invalid("color attachment uses a depth/stencil format".to_string());
            }
            check_target("color attachment", attachment.texture)?;
        }
        if let Some(depth) = &self.depth_attachment {
            if !depth.texture.format().is_depth_stencil() {
                return invalid("depth attachment is not a depth format".to_string());
            }
            check_target("depth attachment", depth.texture)?;
        }
        if let Some(stencil) = &self.stencil_attachment {
            if !stencil.texture.format().has_stencil() {
                return invalid("stencil attachment has no stencil component".to_string());
            }
            check_target("stencil attachment", stencil.texture)?;
        }
        if let (Some(depth), Some(stencil)) = (&self.depth_attachment, &self.stencil_attachment) {
            if !std::ptr::eq(depth.texture, stencil.texture) {
                return invalid(
                    "depth and stencil attachments must reference the same texture".to_string(),
                );
            }
        }
        Ok(())
    }
}
