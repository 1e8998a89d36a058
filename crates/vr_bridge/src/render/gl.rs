//! Graphics device abstraction
//!
//! The bridge needs only a thin slice of the GL API: object creation and
//! deletion, multisample storage, framebuffer attachments, completeness
//! checks, a blit, and a handful of global state toggles. [`GlDevice`] is that
//! slice. The host implements it on top of its own function loader (or uses
//! `GlowDevice` behind the `glow` feature).

use std::num::NonZeroU32;

use bitflags::bitflags;
use thiserror::Error;

/// GL framebuffer object name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub NonZeroU32);

/// GL renderbuffer object name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferId(pub NonZeroU32);

/// GL texture object name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub NonZeroU32);

impl TextureId {
    /// Raw GL name, as handed to the compositor
    pub const fn raw(self) -> u32 {
        self.0.get()
    }
}

/// Framebuffer binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferTarget {
    /// Both read and draw (`GL_FRAMEBUFFER`)
    Framebuffer,
    /// `GL_READ_FRAMEBUFFER`
    Read,
    /// `GL_DRAW_FRAMEBUFFER`
    Draw,
}

/// Texture sampling used by blits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
}

/// Dimensionality of a color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorAttachmentKind {
    /// `GL_TEXTURE_2D_MULTISAMPLE`
    Multisample,
    /// `GL_TEXTURE_2D`
    SingleSample,
}

/// Pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left edge
    pub x: u32,
    /// Bottom edge
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect {
    /// Rectangle anchored at the origin
    pub const fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

bitflags! {
    /// Global capability toggles shared by everything that draws on the context
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderStateFlags: u32 {
        /// `GL_BLEND`
        const BLEND = 1 << 0;
        /// `GL_DEPTH_TEST`
        const DEPTH_TEST = 1 << 1;
        /// `GL_CULL_FACE`
        const CULL_FACE = 1 << 2;
        /// `GL_MULTISAMPLE`
        const MULTISAMPLE = 1 << 3;
    }
}

/// GL object errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GlError {
    /// The driver refused to create an object
    #[error("Failed to create {kind}: {reason}")]
    CreateFailed {
        /// Object kind
        kind: &'static str,
        /// Driver message
        reason: String,
    },
}

/// Result type for GL object creation
pub type GlResult<T> = Result<T, GlError>;

/// The GL calls the bridge issues
///
/// Storage and attachment calls act on the object passed in and on whatever
/// framebuffer is bound to [`FramebufferTarget::Framebuffer`], matching the
/// bind-then-modify model of the underlying API.
pub trait GlDevice {
    /// Whether multisample depth/color render targets are available
    fn supports_multisample_targets(&self) -> bool;

    /// Generate a framebuffer object
    fn create_framebuffer(&mut self) -> GlResult<FramebufferId>;

    /// Generate a renderbuffer object
    fn create_renderbuffer(&mut self) -> GlResult<RenderbufferId>;

    /// Generate a texture object
    fn create_texture(&mut self) -> GlResult<TextureId>;

    /// Delete a framebuffer object
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Delete a renderbuffer object
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId);

    /// Delete a texture object
    fn delete_texture(&mut self, texture: TextureId);

    /// Bind a framebuffer, or the default framebuffer for `None`
    fn bind_framebuffer(&mut self, target: FramebufferTarget, framebuffer: Option<FramebufferId>);

    /// Allocate multisample depth storage for a renderbuffer
    fn multisample_depth_storage(&mut self, renderbuffer: RenderbufferId, samples: u32, width: u32, height: u32);

    /// Allocate multisample RGBA8 storage (fixed sample locations) for a texture
    fn multisample_color_storage(&mut self, texture: TextureId, samples: u32, width: u32, height: u32);

    /// Allocate single-sample RGBA8 storage with linear min filter and one mip level
    fn resolve_color_storage(&mut self, texture: TextureId, width: u32, height: u32);

    /// Attach a renderbuffer as depth of the bound framebuffer
    fn attach_depth_renderbuffer(&mut self, renderbuffer: RenderbufferId);

    /// Attach a texture as color attachment 0 of the bound framebuffer
    fn attach_color_texture(&mut self, texture: TextureId, kind: ColorAttachmentKind);

    /// Completeness of the bound framebuffer
    fn framebuffer_complete(&mut self) -> bool;

    /// Blit the color buffer from the read binding to the draw binding
    fn blit_color(&mut self, src: Rect, dst: Rect, filter: TextureFilter);

    /// Set the viewport
    fn viewport(&mut self, rect: Rect);

    /// Clear color and depth of the bound draw target
    fn clear(&mut self, color: [f32; 4]);

    /// Currently enabled capability toggles
    fn render_state(&self) -> RenderStateFlags;

    /// Enable exactly the given toggles, disabling the rest
    fn set_render_state(&mut self, flags: RenderStateFlags);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_state_flags_combine() {
        let flags = RenderStateFlags::DEPTH_TEST | RenderStateFlags::CULL_FACE;
        assert!(flags.contains(RenderStateFlags::DEPTH_TEST));
        assert!(!flags.contains(RenderStateFlags::MULTISAMPLE));
        assert_eq!((flags | RenderStateFlags::MULTISAMPLE) - RenderStateFlags::MULTISAMPLE, flags);
    }

    #[test]
    fn test_texture_raw_name() {
        let id = TextureId(NonZeroU32::new(7).unwrap());
        assert_eq!(id.raw(), 7);
    }
}
