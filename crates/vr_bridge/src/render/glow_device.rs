//! `GlDevice` on top of a `glow` context

#![allow(unsafe_code)]

use glow::HasContext;

use crate::render::gl::{
    ColorAttachmentKind, FramebufferId, FramebufferTarget, GlDevice, GlError, GlResult, Rect,
    RenderStateFlags, RenderbufferId, TextureFilter, TextureId,
};

const STATE_CAPS: [(RenderStateFlags, u32); 4] = [
    (RenderStateFlags::BLEND, glow::BLEND),
    (RenderStateFlags::DEPTH_TEST, glow::DEPTH_TEST),
    (RenderStateFlags::CULL_FACE, glow::CULL_FACE),
    (RenderStateFlags::MULTISAMPLE, glow::MULTISAMPLE),
];

/// GL device backed by a `glow::Context`
///
/// All calls must happen on the thread that owns the context; the caller
/// guarantees the context is current.
pub struct GlowDevice {
    gl: glow::Context,
}

impl GlowDevice {
    /// Wrap a context
    pub fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    /// The wrapped context, for the host's own drawing
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

fn gl_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

const fn target(target: FramebufferTarget) -> u32 {
    match target {
        FramebufferTarget::Framebuffer => glow::FRAMEBUFFER,
        FramebufferTarget::Read => glow::READ_FRAMEBUFFER,
        FramebufferTarget::Draw => glow::DRAW_FRAMEBUFFER,
    }
}

const fn framebuffer(id: FramebufferId) -> glow::NativeFramebuffer {
    glow::NativeFramebuffer(id.0)
}

const fn renderbuffer(id: RenderbufferId) -> glow::NativeRenderbuffer {
    glow::NativeRenderbuffer(id.0)
}

const fn texture(id: TextureId) -> glow::NativeTexture {
    glow::NativeTexture(id.0)
}

impl GlDevice for GlowDevice {
    fn supports_multisample_targets(&self) -> bool {
        let version = self.gl.version();
        (!version.is_embedded && (version.major, version.minor) >= (3, 2))
            || self.gl.supported_extensions().contains("GL_ARB_texture_multisample")
    }

    fn create_framebuffer(&mut self) -> GlResult<FramebufferId> {
        let fb = unsafe { self.gl.create_framebuffer() }
            .map_err(|reason| GlError::CreateFailed { kind: "framebuffer", reason })?;
        Ok(FramebufferId(fb.0))
    }

    fn create_renderbuffer(&mut self) -> GlResult<RenderbufferId> {
        let rb = unsafe { self.gl.create_renderbuffer() }
            .map_err(|reason| GlError::CreateFailed { kind: "renderbuffer", reason })?;
        Ok(RenderbufferId(rb.0))
    }

    fn create_texture(&mut self) -> GlResult<TextureId> {
        let tex = unsafe { self.gl.create_texture() }
            .map_err(|reason| GlError::CreateFailed { kind: "texture", reason })?;
        Ok(TextureId(tex.0))
    }

    fn delete_framebuffer(&mut self, id: FramebufferId) {
        unsafe { self.gl.delete_framebuffer(framebuffer(id)) };
    }

    fn delete_renderbuffer(&mut self, id: RenderbufferId) {
        unsafe { self.gl.delete_renderbuffer(renderbuffer(id)) };
    }

    fn delete_texture(&mut self, id: TextureId) {
        unsafe { self.gl.delete_texture(texture(id)) };
    }

    fn bind_framebuffer(&mut self, binding: FramebufferTarget, id: Option<FramebufferId>) {
        unsafe { self.gl.bind_framebuffer(target(binding), id.map(framebuffer)) };
    }

    fn multisample_depth_storage(&mut self, id: RenderbufferId, samples: u32, width: u32, height: u32) {
        unsafe {
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer(id)));
            self.gl.renderbuffer_storage_multisample(
                glow::RENDERBUFFER,
                gl_int(samples),
                glow::DEPTH_COMPONENT,
                gl_int(width),
                gl_int(height),
            );
        }
    }

    fn multisample_color_storage(&mut self, id: TextureId, samples: u32, width: u32, height: u32) {
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D_MULTISAMPLE, Some(texture(id)));
            self.gl.tex_image_2d_multisample(
                glow::TEXTURE_2D_MULTISAMPLE,
                gl_int(samples),
                gl_int(glow::RGBA8),
                gl_int(width),
                gl_int(height),
                true,
            );
        }
    }

    fn resolve_color_storage(&mut self, id: TextureId, width: u32, height: u32) {
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture(id)));
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, gl_int(glow::LINEAR));
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAX_LEVEL, 0);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                gl_int(glow::RGBA8),
                gl_int(width),
                gl_int(height),
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                None,
            );
        }
    }

    fn attach_depth_renderbuffer(&mut self, id: RenderbufferId) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::RENDERBUFFER,
                Some(renderbuffer(id)),
            );
        }
    }

    fn attach_color_texture(&mut self, id: TextureId, kind: ColorAttachmentKind) {
        let texture_target = match kind {
            ColorAttachmentKind::Multisample => glow::TEXTURE_2D_MULTISAMPLE,
            ColorAttachmentKind::SingleSample => glow::TEXTURE_2D,
        };
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                texture_target,
                Some(texture(id)),
                0,
            );
        }
    }

    fn framebuffer_complete(&mut self) -> bool {
        unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE }
    }

    fn blit_color(&mut self, src: Rect, dst: Rect, filter: TextureFilter) {
        let filter = match filter {
            TextureFilter::Nearest => glow::NEAREST,
            TextureFilter::Linear => glow::LINEAR,
        };
        unsafe {
            self.gl.blit_framebuffer(
                gl_int(src.x),
                gl_int(src.y),
                gl_int(src.x + src.width),
                gl_int(src.y + src.height),
                gl_int(dst.x),
                gl_int(dst.y),
                gl_int(dst.x + dst.width),
                gl_int(dst.y + dst.height),
                glow::COLOR_BUFFER_BIT,
                filter,
            );
        }
    }

    fn viewport(&mut self, rect: Rect) {
        unsafe {
            self.gl.viewport(gl_int(rect.x), gl_int(rect.y), gl_int(rect.width), gl_int(rect.height));
        }
    }

    fn clear(&mut self, color: [f32; 4]) {
        unsafe {
            self.gl.clear_color(color[0], color[1], color[2], color[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
    }

    fn render_state(&self) -> RenderStateFlags {
        STATE_CAPS
            .iter()
            .filter(|(_, cap)| unsafe { self.gl.is_enabled(*cap) })
            .fold(RenderStateFlags::empty(), |flags, (flag, _)| flags | *flag)
    }

    fn set_render_state(&mut self, flags: RenderStateFlags) {
        for (flag, cap) in STATE_CAPS {
            unsafe {
                if flags.contains(flag) {
                    self.gl.enable(cap);
                } else {
                    self.gl.disable(cap);
                }
            }
        }
    }
}
