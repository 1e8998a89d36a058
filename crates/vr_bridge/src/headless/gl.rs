//! In-memory `GlDevice`

use std::collections::HashMap;
use std::num::NonZeroU32;

use crate::headless::{GlCall, Trace, TraceEvent};
use crate::render::gl::{
    ColorAttachmentKind, FramebufferId, FramebufferTarget, GlDevice, GlError, GlResult, Rect,
    RenderStateFlags, RenderbufferId, TextureFilter, TextureId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Storage {
    samples: u32,
    width: u32,
    height: u32,
    multisample: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Attachments {
    depth: Option<RenderbufferId>,
    color: Option<(TextureId, ColorAttachmentKind)>,
}

#[derive(Debug, Clone, Copy)]
enum Object {
    Framebuffer(Attachments),
    Renderbuffer(Option<Storage>),
    Texture(Option<Storage>),
}

/// GL double that tracks object lifetimes, storage and bindings
///
/// Object names start at 1 and are never reused, so a stale handle can
/// always be told apart from a fresh one.
#[derive(Debug)]
pub struct HeadlessGl {
    trace: Trace,
    objects: HashMap<NonZeroU32, Object>,
    issued: u32,
    allocations: usize,
    completeness_checks: usize,
    multisample_supported: bool,
    fail_allocation_at: Option<usize>,
    fail_check_at: Option<usize>,
    draw_binding: Option<FramebufferId>,
    read_binding: Option<FramebufferId>,
    viewport: Option<Rect>,
    state: RenderStateFlags,
}

impl HeadlessGl {
    /// Device with multisample support and depth test + culling enabled
    pub fn new(trace: Trace) -> Self {
        Self {
            trace,
            objects: HashMap::new(),
            issued: 0,
            allocations: 0,
            completeness_checks: 0,
            multisample_supported: true,
            fail_allocation_at: None,
            fail_check_at: None,
            draw_binding: None,
            read_binding: None,
            viewport: None,
            state: RenderStateFlags::DEPTH_TEST | RenderStateFlags::CULL_FACE,
        }
    }

    /// Report no multisample render target support
    pub fn without_multisample_support(mut self) -> Self {
        self.multisample_supported = false;
        self
    }

    /// Fail the `index`-th object creation (0-based)
    pub fn fail_allocation(mut self, index: usize) -> Self {
        self.fail_allocation_at = Some(index);
        self
    }

    /// Report the `index`-th completeness check (0-based) as incomplete
    pub fn fail_completeness_check(mut self, index: usize) -> Self {
        self.fail_check_at = Some(index);
        self
    }

    /// Start with the given capability toggles
    pub fn with_render_state(mut self, flags: RenderStateFlags) -> Self {
        self.state = flags;
        self
    }

    /// Objects created and not yet deleted
    pub fn live_object_count(&self) -> usize {
        self.objects.len()
    }

    /// Objects created successfully over the device's lifetime
    pub const fn total_allocations(&self) -> usize {
        self.allocations
    }

    /// Whether a raw object name is currently live
    pub fn is_live(&self, name: u32) -> bool {
        NonZeroU32::new(name).is_some_and(|name| self.objects.contains_key(&name))
    }

    /// Current draw framebuffer binding
    pub const fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.draw_binding
    }

    /// Current read framebuffer binding
    pub const fn read_framebuffer(&self) -> Option<FramebufferId> {
        self.read_binding
    }

    /// Last viewport set
    pub const fn current_viewport(&self) -> Option<Rect> {
        self.viewport
    }

    fn record(&self, call: GlCall) {
        self.trace.record(TraceEvent::Gl(call));
    }

    fn allocate(&mut self, kind: &'static str, object: Object) -> GlResult<NonZeroU32> {
        let attempt = self.allocations;
        if self.fail_allocation_at == Some(attempt) {
            self.fail_allocation_at = None;
            return Err(GlError::CreateFailed { kind, reason: format!("injected failure at allocation {attempt}") });
        }
        let name = NonZeroU32::MIN.saturating_add(self.issued);
        self.issued += 1;
        self.allocations += 1;
        self.objects.insert(name, object);
        Ok(name)
    }

    fn release(&mut self, name: NonZeroU32) {
        self.objects.remove(&name);
        let id = FramebufferId(name);
        if self.draw_binding == Some(id) {
            self.draw_binding = None;
        }
        if self.read_binding == Some(id) {
            self.read_binding = None;
        }
    }

    fn set_storage(&mut self, name: NonZeroU32, storage: Storage) {
        match self.objects.get_mut(&name) {
            Some(Object::Renderbuffer(slot) | Object::Texture(slot)) => *slot = Some(storage),
            _ => log::warn!("Storage for unknown object {}", name),
        }
    }

    fn bound_attachments(&mut self) -> Option<&mut Attachments> {
        let bound = self.draw_binding?;
        match self.objects.get_mut(&bound.0) {
            Some(Object::Framebuffer(attachments)) => Some(attachments),
            _ => None,
        }
    }

    fn storage(&self, name: NonZeroU32) -> Option<Storage> {
        match self.objects.get(&name) {
            Some(Object::Renderbuffer(storage) | Object::Texture(storage)) => *storage,
            _ => None,
        }
    }

    fn is_complete(&self, framebuffer: FramebufferId) -> bool {
        let Some(Object::Framebuffer(attachments)) = self.objects.get(&framebuffer.0) else {
            return false;
        };
        let Some((texture, kind)) = attachments.color else {
            return false;
        };
        let Some(color) = self.storage(texture.0) else {
            return false;
        };
        if color.multisample != (kind == ColorAttachmentKind::Multisample) {
            return false;
        }
        match attachments.depth {
            None => true,
            Some(depth) => self.storage(depth.0).is_some_and(|depth| {
                depth.samples == color.samples && depth.width == color.width && depth.height == color.height
            }),
        }
    }
}

impl GlDevice for HeadlessGl {
    fn supports_multisample_targets(&self) -> bool {
        self.multisample_supported
    }

    fn create_framebuffer(&mut self) -> GlResult<FramebufferId> {
        let id = FramebufferId(self.allocate("framebuffer", Object::Framebuffer(Attachments::default()))?);
        self.record(GlCall::CreateFramebuffer(id));
        Ok(id)
    }

    fn create_renderbuffer(&mut self) -> GlResult<RenderbufferId> {
        let id = RenderbufferId(self.allocate("renderbuffer", Object::Renderbuffer(None))?);
        self.record(GlCall::CreateRenderbuffer(id));
        Ok(id)
    }

    fn create_texture(&mut self) -> GlResult<TextureId> {
        let id = TextureId(self.allocate("texture", Object::Texture(None))?);
        self.record(GlCall::CreateTexture(id));
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.release(framebuffer.0);
        self.record(GlCall::DeleteFramebuffer(framebuffer));
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        self.release(renderbuffer.0);
        self.record(GlCall::DeleteRenderbuffer(renderbuffer));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.release(texture.0);
        self.record(GlCall::DeleteTexture(texture));
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget, framebuffer: Option<FramebufferId>) {
        match target {
            FramebufferTarget::Framebuffer => {
                self.draw_binding = framebuffer;
                self.read_binding = framebuffer;
            }
            FramebufferTarget::Read => self.read_binding = framebuffer,
            FramebufferTarget::Draw => self.draw_binding = framebuffer,
        }
        self.record(GlCall::BindFramebuffer { target, framebuffer });
    }

    fn multisample_depth_storage(&mut self, renderbuffer: RenderbufferId, samples: u32, width: u32, height: u32) {
        self.set_storage(renderbuffer.0, Storage { samples, width, height, multisample: true });
    }

    fn multisample_color_storage(&mut self, texture: TextureId, samples: u32, width: u32, height: u32) {
        self.set_storage(texture.0, Storage { samples, width, height, multisample: true });
    }

    fn resolve_color_storage(&mut self, texture: TextureId, width: u32, height: u32) {
        self.set_storage(texture.0, Storage { samples: 0, width, height, multisample: false });
    }

    fn attach_depth_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        if let Some(attachments) = self.bound_attachments() {
            attachments.depth = Some(renderbuffer);
        }
    }

    fn attach_color_texture(&mut self, texture: TextureId, kind: ColorAttachmentKind) {
        if let Some(attachments) = self.bound_attachments() {
            attachments.color = Some((texture, kind));
        }
    }

    fn framebuffer_complete(&mut self) -> bool {
        let check = self.completeness_checks;
        self.completeness_checks += 1;
        if self.fail_check_at == Some(check) {
            return false;
        }
        self.draw_binding.map_or(true, |framebuffer| self.is_complete(framebuffer))
    }

    fn blit_color(&mut self, src: Rect, dst: Rect, filter: TextureFilter) {
        self.record(GlCall::Blit { read: self.read_binding, draw: self.draw_binding, src, dst, filter });
    }

    fn viewport(&mut self, rect: Rect) {
        self.viewport = Some(rect);
        self.record(GlCall::Viewport(rect));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.record(GlCall::Clear(color));
    }

    fn render_state(&self) -> RenderStateFlags {
        self.state
    }

    fn set_render_state(&mut self, flags: RenderStateFlags) {
        self.state = flags;
        self.record(GlCall::SetRenderState(flags));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_never_reused() {
        let mut gl = HeadlessGl::new(Trace::default());
        let first = gl.create_texture().unwrap();
        gl.delete_texture(first);
        let second = gl.create_texture().unwrap();

        assert_ne!(first, second);
        assert!(!gl.is_live(first.raw()));
        assert!(gl.is_live(second.raw()));
        assert!(!gl.is_live(0));
    }

    #[test]
    fn test_injected_allocation_failure_fires_once() {
        let mut gl = HeadlessGl::new(Trace::default()).fail_allocation(1);
        assert!(gl.create_framebuffer().is_ok());
        assert!(gl.create_renderbuffer().is_err());
        assert!(gl.create_renderbuffer().is_ok());
        assert_eq!(gl.total_allocations(), 2);
    }

    #[test]
    fn test_framebuffer_without_color_is_incomplete() {
        let mut gl = HeadlessGl::new(Trace::default());
        let fb = gl.create_framebuffer().unwrap();
        gl.bind_framebuffer(FramebufferTarget::Framebuffer, Some(fb));
        assert!(!gl.framebuffer_complete());

        let tex = gl.create_texture().unwrap();
        gl.resolve_color_storage(tex, 16, 16);
        gl.attach_color_texture(tex, ColorAttachmentKind::SingleSample);
        assert!(gl.framebuffer_complete());
    }

    #[test]
    fn test_attachment_kind_must_match_storage() {
        let mut gl = HeadlessGl::new(Trace::default());
        let fb = gl.create_framebuffer().unwrap();
        gl.bind_framebuffer(FramebufferTarget::Framebuffer, Some(fb));
        let tex = gl.create_texture().unwrap();
        gl.resolve_color_storage(tex, 16, 16);
        gl.attach_color_texture(tex, ColorAttachmentKind::Multisample);
        assert!(!gl.framebuffer_complete());
    }

    #[test]
    fn test_deleting_bound_framebuffer_unbinds_it() {
        let mut gl = HeadlessGl::new(Trace::default());
        let fb = gl.create_framebuffer().unwrap();
        gl.bind_framebuffer(FramebufferTarget::Framebuffer, Some(fb));
        gl.delete_framebuffer(fb);
        assert_eq!(gl.bound_framebuffer(), None);
        assert_eq!(gl.read_framebuffer(), None);
    }

    #[test]
    fn test_render_state_round_trips() {
        let trace = Trace::default();
        let mut gl = HeadlessGl::new(trace.clone()).with_render_state(RenderStateFlags::BLEND);
        assert_eq!(gl.render_state(), RenderStateFlags::BLEND);

        gl.set_render_state(RenderStateFlags::MULTISAMPLE);
        assert_eq!(gl.render_state(), RenderStateFlags::MULTISAMPLE);
        assert_eq!(trace.events(), vec![TraceEvent::Gl(GlCall::SetRenderState(RenderStateFlags::MULTISAMPLE))]);
    }
}
