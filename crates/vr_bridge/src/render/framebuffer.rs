//! Per-eye framebuffer management
//!
//! Each eye renders into a multisample draw target (depth renderbuffer +
//! multisample color texture) which is then resolved into a single-sample
//! texture the compositor can sample. Both eyes are created together and torn
//! down together; a failed create never leaves objects behind.

use log::{debug, warn};
use thiserror::Error;

use crate::render::gl::{
    ColorAttachmentKind, FramebufferId, FramebufferTarget, GlDevice, GlError, Rect,
    RenderbufferId, TextureFilter, TextureId,
};
use crate::runtime::Eye;

/// Framebuffer creation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramebufferError {
    /// The device cannot allocate multisample depth/color targets
    #[error("Multisample render targets are not supported by this device")]
    MultisampleUnsupported,

    /// Requested dimensions are empty
    #[error("Invalid render target size {width}x{height}")]
    InvalidSize {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Targets already exist; destroy them first
    #[error("Eye render targets are already allocated")]
    AlreadyAllocated,

    /// A target object failed the completeness check
    #[error("Incomplete {target} framebuffer for {eye} eye")]
    Incomplete {
        /// Eye being built
        eye: Eye,
        /// Which of the two framebuffers
        target: &'static str,
    },

    /// Object creation failed
    #[error("GL error: {0}")]
    Gl(#[from] GlError),
}

/// GPU objects backing one eye
///
/// Every name is optional so a descriptor left half-built by a failed create
/// can still be destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EyeFramebufferDesc {
    /// Multisample depth renderbuffer
    pub depth_buffer: Option<RenderbufferId>,
    /// Multisample color texture
    pub render_texture: Option<TextureId>,
    /// Draw framebuffer holding the two attachments above
    pub render_framebuffer: Option<FramebufferId>,
    /// Single-sample color texture handed to the compositor
    pub resolve_texture: Option<TextureId>,
    /// Framebuffer wrapping the resolve texture
    pub resolve_framebuffer: Option<FramebufferId>,
}

impl EyeFramebufferDesc {
    /// Whether every object is present
    pub const fn is_populated(&self) -> bool {
        self.depth_buffer.is_some()
            && self.render_texture.is_some()
            && self.render_framebuffer.is_some()
            && self.resolve_texture.is_some()
            && self.resolve_framebuffer.is_some()
    }

    /// Release whatever objects this descriptor holds
    pub fn destroy<G: GlDevice + ?Sized>(&mut self, gl: &mut G) {
        if let Some(depth) = self.depth_buffer.take() {
            gl.delete_renderbuffer(depth);
        }
        if let Some(texture) = self.render_texture.take() {
            gl.delete_texture(texture);
        }
        if let Some(framebuffer) = self.render_framebuffer.take() {
            gl.delete_framebuffer(framebuffer);
        }
        if let Some(texture) = self.resolve_texture.take() {
            gl.delete_texture(texture);
        }
        if let Some(framebuffer) = self.resolve_framebuffer.take() {
            gl.delete_framebuffer(framebuffer);
        }
    }
}

/// The pair of eye targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeTargets {
    /// Width of each eye target
    pub width: u32,
    /// Height of each eye target
    pub height: u32,
    eyes: [EyeFramebufferDesc; 2],
}

impl EyeTargets {
    /// Descriptor for one eye
    pub const fn eye(&self, eye: Eye) -> &EyeFramebufferDesc {
        &self.eyes[eye.index()]
    }

    /// Full-target rectangle
    pub const fn rect(&self) -> Rect {
        Rect::full(self.width, self.height)
    }
}

/// Owner of the two per-eye target pairs
#[derive(Debug)]
pub struct FramebufferPool {
    samples: u32,
    targets: Option<EyeTargets>,
}

impl FramebufferPool {
    /// Pool producing targets with the given MSAA sample count
    pub const fn new(samples: u32) -> Self {
        Self { samples, targets: None }
    }

    /// Sample count used for the next create
    pub const fn samples(&self) -> u32 {
        self.samples
    }

    /// Change the sample count; takes effect on the next create
    pub fn set_samples(&mut self, samples: u32) {
        self.samples = samples;
    }

    /// Allocated targets, if any
    pub const fn targets(&self) -> Option<&EyeTargets> {
        self.targets.as_ref()
    }

    /// Whether both eye targets exist
    pub const fn is_allocated(&self) -> bool {
        self.targets.is_some()
    }

    /// Create both eye targets at `width` x `height`
    ///
    /// Either both eyes end up complete or every object created here is
    /// deleted again before the error is returned.
    pub fn create_eye_targets<G: GlDevice + ?Sized>(
        &mut self,
        gl: &mut G,
        width: u32,
        height: u32,
    ) -> Result<(), FramebufferError> {
        if self.targets.is_some() {
            return Err(FramebufferError::AlreadyAllocated);
        }
        if !gl.supports_multisample_targets() {
            return Err(FramebufferError::MultisampleUnsupported);
        }
        if width == 0 || height == 0 {
            return Err(FramebufferError::InvalidSize { width, height });
        }

        let mut eyes = [EyeFramebufferDesc::default(); 2];
        let result = Eye::BOTH
            .iter()
            .try_for_each(|&eye| build_eye(gl, &mut eyes[eye.index()], eye, self.samples, width, height));

        gl.bind_framebuffer(FramebufferTarget::Framebuffer, None);

        if let Err(err) = result {
            warn!("Eye render target creation failed, releasing partial objects: {}", err);
            for desc in &mut eyes {
                desc.destroy(gl);
            }
            return Err(err);
        }

        debug!("Created eye render targets {}x{} ({}x MSAA)", width, height, self.samples);
        self.targets = Some(EyeTargets { width, height, eyes });
        Ok(())
    }

    /// Bind an eye's multisample draw target; returns its rectangle
    pub fn bind_eye<G: GlDevice + ?Sized>(&self, gl: &mut G, eye: Eye) -> Option<Rect> {
        let targets = self.targets.as_ref()?;
        gl.bind_framebuffer(FramebufferTarget::Framebuffer, targets.eye(eye).render_framebuffer);
        Some(targets.rect())
    }

    /// Blit an eye's multisample color into its resolve texture
    pub fn resolve<G: GlDevice + ?Sized>(&self, gl: &mut G, eye: Eye) {
        let Some(targets) = self.targets.as_ref() else {
            return;
        };
        let desc = targets.eye(eye);
        let rect = targets.rect();

        gl.bind_framebuffer(FramebufferTarget::Read, desc.render_framebuffer);
        gl.bind_framebuffer(FramebufferTarget::Draw, desc.resolve_framebuffer);
        gl.blit_color(rect, rect, TextureFilter::Linear);
        gl.bind_framebuffer(FramebufferTarget::Read, None);
        gl.bind_framebuffer(FramebufferTarget::Draw, None);
    }

    /// Resolve texture of an eye, for submission
    pub fn resolve_texture(&self, eye: Eye) -> Option<TextureId> {
        self.targets.as_ref().and_then(|targets| targets.eye(eye).resolve_texture)
    }

    /// Release both eyes' objects
    pub fn destroy_all<G: GlDevice + ?Sized>(&mut self, gl: &mut G) {
        if let Some(mut targets) = self.targets.take() {
            for desc in &mut targets.eyes {
                desc.destroy(gl);
            }
            debug!("Destroyed eye render targets");
        }
    }
}

fn build_eye<G: GlDevice + ?Sized>(
    gl: &mut G,
    desc: &mut EyeFramebufferDesc,
    eye: Eye,
    samples: u32,
    width: u32,
    height: u32,
) -> Result<(), FramebufferError> {
    // Multisample draw target
    let render_framebuffer = gl.create_framebuffer()?;
    desc.render_framebuffer = Some(render_framebuffer);
    gl.bind_framebuffer(FramebufferTarget::Framebuffer, Some(render_framebuffer));

    let depth = gl.create_renderbuffer()?;
    desc.depth_buffer = Some(depth);
    gl.multisample_depth_storage(depth, samples, width, height);
    gl.attach_depth_renderbuffer(depth);

    let color = gl.create_texture()?;
    desc.render_texture = Some(color);
    gl.multisample_color_storage(color, samples, width, height);
    gl.attach_color_texture(color, ColorAttachmentKind::Multisample);

    // Single-sample resolve target
    let resolve_framebuffer = gl.create_framebuffer()?;
    desc.resolve_framebuffer = Some(resolve_framebuffer);
    gl.bind_framebuffer(FramebufferTarget::Framebuffer, Some(resolve_framebuffer));

    let resolve = gl.create_texture()?;
    desc.resolve_texture = Some(resolve);
    gl.resolve_color_storage(resolve, width, height);
    gl.attach_color_texture(resolve, ColorAttachmentKind::SingleSample);

    gl.bind_framebuffer(FramebufferTarget::Framebuffer, Some(render_framebuffer));
    if !gl.framebuffer_complete() {
        return Err(FramebufferError::Incomplete { eye, target: "draw" });
    }
    gl.bind_framebuffer(FramebufferTarget::Framebuffer, Some(resolve_framebuffer));
    if !gl.framebuffer_complete() {
        return Err(FramebufferError::Incomplete { eye, target: "resolve" });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GlCall, HeadlessGl, Trace, TraceEvent};

    fn gl() -> HeadlessGl {
        HeadlessGl::new(Trace::default())
    }

    #[test]
    fn test_create_builds_two_complete_pairs() {
        let mut gl = gl();
        let mut pool = FramebufferPool::new(4);
        pool.create_eye_targets(&mut gl, 1512, 1680).unwrap();

        let targets = pool.targets().unwrap();
        assert_eq!((targets.width, targets.height), (1512, 1680));
        for eye in Eye::BOTH {
            assert!(targets.eye(eye).is_populated());
        }
        assert_ne!(targets.eye(Eye::Left), targets.eye(Eye::Right));
        // 2 framebuffers + 1 renderbuffer + 2 textures per eye
        assert_eq!(gl.live_object_count(), 10);
        assert_eq!(gl.bound_framebuffer(), None);
    }

    #[test]
    fn test_missing_multisample_support_allocates_nothing() {
        let mut gl = gl().without_multisample_support();
        let mut pool = FramebufferPool::new(4);

        let err = pool.create_eye_targets(&mut gl, 100, 100).unwrap_err();
        assert_eq!(err, FramebufferError::MultisampleUnsupported);
        assert_eq!(gl.total_allocations(), 0);
        assert!(!pool.is_allocated());
    }

    #[test]
    fn test_zero_size_is_rejected_before_allocation() {
        let mut gl = gl();
        let mut pool = FramebufferPool::new(4);
        assert!(matches!(
            pool.create_eye_targets(&mut gl, 0, 10),
            Err(FramebufferError::InvalidSize { width: 0, height: 10 })
        ));
        assert_eq!(gl.total_allocations(), 0);
    }

    #[test]
    fn test_incomplete_second_eye_leaks_nothing() {
        // Checks 0 and 1 belong to the left eye; 2 is the right eye's draw target
        let mut gl = gl().fail_completeness_check(2);
        let mut pool = FramebufferPool::new(4);

        let err = pool.create_eye_targets(&mut gl, 640, 480).unwrap_err();
        assert_eq!(err, FramebufferError::Incomplete { eye: Eye::Right, target: "draw" });
        assert!(gl.total_allocations() > 5);
        assert_eq!(gl.live_object_count(), 0);
        assert!(!pool.is_allocated());
    }

    #[test]
    fn test_allocation_failure_at_any_point_leaks_nothing() {
        for fail_at in 0..10 {
            let mut gl = gl().fail_allocation(fail_at);
            let mut pool = FramebufferPool::new(4);

            let err = pool.create_eye_targets(&mut gl, 320, 200).unwrap_err();
            assert!(matches!(err, FramebufferError::Gl(_)), "fail_at {fail_at}: {err:?}");
            assert_eq!(gl.live_object_count(), 0, "leak when failing allocation {fail_at}");
        }
    }

    #[test]
    fn test_mismatched_samples_fail_completeness() {
        let mut gl = gl();
        let mut pool = FramebufferPool::new(4);
        pool.create_eye_targets(&mut gl, 64, 64).unwrap();

        // Depth at 4 samples, color forced to 2: incomplete
        let targets = *pool.targets().unwrap();
        let desc = targets.eye(Eye::Left);
        gl.bind_framebuffer(FramebufferTarget::Framebuffer, desc.render_framebuffer);
        gl.multisample_color_storage(desc.render_texture.unwrap(), 2, 64, 64);
        assert!(!gl.framebuffer_complete());
    }

    #[test]
    fn test_double_create_is_refused() {
        let mut gl = gl();
        let mut pool = FramebufferPool::new(4);
        pool.create_eye_targets(&mut gl, 64, 64).unwrap();
        let before = gl.total_allocations();

        assert_eq!(pool.create_eye_targets(&mut gl, 64, 64), Err(FramebufferError::AlreadyAllocated));
        assert_eq!(gl.total_allocations(), before);
    }

    #[test]
    fn test_resolve_blits_full_rect_linearly() {
        let trace = Trace::default();
        let mut gl = HeadlessGl::new(trace.clone());
        let mut pool = FramebufferPool::new(4);
        pool.create_eye_targets(&mut gl, 800, 600).unwrap();
        let desc = *pool.targets().unwrap().eye(Eye::Right);
        trace.clear();

        pool.resolve(&mut gl, Eye::Right);

        let blit = trace
            .events()
            .into_iter()
            .find_map(|event| match event {
                TraceEvent::Gl(GlCall::Blit { read, draw, src, dst, filter }) => Some((read, draw, src, dst, filter)),
                _ => None,
            })
            .expect("resolve blits");
        assert_eq!(blit.0, desc.render_framebuffer);
        assert_eq!(blit.1, desc.resolve_framebuffer);
        assert_eq!(blit.2, Rect::full(800, 600));
        assert_eq!(blit.3, Rect::full(800, 600));
        assert_eq!(blit.4, TextureFilter::Linear);
        assert_eq!(gl.read_framebuffer(), None);
        assert_eq!(gl.bound_framebuffer(), None);
    }

    #[test]
    fn test_destroy_partial_descriptor() {
        let mut gl = gl();
        let mut desc = EyeFramebufferDesc {
            render_framebuffer: Some(gl.create_framebuffer().unwrap()),
            depth_buffer: Some(gl.create_renderbuffer().unwrap()),
            ..EyeFramebufferDesc::default()
        };
        assert!(!desc.is_populated());

        desc.destroy(&mut gl);
        assert_eq!(desc, EyeFramebufferDesc::default());
        assert_eq!(gl.live_object_count(), 0);

        // A second destroy is a no-op
        desc.destroy(&mut gl);
        assert_eq!(gl.live_object_count(), 0);
    }

    #[test]
    fn test_destroy_all_releases_everything() {
        let mut gl = gl();
        let mut pool = FramebufferPool::new(4);
        pool.create_eye_targets(&mut gl, 64, 64).unwrap();

        pool.destroy_all(&mut gl);
        assert!(!pool.is_allocated());
        assert_eq!(gl.live_object_count(), 0);
        assert_eq!(pool.resolve_texture(Eye::Left), None);
    }
}
