//! Compositor submission

use log::warn;

use crate::render::framebuffer::FramebufferPool;
use crate::runtime::{
    ColorSpace, Eye, SubmitFlags, SubmitTexture, TextureBounds, TextureType, VrCompositor,
};

/// Hands each eye's resolve texture to the compositor
pub struct CompositorSubmitter;

impl CompositorSubmitter {
    /// Submit both eyes; returns how many submissions the compositor accepted.
    ///
    /// A rejected eye is logged and does not stop the other one.
    pub fn submit(compositor: &dyn VrCompositor, framebuffers: &FramebufferPool) -> usize {
        let mut accepted = 0;
        for eye in Eye::BOTH {
            let Some(texture) = framebuffers.resolve_texture(eye) else {
                continue;
            };
            let texture = SubmitTexture {
                handle: texture.raw(),
                texture_type: TextureType::OpenGl,
                color_space: ColorSpace::Auto,
            };
            match compositor.submit(eye, &texture, &TextureBounds::FULL, SubmitFlags::Default) {
                Ok(()) => accepted += 1,
                Err(err) => warn!("[VR] Compositor rejected {} eye: {}", eye, err),
            }
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessGl, Trace};
    use crate::runtime::{CompositorError, TrackedDevicePose};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingCompositor {
        submits: RefCell<Vec<(Eye, SubmitTexture, TextureBounds)>>,
        reject: Option<Eye>,
    }

    impl VrCompositor for RecordingCompositor {
        fn wait_get_poses(&self, _render_poses: &mut [TrackedDevicePose]) -> Result<(), CompositorError> {
            Ok(())
        }

        fn submit(
            &self,
            eye: Eye,
            texture: &SubmitTexture,
            bounds: &TextureBounds,
            _flags: SubmitFlags,
        ) -> Result<(), CompositorError> {
            self.submits.borrow_mut().push((eye, *texture, *bounds));
            if self.reject == Some(eye) {
                Err(CompositorError::DoNotHaveFocus)
            } else {
                Ok(())
            }
        }
    }

    fn allocated_pool(gl: &mut HeadlessGl) -> FramebufferPool {
        let mut pool = FramebufferPool::new(4);
        pool.create_eye_targets(gl, 64, 64).unwrap();
        pool
    }

    #[test]
    fn test_submits_each_eye_once_with_fixed_tags() {
        let mut gl = HeadlessGl::new(Trace::default());
        let pool = allocated_pool(&mut gl);
        let compositor = RecordingCompositor::default();

        assert_eq!(CompositorSubmitter::submit(&compositor, &pool), 2);

        let submits = compositor.submits.borrow();
        assert_eq!(submits.len(), 2);
        for (eye, texture, bounds) in submits.iter() {
            assert_eq!(Some(texture.handle), pool.resolve_texture(*eye).map(|t| t.raw()));
            assert_eq!(texture.texture_type, TextureType::OpenGl);
            assert_eq!(texture.color_space, ColorSpace::Auto);
            assert_eq!(*bounds, TextureBounds::FULL);
        }
        assert_eq!(submits[0].0, Eye::Left);
        assert_eq!(submits[1].0, Eye::Right);
    }

    #[test]
    fn test_rejected_eye_does_not_block_the_other() {
        let mut gl = HeadlessGl::new(Trace::default());
        let pool = allocated_pool(&mut gl);
        let compositor = RecordingCompositor { reject: Some(Eye::Left), ..Default::default() };

        assert_eq!(CompositorSubmitter::submit(&compositor, &pool), 1);
        assert_eq!(compositor.submits.borrow().len(), 2);
    }

    #[test]
    fn test_nothing_submitted_without_targets() {
        let pool = FramebufferPool::new(4);
        let compositor = RecordingCompositor::default();
        assert_eq!(CompositorSubmitter::submit(&compositor, &pool), 0);
        assert!(compositor.submits.borrow().is_empty());
    }
}
