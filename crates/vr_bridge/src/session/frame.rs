//! Per-frame stereo rendering

use std::time::Duration;

use log::{trace, warn};
use thiserror::Error;

use crate::foundation::math::Vec3;
use crate::render::gl::{FramebufferTarget, GlDevice, Rect, RenderStateFlags};
use crate::render::view::{ViewError, ViewFrame};
use crate::runtime::{Eye, VrRuntime};
use crate::session::interfaces::InterfaceError;
use crate::session::VrSession;

/// Clear color of each eye target before the scene draws
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Frame errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A runtime interface could not be resolved
    #[error("Interface error: {0}")]
    Interface(#[from] InterfaceError),

    /// An eye's transforms could not be built
    #[error("View error: {0}")]
    View(#[from] ViewError),
}

/// What the scene renderer gets for one eye
#[derive(Debug, Clone, Copy)]
pub struct EyeView<'a> {
    /// Eye being drawn
    pub eye: Eye,
    /// Matrices to load before drawing
    pub frame: &'a ViewFrame,
    /// Target rectangle, already set as the viewport
    pub viewport: Rect,
}

/// The host's scene drawing entry point
///
/// Called once per eye with that eye's draw target bound; draws the current
/// scene with the supplied matrices.
pub trait SceneRenderer<G: GlDevice + ?Sized> {
    /// Draw the scene for one eye
    fn draw(&mut self, gl: &mut G, view: &EyeView<'_>);
}

impl<G, F> SceneRenderer<G> for F
where
    G: GlDevice + ?Sized,
    F: FnMut(&mut G, &EyeView<'_>),
{
    fn draw(&mut self, gl: &mut G, view: &EyeView<'_>) {
        self(gl, view);
    }
}

/// Summary of one rendered frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Eyes the scene renderer drew
    pub eyes_drawn: usize,
    /// Eyes skipped for a singular transform
    pub skipped_eyes: Vec<Eye>,
    /// Runtime events drained after the pose wait
    pub events_drained: usize,
    /// Time blocked in the pose wait
    pub pose_wait: Duration,
    /// Eye textures the compositor accepted
    pub submitted: usize,
}

impl<R: VrRuntime, G: GlDevice> VrSession<R, G> {
    /// Render and submit one stereo frame
    ///
    /// Returns an empty report while inactive. An eye whose transforms are
    /// singular is cleared and submitted black instead of drawn.
    pub fn render_frame<S>(&mut self, scene: &mut S, player_origin: Vec3) -> Result<FrameReport, FrameError>
    where
        S: SceneRenderer<G> + ?Sized,
    {
        let Some(update) = self.update_poses()? else {
            return Ok(FrameReport::default());
        };
        let mut report = FrameReport {
            events_drained: update.events_drained,
            pose_wait: update.wait,
            ..FrameReport::default()
        };

        for eye in Eye::BOTH {
            let saved = self.gl.render_state();
            self.gl.set_render_state(saved | RenderStateFlags::MULTISAMPLE);

            if let Some(viewport) = self.framebuffers.bind_eye(&mut self.gl, eye) {
                self.gl.viewport(viewport);
                self.gl.clear(CLEAR_COLOR);

                match self.build_eye_transforms(eye, player_origin) {
                    Ok(frame) => {
                        scene.draw(&mut self.gl, &EyeView { eye, frame: &frame, viewport });
                        report.eyes_drawn += 1;
                    }
                    Err(FrameError::View(err)) => {
                        warn!("[VR] {}, skipping draw", err);
                        report.skipped_eyes.push(eye);
                    }
                    Err(err) => {
                        self.gl.bind_framebuffer(FramebufferTarget::Framebuffer, None);
                        self.gl.set_render_state(saved);
                        return Err(err);
                    }
                }

                self.gl.bind_framebuffer(FramebufferTarget::Framebuffer, None);
                self.gl.set_render_state(saved - RenderStateFlags::MULTISAMPLE);
                self.framebuffers.resolve(&mut self.gl, eye);
            }

            self.gl.set_render_state(saved);
        }

        report.submitted = self.submit()?;
        trace!(
            "VR frame: {} drawn, {:?} skipped, {} submitted",
            report.eyes_drawn,
            report.skipped_eyes,
            report.submitted
        );
        Ok(report)
    }
}
