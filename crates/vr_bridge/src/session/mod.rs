//! VR session context
//!
//! [`VrSession`] owns everything the bridge keeps between frames: the
//! runtime handle, the GL device, the interface cache, both eye targets and
//! the tracked poses. The host creates one, calls [`VrSession::init`] once,
//! then [`VrSession::render_frame`] every tick, and [`VrSession::shutdown`]
//! on exit.
//!
//! ```text
//! Uninitialized --enable()--> Active
//!       ^                       |
//!       +------disable()--------+
//! ```

pub mod frame;
pub mod interfaces;

use std::rc::Rc;

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::{ConfigError, VrSettings};
use crate::foundation::math::Vec3;
use crate::render::framebuffer::{FramebufferError, FramebufferPool};
use crate::render::gl::GlDevice;
use crate::render::submit::CompositorSubmitter;
use crate::render::view::{ViewFrame, ViewParams, ViewPipeline};
use crate::runtime::{ApplicationType, Eye, InitErrorCode, VrRuntime, VrSystem, SYSTEM_INTERFACE_VERSION};
use crate::tracking::{PoseTracker, PoseUpdate};

pub use frame::{EyeView, FrameError, FrameReport, SceneRenderer};
pub use interfaces::{InterfaceCache, InterfaceError};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No runtime session and no GPU objects
    #[default]
    Uninitialized,
    /// Runtime session running and both eye targets allocated
    Active,
}

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// No runtime installed or no headset attached
    #[error("VR runtime unavailable: {0}")]
    RuntimeAbsent(String),

    /// The runtime does not implement an interface version the bridge needs
    #[error("VR runtime does not support interface {interface}")]
    InterfaceVersionMismatch {
        /// Interface version string
        interface: &'static str,
    },

    /// Any other runtime init failure
    #[error("VR runtime init failed: {0}")]
    Init(String),

    /// Eye render targets could not be created
    #[error("VR resource error: {0}")]
    Resource(#[from] FramebufferError),

    /// A runtime interface could not be resolved
    #[error("VR interface error: {0}")]
    Interface(#[from] InterfaceError),

    /// Settings are out of range
    #[error("VR settings error: {0}")]
    Settings(#[from] ConfigError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// The bridge's single explicit context object
pub struct VrSession<R: VrRuntime, G: GlDevice> {
    runtime: R,
    gl: G,
    state: SessionState,
    settings: VrSettings,
    yaw_offset: f32,
    interfaces: InterfaceCache,
    framebuffers: FramebufferPool,
    poses: PoseTracker,
    pipeline: ViewPipeline,
}

impl<R: VrRuntime, G: GlDevice> VrSession<R, G> {
    /// Create an inactive session
    pub fn new(runtime: R, gl: G, settings: VrSettings) -> Self {
        Self {
            framebuffers: FramebufferPool::new(settings.msaa_samples),
            runtime,
            gl,
            state: SessionState::Uninitialized,
            settings,
            yaw_offset: 0.0,
            interfaces: InterfaceCache::new(),
            poses: PoseTracker::new(),
            pipeline: ViewPipeline::default(),
        }
    }

    /// Start the session if the settings ask for it
    ///
    /// On failure the enable toggle is switched off, exactly as if the host
    /// had flipped it and the enable attempt had failed.
    pub fn init(&mut self) -> SessionResult<()> {
        self.set_enabled(self.settings.enabled)
    }

    /// Process-lifetime teardown
    pub fn shutdown(&mut self) {
        self.disable();
    }

    /// Bring the session up; a no-op when already active
    pub fn enable(&mut self) -> SessionResult<()> {
        if self.state == SessionState::Active {
            return Ok(());
        }
        if let Err(err) = self.settings.validate() {
            warn!("[VR] Invalid VR settings: {}", err);
            return Err(err.into());
        }

        let token = self.runtime.init(ApplicationType::Scene).map_err(|code| {
            let description = self.runtime.error_description(code);
            warn!("[VR] Unable to init VR runtime: {}", description);
            match code {
                code if code.is_runtime_absent() => SessionError::RuntimeAbsent(description),
                InitErrorCode::InterfaceNotFound => {
                    SessionError::InterfaceVersionMismatch { interface: SYSTEM_INTERFACE_VERSION }
                }
                _ => SessionError::Init(description),
            }
        })?;
        self.interfaces.reset(Some(token));

        if !self.runtime.is_interface_version_valid(SYSTEM_INTERFACE_VERSION) {
            warn!("[VR] Unable to init VR runtime: {} not supported", SYSTEM_INTERFACE_VERSION);
            self.abort_enable();
            return Err(SessionError::InterfaceVersionMismatch { interface: SYSTEM_INTERFACE_VERSION });
        }

        if let Err(err) = self.create_eye_targets() {
            match &err {
                SessionError::Interface(_) => warn!("[VR] Unable to resolve VR system interface: {}", err),
                _ => warn!("[VR] Unable to create framebuffer: {}", err),
            }
            self.abort_enable();
            return Err(err);
        }

        self.state = SessionState::Active;
        if let Some(targets) = self.framebuffers.targets() {
            info!(
                "[VR] Session initialized, {}x{} per eye, {}x MSAA",
                targets.width,
                targets.height,
                self.framebuffers.samples()
            );
        }
        Ok(())
    }

    fn create_eye_targets(&mut self) -> SessionResult<()> {
        let system = self.interfaces.system(&self.runtime)?;
        let (width, height) = system.recommended_render_target_size();
        self.framebuffers.set_samples(self.settings.msaa_samples);
        self.framebuffers.create_eye_targets(&mut self.gl, width, height)?;
        Ok(())
    }

    fn abort_enable(&mut self) {
        self.runtime.shutdown();
        self.interfaces.reset(None);
    }

    /// Tear the session down; a no-op when already inactive
    pub fn disable(&mut self) {
        if self.state == SessionState::Uninitialized {
            return;
        }
        self.framebuffers.destroy_all(&mut self.gl);
        self.runtime.shutdown();
        self.interfaces.reset(None);
        self.poses.reset();
        self.state = SessionState::Uninitialized;
        info!("[VR] Session shut down");
    }

    /// Apply a change of the enable toggle
    ///
    /// A failed enable writes the toggle back to `false` before returning
    /// the error.
    pub fn set_enabled(&mut self, enabled: bool) -> SessionResult<()> {
        self.settings.enabled = enabled;
        if !enabled {
            self.disable();
            return Ok(());
        }
        if let Err(err) = self.enable() {
            debug!("Forcing VR toggle off after failed enable");
            self.settings.enabled = false;
            return Err(err);
        }
        Ok(())
    }

    /// Current lifecycle state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is active
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Current settings
    pub const fn settings(&self) -> &VrSettings {
        &self.settings
    }

    /// Set the world scale; applies from the next frame
    ///
    /// A rejected value leaves the current scale in place.
    pub fn set_world_scale(&mut self, world_scale: f32) -> Result<(), ConfigError> {
        if let Err(err) = VrSettings::check_world_scale(world_scale) {
            warn!("[VR] Keeping world scale {}: {}", self.settings.world_scale, err);
            return Err(err);
        }
        self.settings.world_scale = world_scale;
        Ok(())
    }

    /// Set the far clip distance; applies from the next frame
    pub fn set_far_clip(&mut self, far_clip: f32) -> Result<(), ConfigError> {
        if let Err(err) = VrSettings::check_far_clip(far_clip) {
            warn!("[VR] Keeping far clip {}: {}", self.settings.far_clip, err);
            return Err(err);
        }
        self.settings.far_clip = far_clip;
        Ok(())
    }

    /// Set the MSAA sample count; live targets keep theirs until the next enable
    pub fn set_msaa_samples(&mut self, samples: u32) -> Result<(), ConfigError> {
        if let Err(err) = VrSettings::check_msaa_samples(samples) {
            warn!("[VR] Keeping {}x MSAA: {}", self.settings.msaa_samples, err);
            return Err(err);
        }
        self.settings.msaa_samples = samples;
        Ok(())
    }

    /// Set the play-space yaw correction in degrees
    pub fn set_yaw_offset(&mut self, degrees: f32) {
        self.yaw_offset = degrees;
    }

    /// Play-space yaw correction in degrees
    pub const fn yaw_offset(&self) -> f32 {
        self.yaw_offset
    }

    /// The runtime
    pub const fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Mutable runtime
    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    /// The GL device
    pub const fn gl(&self) -> &G {
        &self.gl
    }

    /// Mutable GL device
    pub fn gl_mut(&mut self) -> &mut G {
        &mut self.gl
    }

    /// Eye render targets
    pub const fn framebuffers(&self) -> &FramebufferPool {
        &self.framebuffers
    }

    /// Tracked poses
    pub const fn poses(&self) -> &PoseTracker {
        &self.poses
    }

    /// Interface cache
    pub const fn interfaces(&self) -> &InterfaceCache {
        &self.interfaces
    }

    /// Wait for this frame's poses and drain runtime events
    ///
    /// Returns `None` while inactive.
    pub fn update_poses(&mut self) -> Result<Option<PoseUpdate>, InterfaceError> {
        if !self.is_active() {
            return Ok(None);
        }
        let compositor = self.interfaces.compositor(&self.runtime)?;
        let system = self.interfaces.system(&self.runtime)?;
        Ok(Some(self.poses.update(compositor.as_ref(), system.as_ref())))
    }

    fn system(&mut self) -> Result<Rc<dyn VrSystem>, InterfaceError> {
        self.interfaces.system(&self.runtime)
    }

    /// Matrices for one eye from the current head pose and settings
    pub fn build_eye_transforms(&mut self, eye: Eye, player_origin: Vec3) -> Result<ViewFrame, FrameError> {
        let system = self.system()?;
        let params = ViewParams::from_settings(&self.settings, self.yaw_offset, player_origin);
        let head_pose = self.poses.hmd_pose().device_to_absolute_tracking;
        Ok(self.pipeline.build_eye_transforms(system.as_ref(), &head_pose, eye, &params)?)
    }

    /// Submit both resolve textures; returns the number accepted
    pub fn submit(&mut self) -> Result<usize, InterfaceError> {
        if !self.is_active() {
            return Ok(0);
        }
        let compositor = self.interfaces.compositor(&self.runtime)?;
        Ok(CompositorSubmitter::submit(compositor.as_ref(), &self.framebuffers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessGl, HeadlessRuntime, Trace, TraceEvent};
    use crate::render::view::NEAR_CLIP;
    use crate::runtime::COMPOSITOR_INTERFACE_VERSION;

    type TestSession = VrSession<HeadlessRuntime, HeadlessGl>;

    fn session_with(runtime: HeadlessRuntime, gl: HeadlessGl, settings: VrSettings) -> TestSession {
        VrSession::new(runtime, gl, settings)
    }

    fn session(trace: &Trace) -> TestSession {
        session_with(
            HeadlessRuntime::new(trace.clone()).with_recommended_size(320, 240),
            HeadlessGl::new(trace.clone()),
            VrSettings::default(),
        )
    }

    #[test]
    fn test_init_enables_when_toggle_is_on() {
        let trace = Trace::default();
        let mut session = session(&trace);
        session.init().unwrap();

        assert_eq!(session.state(), SessionState::Active);
        let targets = session.framebuffers().targets().unwrap();
        assert_eq!((targets.width, targets.height), (320, 240));
        assert_eq!(session.gl().live_object_count(), 10);
    }

    #[test]
    fn test_init_does_nothing_when_toggle_is_off() {
        let trace = Trace::default();
        let mut session = session_with(
            HeadlessRuntime::new(trace.clone()),
            HeadlessGl::new(trace.clone()),
            VrSettings::default().with_enabled(false),
        );
        session.init().unwrap();

        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.runtime().init_count(), 0);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_enable_twice_allocates_once() {
        let trace = Trace::default();
        let mut session = session(&trace);
        session.enable().unwrap();
        let allocations = session.gl().total_allocations();

        session.enable().unwrap();
        assert_eq!(session.gl().total_allocations(), allocations);
        assert_eq!(session.runtime().init_count(), 1);
    }

    #[test]
    fn test_disable_then_enable_gives_fresh_targets() {
        let trace = Trace::default();
        let mut session = session(&trace);
        session.enable().unwrap();
        let old = *session.framebuffers().targets().unwrap();

        session.disable();
        assert_eq!(session.gl().live_object_count(), 0);
        assert!(!session.runtime().is_active());

        session.enable().unwrap();
        let new = *session.framebuffers().targets().unwrap();
        assert_eq!((new.width, new.height), (old.width, old.height));
        for eye in Eye::BOTH {
            let old_texture = old.eye(eye).resolve_texture.unwrap();
            let new_texture = new.eye(eye).resolve_texture.unwrap();
            assert_ne!(old_texture, new_texture);
            assert!(!session.gl().is_live(old_texture.raw()));
            assert!(session.gl().is_live(new_texture.raw()));
        }
    }

    #[test]
    fn test_disable_is_idempotent() {
        let trace = Trace::default();
        let mut session = session(&trace);
        session.disable();
        assert_eq!(session.runtime().shutdown_count(), 0);

        session.enable().unwrap();
        session.disable();
        session.disable();
        assert_eq!(session.runtime().shutdown_count(), 1);
    }

    #[test]
    fn test_absent_runtime_leaves_session_uninitialized() {
        let trace = Trace::default();
        let mut session = session_with(
            HeadlessRuntime::new(trace.clone()).with_init_error(InitErrorCode::HmdNotFound),
            HeadlessGl::new(trace.clone()),
            VrSettings::default(),
        );

        let err = session.init().unwrap_err();
        assert!(matches!(err, SessionError::RuntimeAbsent(ref reason) if reason == "HMD not found"));
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(!session.settings().enabled);
        assert_eq!(session.gl().total_allocations(), 0);
    }

    #[test]
    fn test_interface_version_mismatch_shuts_runtime_down() {
        let trace = Trace::default();
        let mut session = session_with(
            HeadlessRuntime::new(trace.clone()).with_invalid_system_version(),
            HeadlessGl::new(trace.clone()),
            VrSettings::default(),
        );

        let err = session.enable().unwrap_err();
        assert!(matches!(err, SessionError::InterfaceVersionMismatch { interface: SYSTEM_INTERFACE_VERSION }));
        assert!(!session.runtime().is_active());
        assert_eq!(session.runtime().shutdown_count(), 1);
    }

    #[test]
    fn test_framebuffer_failure_tears_down_runtime() {
        let trace = Trace::default();
        let mut session = session_with(
            HeadlessRuntime::new(trace.clone()),
            HeadlessGl::new(trace.clone()).fail_completeness_check(3),
            VrSettings::default(),
        );

        let err = session.set_enabled(true).unwrap_err();
        assert!(matches!(err, SessionError::Resource(FramebufferError::Incomplete { eye: Eye::Right, .. })));
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(!session.settings().enabled);
        assert!(!session.runtime().is_active());
        assert_eq!(session.gl().live_object_count(), 0);
        assert!(session.interfaces().is_empty());
    }

    #[test]
    fn test_missing_multisample_support_fails_enable() {
        let trace = Trace::default();
        let mut session = session_with(
            HeadlessRuntime::new(trace.clone()),
            HeadlessGl::new(trace.clone()).without_multisample_support(),
            VrSettings::default(),
        );

        let err = session.enable().unwrap_err();
        assert!(matches!(err, SessionError::Resource(FramebufferError::MultisampleUnsupported)));
        assert!(!session.runtime().is_active());
    }

    #[test]
    fn test_invalid_settings_never_touch_runtime() {
        let trace = Trace::default();
        let mut session = session_with(
            HeadlessRuntime::new(trace.clone()),
            HeadlessGl::new(trace.clone()),
            VrSettings::default().with_msaa_samples(0),
        );

        assert!(matches!(session.enable(), Err(SessionError::Settings(_))));
        assert_eq!(session.runtime().init_count(), 0);
    }

    #[test]
    fn test_toggle_off_disables() {
        let trace = Trace::default();
        let mut session = session(&trace);
        session.init().unwrap();

        session.set_enabled(false).unwrap();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(!session.settings().enabled);
        assert_eq!(session.gl().live_object_count(), 0);
    }

    #[test]
    fn test_sample_count_change_applies_on_next_enable() {
        let trace = Trace::default();
        let mut session = session(&trace);
        session.enable().unwrap();
        session.set_msaa_samples(8).unwrap();
        assert_eq!(session.framebuffers().samples(), 4);

        session.disable();
        session.enable().unwrap();
        assert_eq!(session.framebuffers().samples(), 8);
    }

    #[test]
    fn test_rejected_settings_keep_previous_values() {
        let trace = Trace::default();
        let mut session = session(&trace);
        session.enable().unwrap();

        for scale in [0.0, -5.0, f32::NAN, f32::INFINITY] {
            let err = session.set_world_scale(scale).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { field: "world_scale", .. }));
        }
        for far_clip in [NEAR_CLIP, 1.0, -100.0, f32::NAN] {
            let err = session.set_far_clip(far_clip).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { field: "far_clip", .. }));
        }
        assert!(session.set_msaa_samples(0).is_err());

        assert_eq!(session.settings(), &VrSettings::default());
        assert!(session.settings().validate().is_ok());
    }

    #[test]
    fn test_accepted_settings_are_stored() {
        let trace = Trace::default();
        let mut session = session(&trace);
        session.set_world_scale(32.0).unwrap();
        session.set_far_clip(NEAR_CLIP + 1.0).unwrap();

        assert_eq!(session.settings().world_scale, 32.0);
        assert_eq!(session.settings().far_clip, NEAR_CLIP + 1.0);
    }

    #[test]
    fn test_invalid_settings_in_file_fail_enable_and_toggle() {
        let trace = Trace::default();
        let mut session = session_with(
            HeadlessRuntime::new(trace.clone()),
            HeadlessGl::new(trace.clone()),
            VrSettings::default().with_world_scale(-1.0),
        );

        let err = session.init().unwrap_err();
        assert!(matches!(err, SessionError::Settings(ConfigError::Invalid { field: "world_scale", .. })));
        assert!(!session.settings().enabled);
        assert_eq!(session.runtime().init_count(), 0);
    }

    #[test]
    fn test_missing_system_interface_fails_enable_as_interface_error() {
        let trace = Trace::default();
        let mut session = session_with(
            HeadlessRuntime::new(trace.clone()).without_interface(SYSTEM_INTERFACE_VERSION),
            HeadlessGl::new(trace.clone()),
            VrSettings::default(),
        );

        let err = session.set_enabled(true).unwrap_err();
        assert!(matches!(err, SessionError::Interface(InterfaceError::Unavailable { .. })));
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(!session.settings().enabled);
        assert!(!session.runtime().is_active());
        assert_eq!(session.runtime().shutdown_count(), 1);
        assert_eq!(session.gl().total_allocations(), 0);
    }

    #[test]
    fn test_operations_are_noops_while_inactive() {
        let trace = Trace::default();
        let mut session = session(&trace);

        assert_eq!(session.update_poses().unwrap(), None);
        assert_eq!(session.submit().unwrap(), 0);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_missing_compositor_aborts_pose_update() {
        let trace = Trace::default();
        let mut session = session_with(
            HeadlessRuntime::new(trace.clone()).without_interface(COMPOSITOR_INTERFACE_VERSION),
            HeadlessGl::new(trace.clone()),
            VrSettings::default(),
        );
        session.enable().unwrap();

        assert!(matches!(session.update_poses(), Err(InterfaceError::Unavailable { .. })));
        assert!(matches!(session.submit(), Err(InterfaceError::Unavailable { .. })));
    }

    #[test]
    fn test_reenable_resolves_interfaces_again() {
        let trace = Trace::default();
        let mut session = session(&trace);
        session.enable().unwrap();
        session.update_poses().unwrap();
        session.disable();
        trace.clear();

        session.enable().unwrap();
        session.update_poses().unwrap();
        let resolves = trace.count(|event| matches!(event, TraceEvent::ResolveInterface(_)));
        assert_eq!(resolves, 2);
    }
}
