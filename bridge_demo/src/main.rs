//! VR bridge demo
//!
//! Runs the full session lifecycle and frame loop against the headless
//! runtime and GL device: init, a batch of frames with a swaying head, a
//! toggle off/on in the middle, then shutdown.
//!
//! Usage: `bridge_demo [settings.toml|settings.ron] [frames]`

use std::time::Duration;

use thiserror::Error;
use vr_bridge::foundation::{logging, math::IDENTITY_34};
use vr_bridge::headless::{HeadlessGl, HeadlessRuntime, Trace, TraceEvent};
use vr_bridge::prelude::*;
use vr_bridge::runtime::VrEvent;

const DEFAULT_FRAMES: u32 = 90;

/// 90 Hz display
const FRAME_INTERVAL: Duration = Duration::from_micros(11_111);

#[derive(Error, Debug)]
enum DemoError {
    #[error("Settings: {0}")]
    Config(#[from] ConfigError),

    #[error("Session: {0}")]
    Session(#[from] SessionError),

    #[error("Frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Invalid frame count '{0}'")]
    FrameCount(String),
}

struct DemoArgs {
    settings: VrSettings,
    frames: u32,
}

fn parse_args() -> Result<DemoArgs, DemoError> {
    let mut settings = VrSettings::default();
    let mut frames = DEFAULT_FRAMES;

    for arg in std::env::args().skip(1) {
        if arg.ends_with(".toml") || arg.ends_with(".ron") {
            log::info!("Loading settings from {}", arg);
            settings = VrSettings::load_from_file(&arg)?;
        } else {
            frames = arg.parse().map_err(|_| DemoError::FrameCount(arg.clone()))?;
        }
    }

    settings.validate()?;
    Ok(DemoArgs { settings, frames })
}

/// Head pose swaying left and right at standing height
fn head_pose(frame: u32) -> [[f32; 4]; 3] {
    let t = frame as f32 * FRAME_INTERVAL.as_secs_f32();
    let (sin, cos) = (t * 0.5).sin_cos();
    let mut pose = IDENTITY_34;
    pose[0][0] = cos;
    pose[0][2] = sin;
    pose[2][0] = -sin;
    pose[2][2] = cos;
    pose[0][3] = 0.1 * sin;
    pose[1][3] = 1.7;
    pose
}

struct Scene {
    trace: Trace,
    draws: usize,
}

impl SceneRenderer<HeadlessGl> for Scene {
    fn draw(&mut self, _gl: &mut HeadlessGl, view: &EyeView<'_>) {
        self.trace.record(TraceEvent::SceneDraw(view.eye));
        self.draws += 1;
        log::trace!("Draw {} eye, view {:?}", view.eye, view.frame.view_gl());
    }
}

fn run(args: DemoArgs) -> Result<(), DemoError> {
    let trace = Trace::default();
    let runtime = HeadlessRuntime::new(trace.clone()).with_frame_interval(FRAME_INTERVAL);
    let gl = HeadlessGl::new(trace.clone());
    let mut session = VrSession::new(runtime, gl, args.settings);

    session.init()?;
    log::info!("Session state: {:?}", session.state());

    let mut scene = Scene { trace: trace.clone(), draws: 0 };
    let player_origin = Vec3::new(480.0, -352.0, 88.0);
    let mut skipped = 0;
    let mut pose_wait = Duration::ZERO;

    for frame in 0..args.frames {
        if frame == args.frames / 2 {
            log::info!("Toggling VR off and back on");
            session.set_enabled(false)?;
            session.set_enabled(true)?;
        }
        if frame % 30 == 0 {
            session.runtime().push_event(VrEvent::TrackedDeviceActivated { device: 1 });
        }
        session.runtime().set_hmd_pose(head_pose(frame));
        session.set_yaw_offset(frame as f32 * 0.1);

        let report = session.render_frame(&mut scene, player_origin)?;
        skipped += report.skipped_eyes.len();
        pose_wait += report.pose_wait;
    }

    let submits = trace.count(|event| matches!(event, TraceEvent::Submit { .. }));
    log::info!(
        "Rendered {} frames: {} eye draws, {} skipped, {} submits, {:?} in pose waits",
        args.frames,
        scene.draws,
        skipped,
        submits,
        pose_wait
    );

    session.shutdown();
    log::info!(
        "Shutdown complete, {} GL objects still live",
        session.gl().live_object_count()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    log::info!("Starting VR bridge demo");
    let args = parse_args()?;

    match run(args) {
        Ok(()) => {
            log::info!("VR bridge demo finished successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Demo error: {}", e);
            Err(e.into())
        }
    }
}
