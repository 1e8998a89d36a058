//! In-memory `VrRuntime`

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::foundation::math::{RowMajor34, RowMajor44, IDENTITY_34};
use crate::headless::{Trace, TraceEvent};
use crate::runtime::{
    fn_table_name, ApplicationType, CompositorError, Eye, InitErrorCode, RuntimeInterface,
    SubmitFlags, SubmitTexture, TextureBounds, TrackedDevicePose, VrCompositor, VrEvent, VrRuntime,
    VrSystem, COMPOSITOR_INTERFACE_VERSION, HMD_DEVICE_INDEX, SYSTEM_INTERFACE_VERSION,
};

/// Interpupillary distance used for the default eye offsets (meters)
const DEFAULT_IPD: f32 = 0.064;

/// Recommended per-eye size of a current consumer headset
const DEFAULT_RENDER_SIZE: (u32, u32) = (1512, 1680);

/// Per-eye field of view as tangents: left, right, top, bottom
const LEFT_EYE_TANGENTS: [f32; 4] = [-1.39, 1.24, -1.47, 1.47];

#[derive(Debug)]
struct RuntimeState {
    trace: Trace,
    active: Cell<bool>,
    token: Cell<u32>,
    init_count: Cell<usize>,
    shutdown_count: Cell<usize>,
    submit_count: Cell<usize>,
    render_size: Cell<(u32, u32)>,
    frame_interval: Cell<Duration>,
    hmd_pose: Cell<RowMajor34>,
    eye_to_head: Cell<[RowMajor34; 2]>,
    events: RefCell<VecDeque<VrEvent>>,
}

fn eye_offset(x: f32) -> RowMajor34 {
    let mut m = IDENTITY_34;
    m[0][3] = x;
    m
}

/// OpenVR-style projection from raw frustum tangents
fn compose_projection(tangents: [f32; 4], near: f32, far: f32) -> RowMajor44 {
    let [left, right, top, bottom] = tangents;
    let idx = 1.0 / (right - left);
    let idy = 1.0 / (bottom - top);
    let idz = 1.0 / (far - near);
    let sx = right + left;
    let sy = bottom + top;
    [
        [2.0 * idx, 0.0, sx * idx, 0.0],
        [0.0, 2.0 * idy, sy * idy, 0.0],
        [0.0, 0.0, -far * idz, -far * near * idz],
        [0.0, 0.0, -1.0, 0.0],
    ]
}

/// Runtime double with a scripted headset
///
/// Clones share the same runtime state, so a host can keep a handle for
/// inspection after moving the runtime into a session.
#[derive(Debug, Clone)]
pub struct HeadlessRuntime {
    state: Rc<RuntimeState>,
    init_error: Option<InitErrorCode>,
    system_version_valid: bool,
    missing_interfaces: Vec<String>,
}

impl HeadlessRuntime {
    /// Runtime with a headset at the tracking origin
    pub fn new(trace: Trace) -> Self {
        let half_ipd = DEFAULT_IPD / 2.0;
        Self {
            state: Rc::new(RuntimeState {
                trace,
                active: Cell::new(false),
                token: Cell::new(0),
                init_count: Cell::new(0),
                shutdown_count: Cell::new(0),
                submit_count: Cell::new(0),
                render_size: Cell::new(DEFAULT_RENDER_SIZE),
                frame_interval: Cell::new(Duration::ZERO),
                hmd_pose: Cell::new(IDENTITY_34),
                eye_to_head: Cell::new([eye_offset(-half_ipd), eye_offset(half_ipd)]),
                events: RefCell::new(VecDeque::new()),
            }),
            init_error: None,
            system_version_valid: true,
            missing_interfaces: Vec::new(),
        }
    }

    /// Make every `init` fail with `code`
    pub fn with_init_error(mut self, code: InitErrorCode) -> Self {
        self.init_error = Some(code);
        self
    }

    /// Report the system interface version as unsupported
    pub fn with_invalid_system_version(mut self) -> Self {
        self.system_version_valid = false;
        self
    }

    /// Refuse to hand out the interface with the given version
    pub fn without_interface(mut self, version: &str) -> Self {
        self.missing_interfaces.push(fn_table_name(version));
        self
    }

    /// Recommended per-eye render target size
    pub fn with_recommended_size(self, width: u32, height: u32) -> Self {
        self.state.render_size.set((width, height));
        self
    }

    /// Sleep this long in every pose wait, standing in for vsync
    pub fn with_frame_interval(self, interval: Duration) -> Self {
        self.state.frame_interval.set(interval);
        self
    }

    /// Headset pose reported by the next pose waits
    pub fn set_hmd_pose(&self, pose: RowMajor34) {
        self.state.hmd_pose.set(pose);
    }

    /// Eye-to-head transform reported for `eye`
    pub fn set_eye_to_head(&self, eye: Eye, transform: RowMajor34) {
        let mut transforms = self.state.eye_to_head.get();
        transforms[eye.index()] = transform;
        self.state.eye_to_head.set(transforms);
    }

    /// Queue an event for the next drain
    pub fn push_event(&self, event: VrEvent) {
        self.state.events.borrow_mut().push_back(event);
    }

    /// Simulate the runtime re-creating its interface tables
    pub fn bump_token(&self) {
        self.state.token.set(self.state.token.get().wrapping_add(1));
    }

    /// Whether a runtime session is running
    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }

    /// Successful `init` calls so far
    pub fn init_count(&self) -> usize {
        self.state.init_count.get()
    }

    /// `shutdown` calls so far
    pub fn shutdown_count(&self) -> usize {
        self.state.shutdown_count.get()
    }

    /// Submissions accepted so far
    pub fn submit_count(&self) -> usize {
        self.state.submit_count.get()
    }

    /// Shared call log
    pub fn trace(&self) -> &Trace {
        &self.state.trace
    }
}

impl VrRuntime for HeadlessRuntime {
    fn init(&mut self, application_type: ApplicationType) -> Result<u32, InitErrorCode> {
        self.state.trace.record(TraceEvent::RuntimeInit);
        if let Some(code) = self.init_error {
            return Err(code);
        }
        log::trace!("Headless runtime init as {:?}", application_type);
        self.bump_token();
        self.state.active.set(true);
        self.state.init_count.set(self.state.init_count.get() + 1);
        Ok(self.state.token.get())
    }

    fn shutdown(&mut self) {
        self.state.trace.record(TraceEvent::RuntimeShutdown);
        self.state.active.set(false);
        self.state.shutdown_count.set(self.state.shutdown_count.get() + 1);
    }

    fn init_token(&self) -> u32 {
        self.state.token.get()
    }

    fn is_interface_version_valid(&self, version: &str) -> bool {
        match version {
            SYSTEM_INTERFACE_VERSION => self.system_version_valid,
            COMPOSITOR_INTERFACE_VERSION => true,
            _ => false,
        }
    }

    fn get_generic_interface(&self, name: &str) -> Result<RuntimeInterface, InitErrorCode> {
        self.state.trace.record(TraceEvent::ResolveInterface(name.to_string()));
        if !self.state.active.get() {
            return Err(InitErrorCode::NotInitialized);
        }
        if self.missing_interfaces.iter().any(|missing| missing == name) {
            return Err(InitErrorCode::InterfaceNotFound);
        }
        if name == fn_table_name(SYSTEM_INTERFACE_VERSION) {
            Ok(RuntimeInterface::System(Rc::new(HeadlessSystem { state: Rc::clone(&self.state) })))
        } else if name == fn_table_name(COMPOSITOR_INTERFACE_VERSION) {
            Ok(RuntimeInterface::Compositor(Rc::new(HeadlessCompositor { state: Rc::clone(&self.state) })))
        } else {
            Err(InitErrorCode::InterfaceNotFound)
        }
    }
}

/// System interface handed out by [`HeadlessRuntime`]
#[derive(Debug)]
pub struct HeadlessSystem {
    state: Rc<RuntimeState>,
}

impl VrSystem for HeadlessSystem {
    fn recommended_render_target_size(&self) -> (u32, u32) {
        self.state.render_size.get()
    }

    fn projection_matrix(&self, eye: Eye, near: f32, far: f32) -> RowMajor44 {
        self.state.trace.record(TraceEvent::GetProjection(eye));
        let mut tangents = LEFT_EYE_TANGENTS;
        if eye == Eye::Right {
            tangents = [-tangents[1], -tangents[0], tangents[2], tangents[3]];
        }
        compose_projection(tangents, near, far)
    }

    fn eye_to_head_transform(&self, eye: Eye) -> RowMajor34 {
        self.state.trace.record(TraceEvent::GetEyeToHead(eye));
        self.state.eye_to_head.get()[eye.index()]
    }

    fn poll_next_event(&self) -> Option<VrEvent> {
        self.state.trace.record(TraceEvent::PollEvent);
        self.state.events.borrow_mut().pop_front()
    }
}

/// Compositor interface handed out by [`HeadlessRuntime`]
#[derive(Debug)]
pub struct HeadlessCompositor {
    state: Rc<RuntimeState>,
}

impl VrCompositor for HeadlessCompositor {
    fn wait_get_poses(&self, render_poses: &mut [TrackedDevicePose]) -> Result<(), CompositorError> {
        self.state.trace.record(TraceEvent::WaitGetPoses);
        if !self.state.active.get() {
            return Err(CompositorError::RequestFailed);
        }
        let interval = self.state.frame_interval.get();
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }

        render_poses.fill(TrackedDevicePose::default());
        if let Some(hmd) = render_poses.get_mut(HMD_DEVICE_INDEX) {
            *hmd = TrackedDevicePose {
                device_to_absolute_tracking: self.state.hmd_pose.get(),
                pose_is_valid: true,
                device_is_connected: true,
            };
        }
        Ok(())
    }

    fn submit(
        &self,
        eye: Eye,
        texture: &SubmitTexture,
        _bounds: &TextureBounds,
        _flags: SubmitFlags,
    ) -> Result<(), CompositorError> {
        self.state.trace.record(TraceEvent::Submit { eye, texture: texture.handle });
        if !self.state.active.get() || texture.handle == 0 {
            return Err(CompositorError::InvalidTexture);
        }
        self.state.submit_count.set(self.state.submit_count.get() + 1);
        Ok(())
    }
}
