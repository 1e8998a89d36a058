//! VR runtime abstraction
//!
//! The bridge never links a runtime directly. Hosts implement [`VrRuntime`]
//! for whatever loader they ship with; the runtime hands out interface
//! function tables by name, which surface here as the [`VrSystem`] and
//! [`VrCompositor`] traits.
//!
//! All types in this module mirror the runtime's own conventions: matrices
//! are row-major ([`RowMajor34`], [`RowMajor44`]) and tracking space is
//! right-handed with Y up and -Z forward, measured in meters.

use std::fmt;
use std::rc::Rc;

use crate::foundation::math::{RowMajor34, RowMajor44, IDENTITY_34};

/// Capacity of the tracked pose array (`k_unMaxTrackedDeviceCount`)
pub const MAX_TRACKED_DEVICE_COUNT: usize = 16;

/// Pose slot reserved for the head-mounted display
pub const HMD_DEVICE_INDEX: usize = 0;

/// Interface version of the system function table this bridge is built against
pub const SYSTEM_INTERFACE_VERSION: &str = "IVRSystem_019";

/// Interface version of the compositor function table this bridge is built against
pub const COMPOSITOR_INTERFACE_VERSION: &str = "IVRCompositor_022";

/// Name under which the runtime exposes the C function table for `version`.
pub fn fn_table_name(version: &str) -> String {
    format!("FnTable:{version}")
}

/// Eye selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    /// Left eye
    Left,
    /// Right eye
    Right,
}

impl Eye {
    /// Both eyes in render order
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    /// Slot of this eye in per-eye arrays
    pub const fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    /// Lowercase name for diagnostics
    pub const fn as_str(self) -> &'static str {
        match self {
            Eye::Left => "left",
            Eye::Right => "right",
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the application registers with the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationType {
    /// Renders a 3D scene and owns the compositor's main layer
    Scene,
}

/// Error codes reported by runtime initialization and interface lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitErrorCode {
    /// No runtime installation could be located
    #[error("VR runtime installation not found")]
    InstallationNotFound,
    /// The runtime is installed but no headset is attached
    #[error("HMD not found")]
    HmdNotFound,
    /// A requested interface version is not provided by this runtime
    #[error("interface not found")]
    InterfaceNotFound,
    /// Interfaces were requested before a successful init
    #[error("runtime not initialized")]
    NotInitialized,
    /// Any other runtime-specific failure
    #[error("runtime init failed (code {0})")]
    Other(i32),
}

impl InitErrorCode {
    /// Whether this code means there is simply no runtime/headset to talk to
    pub const fn is_runtime_absent(self) -> bool {
        matches!(self, Self::InstallationNotFound | Self::HmdNotFound)
    }
}

/// Errors returned by compositor calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CompositorError {
    /// Another application currently has scene focus
    #[error("application does not have focus")]
    DoNotHaveFocus,
    /// The submitted texture handle was rejected
    #[error("invalid texture")]
    InvalidTexture,
    /// The texture is already being used by the compositor
    #[error("texture is in use")]
    TextureInUse,
    /// Pose request made from a non-scene application
    #[error("request failed")]
    RequestFailed,
}

/// One device's pose for the upcoming frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedDevicePose {
    /// Device-to-tracking-space transform (row-major 3x4, meters)
    pub device_to_absolute_tracking: RowMajor34,
    /// Whether the runtime considers the transform trustworthy
    pub pose_is_valid: bool,
    /// Whether the device is connected at all
    pub device_is_connected: bool,
}

impl Default for TrackedDevicePose {
    fn default() -> Self {
        Self {
            device_to_absolute_tracking: IDENTITY_34,
            pose_is_valid: false,
            device_is_connected: false,
        }
    }
}

/// Runtime event, drained once per frame after poses are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrEvent {
    /// A device started being tracked
    TrackedDeviceActivated {
        /// Pose slot of the device
        device: u32,
    },
    /// A device stopped being tracked
    TrackedDeviceDeactivated {
        /// Pose slot of the device
        device: u32,
    },
    /// The user's IPD changed
    IpdChanged,
    /// The runtime asks the application to exit
    Quit,
    /// Any event type the bridge does not interpret
    Other {
        /// Raw runtime event type
        event_type: u32,
    },
}

/// Graphics API a submitted texture belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    /// OpenGL texture name
    OpenGl,
}

/// Color space hint for submitted textures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Let the compositor infer it from the texture format
    Auto,
}

/// Texture handed to the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitTexture {
    /// Native texture handle
    pub handle: u32,
    /// API tag
    pub texture_type: TextureType,
    /// Color space tag
    pub color_space: ColorSpace,
}

/// UV sub-rectangle of a submitted texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureBounds {
    /// Left edge
    pub u_min: f32,
    /// Top edge
    pub v_min: f32,
    /// Right edge
    pub u_max: f32,
    /// Bottom edge
    pub v_max: f32,
}

impl TextureBounds {
    /// The whole texture
    pub const FULL: Self = Self { u_min: 0.0, v_min: 0.0, u_max: 1.0, v_max: 1.0 };
}

/// Submit behaviour flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitFlags {
    /// Plain color texture, no distortion already applied
    #[default]
    Default,
}

/// System interface: display properties, per-eye optics and the event queue
pub trait VrSystem {
    /// Per-eye render target size the runtime recommends
    fn recommended_render_target_size(&self) -> (u32, u32);

    /// Per-eye projection for the given clip distances, row-major
    fn projection_matrix(&self, eye: Eye, near: f32, far: f32) -> RowMajor44;

    /// Head-to-eye offset as a 3x4 affine (rotation + translation, meters)
    fn eye_to_head_transform(&self, eye: Eye) -> RowMajor34;

    /// Pop the next pending event without blocking
    fn poll_next_event(&self) -> Option<VrEvent>;
}

/// Compositor interface: pose pacing and frame submission
pub trait VrCompositor {
    /// Block until the runtime is ready for the next frame, then fill
    /// `render_poses` with predicted poses for it
    fn wait_get_poses(&self, render_poses: &mut [TrackedDevicePose]) -> Result<(), CompositorError>;

    /// Hand one eye's image to the compositor
    fn submit(
        &self,
        eye: Eye,
        texture: &SubmitTexture,
        bounds: &TextureBounds,
        flags: SubmitFlags,
    ) -> Result<(), CompositorError>;
}

/// A resolved interface function table
#[derive(Clone)]
pub enum RuntimeInterface {
    /// `IVRSystem` table
    System(Rc<dyn VrSystem>),
    /// `IVRCompositor` table
    Compositor(Rc<dyn VrCompositor>),
}

impl RuntimeInterface {
    /// Kind name for diagnostics
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::System(_) => "system",
            Self::Compositor(_) => "compositor",
        }
    }
}

impl fmt::Debug for RuntimeInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuntimeInterface::{}", self.kind())
    }
}

/// Entry points of a VR runtime loader
///
/// Interface tables obtained from [`VrRuntime::get_generic_interface`] stay
/// valid only while [`VrRuntime::init_token`] keeps returning the value it
/// had when they were fetched.
pub trait VrRuntime {
    /// Start a runtime session; returns the new init token
    fn init(&mut self, application_type: ApplicationType) -> Result<u32, InitErrorCode>;

    /// Tear the runtime session down
    fn shutdown(&mut self);

    /// Generation token, bumped whenever the runtime re-creates its interfaces
    fn init_token(&self) -> u32;

    /// Whether the runtime implements the given interface version
    fn is_interface_version_valid(&self, version: &str) -> bool;

    /// Look up an interface function table by name (`"FnTable:<version>"`)
    fn get_generic_interface(&self, name: &str) -> Result<RuntimeInterface, InitErrorCode>;

    /// Human-readable description of an error code
    fn error_description(&self, code: InitErrorCode) -> String {
        code.to_string()
    }
}
