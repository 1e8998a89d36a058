//! # VR Bridge
//!
//! Stereo rendering bridge between an OpenGL game renderer and an
//! OpenVR-style runtime.
//!
//! ## Features
//!
//! - **Session lifecycle**: idempotent enable/disable driven by a settings toggle
//! - **Per-eye targets**: MSAA draw framebuffers resolved into textures the compositor samples
//! - **View composition**: runtime head/eye poses turned into engine view matrices
//! - **Runtime seams**: the runtime and GL device are traits; headless doubles ship with the crate
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vr_bridge::prelude::*;
//! use vr_bridge::headless::{HeadlessGl, HeadlessRuntime, Trace};
//!
//! let trace = Trace::default();
//! let mut session = VrSession::new(
//!     HeadlessRuntime::new(trace.clone()),
//!     HeadlessGl::new(trace),
//!     VrSettings::default(),
//! );
//! if let Err(err) = session.init() {
//!     log::warn!("VR disabled: {}", err);
//! }
//!
//! let mut scene = |_gl: &mut HeadlessGl, view: &EyeView<'_>| {
//!     // load view.frame.projection_gl() / view.frame.view_gl() and draw
//!     let _ = view.eye;
//! };
//! session.render_frame(&mut scene, Vec3::zeros()).ok();
//! session.shutdown();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod foundation;
pub mod headless;
pub mod render;
pub mod runtime;
pub mod session;
pub mod tracking;

pub use session::{SessionError, SessionState, VrSession};

/// Common imports for bridge users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, VrSettings},
        foundation::math::{Mat4, Vec3},
        render::{GlDevice, RenderStateFlags, ViewFrame},
        runtime::{Eye, VrCompositor, VrRuntime, VrSystem},
        session::{EyeView, FrameError, FrameReport, SceneRenderer, SessionError, SessionState, VrSession},
    };
}
