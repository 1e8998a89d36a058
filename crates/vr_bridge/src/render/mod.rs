//! Rendering side of the bridge
//!
//! - `gl`: the graphics device seam and object names
//! - `framebuffer`: per-eye MSAA draw + resolve targets
//! - `view`: per-eye projection and view matrices
//! - `submit`: compositor submission
//! - `glow_device`: `GlDevice` on a `glow` context (feature `glow`)

pub mod framebuffer;
pub mod gl;
pub mod submit;
pub mod view;

#[cfg(all(feature = "glow", not(target_arch = "wasm32")))]
pub mod glow_device;

pub use framebuffer::{EyeFramebufferDesc, EyeTargets, FramebufferError, FramebufferPool};
pub use gl::{GlDevice, GlError, Rect, RenderStateFlags};
pub use submit::CompositorSubmitter;
pub use view::{ViewError, ViewFrame, ViewParams, ViewPipeline};

#[cfg(all(feature = "glow", not(target_arch = "wasm32")))]
pub use glow_device::GlowDevice;
