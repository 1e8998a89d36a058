//! Headless runtime and GL doubles
//!
//! Both doubles write every call into a shared [`Trace`], so one ordered log
//! shows runtime traffic, GL traffic and scene draws interleaved as they
//! happened. The test suites use it to check ordering and leak properties;
//! `bridge_demo` uses it to run the whole frame loop without a headset.

mod gl;
mod runtime;

use std::cell::RefCell;
use std::rc::Rc;

use crate::render::gl::{FramebufferId, FramebufferTarget, Rect, RenderStateFlags, RenderbufferId, TextureFilter, TextureId};
use crate::runtime::Eye;

pub use gl::HeadlessGl;
pub use runtime::{HeadlessCompositor, HeadlessRuntime, HeadlessSystem};

/// A GL call as seen by [`HeadlessGl`]
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    /// Framebuffer generated
    CreateFramebuffer(FramebufferId),
    /// Renderbuffer generated
    CreateRenderbuffer(RenderbufferId),
    /// Texture generated
    CreateTexture(TextureId),
    /// Framebuffer deleted
    DeleteFramebuffer(FramebufferId),
    /// Renderbuffer deleted
    DeleteRenderbuffer(RenderbufferId),
    /// Texture deleted
    DeleteTexture(TextureId),
    /// Binding changed
    BindFramebuffer {
        /// Binding point
        target: FramebufferTarget,
        /// Bound object, `None` for the default framebuffer
        framebuffer: Option<FramebufferId>,
    },
    /// Viewport set
    Viewport(Rect),
    /// Color + depth clear
    Clear([f32; 4]),
    /// Color blit between the current read and draw bindings
    Blit {
        /// Read binding at blit time
        read: Option<FramebufferId>,
        /// Draw binding at blit time
        draw: Option<FramebufferId>,
        /// Source rectangle
        src: Rect,
        /// Destination rectangle
        dst: Rect,
        /// Filter
        filter: TextureFilter,
    },
    /// Capability toggles replaced
    SetRenderState(RenderStateFlags),
}

/// One entry of the shared call log
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// Runtime session started
    RuntimeInit,
    /// Runtime session ended
    RuntimeShutdown,
    /// Interface looked up by name
    ResolveInterface(String),
    /// Compositor pose wait
    WaitGetPoses,
    /// Event queue polled
    PollEvent,
    /// Projection requested
    GetProjection(Eye),
    /// Eye-to-head transform requested
    GetEyeToHead(Eye),
    /// Eye texture submitted
    Submit {
        /// Eye
        eye: Eye,
        /// Raw texture name
        texture: u32,
    },
    /// GL call
    Gl(GlCall),
    /// Scene renderer invoked
    SceneDraw(Eye),
}

/// Shared, ordered call log
#[derive(Debug, Clone, Default)]
pub struct Trace(Rc<RefCell<Vec<TraceEvent>>>);

impl Trace {
    /// Append an event
    pub fn record(&self, event: TraceEvent) {
        self.0.borrow_mut().push(event);
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<TraceEvent> {
        self.0.borrow().clone()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Drop everything recorded so far
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Index of the first event matching `predicate`
    pub fn position(&self, predicate: impl Fn(&TraceEvent) -> bool) -> Option<usize> {
        self.0.borrow().iter().position(predicate)
    }

    /// Number of events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&TraceEvent) -> bool) -> usize {
        self.0.borrow().iter().filter(|event| predicate(event)).count()
    }
}
