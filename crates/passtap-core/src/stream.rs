//! The two graphics entry points the capture system observes.
//!
//! A [`CallStream`] is whatever the host renders through: a GL-style context,
//! an immediate-mode wgpu wrapper, or a recording mock in tests. Only program
//! binds and indexed draws are observed; everything else the host does is
//! invisible to the capture system.

use std::ops::Range;

use crate::error::IntrospectError;

/// Shader pipeline stage of an attached shader object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
    Compute,
}

/// One shader object attached to a program, with its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStage {
    pub kind: StageKind,
    pub source: String,
}

impl ShaderStage {
    pub fn new(kind: StageKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }
}

/// Arguments of an indexed draw call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawIndexed {
    pub indices: Range<u32>,
    pub base_vertex: i32,
    pub instances: Range<u32>,
}

impl DrawIndexed {
    /// A single-instance draw of `count` indices starting at zero.
    pub fn count(count: u32) -> Self {
        Self {
            indices: 0..count,
            base_vertex: 0,
            instances: 0..1,
        }
    }
}

/// The intercepted subset of a graphics API.
///
/// `bind_program(None)` unbinds the current program. Both calls return the
/// stream's `Output` unchanged through any decorator.
pub trait CallStream {
    /// Handle to a linked shader program.
    type Program;
    /// Non-owning reference to a render target.
    type Target: Clone;
    /// Value returned by both intercepted calls.
    type Output;

    fn bind_program(&mut self, program: Option<Self::Program>) -> Self::Output;

    fn draw_indexed(&mut self, call: DrawIndexed) -> Self::Output;

    /// Render target currently bound for output, if any.
    fn bound_target(&self) -> Option<Self::Target>;

    /// Shader objects attached to `program`, in attachment order.
    fn attached_shaders(&self, program: &Self::Program) -> Result<Vec<ShaderStage>, IntrospectError>;
}
