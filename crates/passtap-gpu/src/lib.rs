//! Passtap GPU — wgpu backend for the capture system.
//!
//! Provides the [`WgpuBackend`] surface backend (persistent textures, GPU
//! blits, debug readback) and [`ImmediateContext`], a [`passtap_core::CallStream`]
//! that submits each indexed draw as it is issued.

pub mod backend;
pub mod context;
pub mod immediate;
pub mod readback;

pub use backend::{PersistentTexture, RenderTarget, WgpuBackend};
pub use context::{GpuContext, GpuError};
pub use immediate::{ImmediateContext, Program};
