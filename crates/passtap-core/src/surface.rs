//! GPU surface abstraction used by the buffer manager and the capture
//! strategies.
//!
//! `passtap-core` never touches a graphics API directly. A [`SurfaceBackend`]
//! allocates the persistent surface, copies render targets into it on the GPU,
//! and (for the debug path only) reads a target back to host memory.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::CaptureResult;

/// Physical size of a surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Component-wise minimum, the region two surfaces have in common.
    pub fn intersect(self, other: Self) -> Self {
        Self {
            width: self.width.min(other.width),
            height: self.height.min(other.height),
        }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pixel density to use for `resolution`: invalid (non-finite or
/// non-positive) values become 1.0.
pub fn effective_resolution(resolution: f32) -> f32 {
    if resolution.is_finite() && resolution > 0.0 {
        resolution
    } else {
        1.0
    }
}

/// Host viewport in logical pixels plus its pixel density.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub resolution: f32,
}

impl Viewport {
    pub fn new(width: u32, height: u32, resolution: f32) -> Self {
        Self {
            width,
            height,
            resolution,
        }
    }

    /// Physical extent: logical size scaled by the resolution, at least 1×1.
    pub fn physical_extent(&self) -> Extent {
        let scale = effective_resolution(self.resolution);
        let scaled = |v: u32| ((v as f32 * scale).round() as u32).max(1);
        Extent::new(scaled(self.width), scaled(self.height))
    }
}

/// Allocation, GPU copy and readback for one graphics device.
///
/// Implementations are cheap handles onto a shared device; cloning must not
/// duplicate GPU resources.
pub trait SurfaceBackend: Clone + Send + 'static {
    /// The persistent surface type handed to consumers.
    type Surface: Clone + Send + 'static;
    /// Non-owning reference to a host render target.
    type Target: Clone + Send + 'static;

    /// Allocate and realize a surface of `extent`.
    fn create_surface(&mut self, extent: Extent) -> CaptureResult<Self::Surface>;

    /// Release a surface's GPU allocation.
    fn destroy_surface(&mut self, surface: Self::Surface);

    /// Extent of a render target, or `None` once the host has released it.
    fn target_extent(&self, target: &Self::Target) -> Option<Extent>;

    /// GPU-side copy of `region` from the target's origin into the surface's
    /// origin. Pixels outside `region` are left as they are.
    fn blit(
        &mut self,
        source: &Self::Target,
        destination: &Self::Surface,
        region: Extent,
    ) -> CaptureResult<()>;

    /// Read a render target back to host memory as RGBA8.
    fn read_pixels(&mut self, source: &Self::Target) -> CaptureResult<RgbaImage>;
}
