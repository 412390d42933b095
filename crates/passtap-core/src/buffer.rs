//! Persistent buffer: the durable surface that outlives the host's per-frame
//! render targets.

use crate::error::CaptureResult;
use crate::surface::{Extent, SurfaceBackend, Viewport, effective_resolution};

/// A live persistent surface plus the viewport it was sized for.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistentBuffer<S> {
    pub surface: S,
    pub width: u32,
    pub height: u32,
    pub resolution: f32,
    /// Physical size of `surface`.
    pub extent: Extent,
    /// Bumped on every (re)creation; a capture started against one
    /// generation never copies into another.
    pub generation: u64,
}

/// Owns the single persistent surface and recreates it when the viewport
/// changes. At most one surface is live at any time.
pub struct PersistentBufferManager<B: SurfaceBackend> {
    backend: B,
    current: Option<PersistentBuffer<B::Surface>>,
    generation: u64,
}

impl<B: SurfaceBackend> PersistentBufferManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            current: None,
            generation: 0,
        }
    }

    /// Allocate a surface for a `width`×`height` viewport at `resolution`.
    /// Any existing surface is released first.
    pub fn create(&mut self, width: u32, height: u32, resolution: f32) -> CaptureResult<()> {
        self.destroy();
        let resolution = effective_resolution(resolution);

        let viewport = Viewport::new(width, height, resolution);
        let extent = viewport.physical_extent();
        let surface = self.backend.create_surface(extent)?;
        self.generation += 1;
        self.current = Some(PersistentBuffer {
            surface,
            width,
            height,
            resolution,
            extent,
            generation: self.generation,
        });
        tracing::debug!(
            width,
            height,
            resolution,
            physical_width = extent.width,
            physical_height = extent.height,
            generation = self.generation,
            "persistent buffer created"
        );
        Ok(())
    }

    /// Recreate the surface at new logical dimensions, keeping the current
    /// resolution. Creates one when none exists.
    pub fn resize(&mut self, width: u32, height: u32) -> CaptureResult<()> {
        let resolution = match &self.current {
            Some(buffer) if buffer.width == width && buffer.height == height => return Ok(()),
            Some(buffer) => buffer.resolution,
            None => 1.0,
        };
        self.create(width, height, resolution)
    }

    /// Recreate the surface at a new pixel density. No-op without a surface
    /// or when the effective density is unchanged.
    pub fn set_resolution(&mut self, resolution: f32) -> CaptureResult<()> {
        let resolution = effective_resolution(resolution);
        match &self.current {
            Some(buffer) if buffer.resolution != resolution => {
                let (width, height) = (buffer.width, buffer.height);
                self.create(width, height, resolution)
            }
            _ => Ok(()),
        }
    }

    /// Release the surface. Idempotent.
    pub fn destroy(&mut self) {
        if let Some(buffer) = self.current.take() {
            self.backend.destroy_surface(buffer.surface);
            tracing::debug!(generation = buffer.generation, "persistent buffer destroyed");
        }
    }

    /// Whether a live surface exists.
    pub fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&PersistentBuffer<B::Surface>> {
        self.current.as_ref()
    }

    /// Generation of the live surface, if any.
    pub fn generation(&self) -> Option<u64> {
        self.current.as_ref().map(|buffer| buffer.generation)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: SurfaceBackend> Drop for PersistentBufferManager<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
