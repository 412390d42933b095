//! [`SurfaceBackend`] on wgpu: persistent textures and texture-to-texture
//! blits. Nothing here reads pixels back except [`SurfaceBackend::read_pixels`].

use std::sync::{Arc, Weak};

use image::RgbaImage;
use passtap_core::{CaptureError, CaptureResult, Extent, SurfaceBackend};

use crate::context::GpuContext;
use crate::readback;

/// A host render target. The host owns it through an `Arc`; the capture
/// system only ever holds a `Weak`.
#[derive(Debug)]
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl RenderTarget {
    /// Allocate a colour target usable as attachment, copy source and
    /// sampled texture.
    pub fn new(context: &GpuContext, extent: Extent, format: wgpu::TextureFormat) -> Arc<Self> {
        let texture = context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("passtap_render_target"),
            size: extent3d(extent),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Arc::new(Self { texture, view })
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.texture.width(), self.texture.height())
    }
}

/// The persistent texture consumers sample from.
#[derive(Debug, Clone)]
pub struct PersistentTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// wgpu implementation of [`SurfaceBackend`].
#[derive(Debug, Clone)]
pub struct WgpuBackend {
    context: GpuContext,
    format: wgpu::TextureFormat,
}

impl WgpuBackend {
    /// Backend whose persistent textures use `format`. Render targets must
    /// share it, up to the sRGB suffix.
    pub fn new(context: GpuContext, format: wgpu::TextureFormat) -> Self {
        Self { context, format }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

fn extent3d(extent: Extent) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: extent.width,
        height: extent.height,
        depth_or_array_layers: 1,
    }
}

fn copy_origin(texture: &wgpu::Texture) -> wgpu::TexelCopyTextureInfo<'_> {
    wgpu::TexelCopyTextureInfo {
        texture,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
    }
}

impl SurfaceBackend for WgpuBackend {
    type Surface = PersistentTexture;
    type Target = Weak<RenderTarget>;

    fn create_surface(&mut self, extent: Extent) -> CaptureResult<PersistentTexture> {
        let limit = self.context.device.limits().max_texture_dimension_2d;
        if extent.is_empty() || extent.width > limit || extent.height > limit {
            return Err(CaptureError::Backend(format!(
                "persistent texture {}x{} outside device limit {limit}",
                extent.width, extent.height
            )));
        }

        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("passtap_persistent_texture"),
            size: extent3d(extent),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        tracing::debug!(width = extent.width, height = extent.height, "persistent texture created");
        Ok(PersistentTexture { texture, view })
    }

    fn destroy_surface(&mut self, surface: PersistentTexture) {
        surface.texture.destroy();
    }

    fn target_extent(&self, target: &Weak<RenderTarget>) -> Option<Extent> {
        target.upgrade().map(|target| target.extent())
    }

    fn blit(
        &mut self,
        source: &Weak<RenderTarget>,
        destination: &PersistentTexture,
        region: Extent,
    ) -> CaptureResult<()> {
        let source = source.upgrade().ok_or(CaptureError::StaleTarget)?;
        if !source.texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
            return Err(CaptureError::TargetNotCopyable);
        }
        let (src_samples, dst_samples) =
            (source.texture.sample_count(), destination.texture.sample_count());
        if src_samples != dst_samples {
            return Err(CaptureError::SampleCountMismatch {
                source_samples: src_samples,
                destination_samples: dst_samples,
            });
        }
        let (src_format, dst_format) = (source.texture.format(), destination.texture.format());
        if src_format.remove_srgb_suffix() != dst_format.remove_srgb_suffix() {
            return Err(CaptureError::FormatMismatch {
                source_format: format!("{src_format:?}"),
                destination_format: format!("{dst_format:?}"),
            });
        }
        let region = region
            .intersect(source.extent())
            .intersect(Extent::new(destination.texture.width(), destination.texture.height()));
        if region.is_empty() {
            return Ok(());
        }

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("passtap_blit_encoder"),
            });
        encoder.copy_texture_to_texture(
            copy_origin(&source.texture),
            copy_origin(&destination.texture),
            extent3d(region),
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self, source: &Weak<RenderTarget>) -> CaptureResult<RgbaImage> {
        let source = source.upgrade().ok_or(CaptureError::StaleTarget)?;
        readback::read_texture(&self.context, &source.texture)
    }
}
