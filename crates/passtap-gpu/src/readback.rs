//! GPU-to-CPU texture readback for the one-shot debug capture.
//!
//! Texture rows are copied into a staging buffer padded to
//! [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`], mapped, then unpadded on the CPU.

use std::sync::mpsc;

use image::RgbaImage;
use passtap_core::{CaptureError, CaptureResult};

use crate::context::{GpuContext, GpuError};

/// Row pitch of an RGBA8 texture of `width` pixels in a copy buffer.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drop row padding from a mapped copy buffer.
pub fn unpad_rows(data: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let row = (width * 4) as usize;
    let mut pixels = Vec::with_capacity(row * height as usize);
    for chunk in data.chunks(padded_row as usize).take(height as usize) {
        pixels.extend_from_slice(&chunk[..row]);
    }
    pixels
}

/// Whether texels of `format` are stored blue-first.
fn channel_order(format: wgpu::TextureFormat) -> CaptureResult<bool> {
    match format.remove_srgb_suffix() {
        wgpu::TextureFormat::Rgba8Unorm => Ok(false),
        wgpu::TextureFormat::Bgra8Unorm => Ok(true),
        other => Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
    }
}

/// Read `texture` back as an RGBA8 image. Blocks until the copy completes.
pub fn read_texture(context: &GpuContext, texture: &wgpu::Texture) -> CaptureResult<RgbaImage> {
    let bgra = channel_order(texture.format())?;
    if !texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
        return Err(CaptureError::TargetNotCopyable);
    }
    if texture.sample_count() != 1 {
        return Err(CaptureError::SampleCountMismatch {
            source_samples: texture.sample_count(),
            destination_samples: 1,
        });
    }

    let (width, height) = (texture.width(), texture.height());
    let padded_row = padded_bytes_per_row(width);
    let staging = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("passtap_readback_staging"),
        size: u64::from(padded_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("passtap_readback_encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    context.queue.submit(std::iter::once(encoder.finish()));

    let (tx, rx) = mpsc::channel();
    staging
        .slice(..)
        .map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
    context.wait_idle()?;
    rx.recv()
        .map_err(|_| GpuError::MapCallbackDropped)?
        .map_err(GpuError::from)?;

    let mut pixels = {
        let data = staging.slice(..).get_mapped_range();
        unpad_rows(&data, width, height, padded_row)
    };
    staging.unmap();

    if bgra {
        for texel in pixels.chunks_exact_mut(4) {
            texel.swap(0, 2);
        }
    }

    tracing::debug!(width, height, "texture read back");
    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| CaptureError::Backend("readback size mismatch".into()))
}
