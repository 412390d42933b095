//! GPU integration tests. Require a real wgpu adapter; each test returns early
//! when none is available.
//!
//! Run with: `cargo test -p passtap-gpu`

use std::sync::{Arc, Mutex, OnceLock};

use image::RgbaImage;
use passtap_core::{
    CallStream, CallStreamTap, CaptureError, CaptureResult, CaptureSettings, DrawIndexed, Extent,
    PassCaptureService, PipelineReady, Presenter, SurfaceBackend, Viewport,
};
use passtap_gpu::{GpuContext, ImmediateContext, Program, RenderTarget, WgpuBackend, readback};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const FULLSCREEN_VS: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}
"#;

const COMPOSITE_FS: &str = r#"
// FINAL_COMPOSITE
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 0.0, 1.0);
}
"#;

const OVERLAY_FS: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(0.0, 0.0, 1.0, 1.0);
}
"#;

fn gpu_test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn try_context() -> Option<GpuContext> {
    match GpuContext::create_blocking() {
        Ok(context) => Some(context),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

struct Scene {
    tap: CallStreamTap<ImmediateContext>,
    target: Arc<RenderTarget>,
    composite: Arc<Program>,
    overlay: Arc<Program>,
}

fn scene(context: &GpuContext, extent: Extent) -> Scene {
    let mut stream = ImmediateContext::new(context.clone());
    let composite = stream.create_program("composite", FULLSCREEN_VS, COMPOSITE_FS, FORMAT);
    let overlay = stream.create_program("overlay", FULLSCREEN_VS, OVERLAY_FS, FORMAT);
    let indices = stream.create_index_buffer(&[0, 1, 2]);
    stream.bind_index_buffer(indices);

    let target = RenderTarget::new(context, extent, FORMAT);
    stream.clear_target(&target, wgpu::Color::BLACK);
    stream.bind_target(Some(&target));
    Scene {
        tap: CallStreamTap::new(stream),
        target,
        composite,
        overlay,
    }
}

fn assert_solid(image: &RgbaImage, expected: [u8; 4]) {
    for pixel in image.pixels() {
        assert_eq!(pixel.0, expected);
    }
}

#[test]
fn composite_pass_lands_in_persistent_texture() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = try_context() else {
        return;
    };
    let mut scene = scene(&context, Extent::new(32, 16));
    let mut service = PassCaptureService::new(CaptureSettings::default());
    service
        .init(PipelineReady {
            viewport: Viewport::new(32, 16, 1.0),
            backend: Some(WgpuBackend::new(context.clone(), FORMAT)),
            tap: Some(&mut scene.tap),
        })
        .expect("init");

    scene.tap.bind_program(Some(scene.composite.clone())).unwrap();
    scene.tap.draw_indexed(DrawIndexed::count(3)).unwrap();
    scene.tap.bind_program(Some(scene.overlay.clone())).unwrap();
    assert!(service.is_ready());

    // Host keeps drawing over its target; the persistent copy is unaffected.
    scene.tap.draw_indexed(DrawIndexed::count(3)).unwrap();

    let buffer = service.texture().expect("texture after first pass");
    assert_eq!(buffer.extent, Extent::new(32, 16));
    let persisted = readback::read_texture(&context, &buffer.surface.texture).unwrap();
    assert_solid(&persisted, [255, 0, 0, 255]);
    let live = readback::read_texture(&context, &scene.target.texture).unwrap();
    assert_solid(&live, [0, 0, 255, 255]);

    service.teardown(&mut scene.tap);
    assert!(service.texture().is_none());
}

#[derive(Clone, Default)]
struct Collect(Arc<Mutex<Vec<RgbaImage>>>);

impl Presenter for Collect {
    fn present(&mut self, image: &RgbaImage) -> CaptureResult<()> {
        self.0.lock().expect("collect lock poisoned").push(image.clone());
        Ok(())
    }
}

#[test]
fn debug_capture_reads_back_once() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = try_context() else {
        return;
    };
    let mut scene = scene(&context, Extent::new(8, 8));
    let mut service = PassCaptureService::new(CaptureSettings::default());
    service
        .init(PipelineReady {
            viewport: Viewport::new(8, 8, 1.0),
            backend: Some(WgpuBackend::new(context.clone(), FORMAT)),
            tap: Some(&mut scene.tap),
        })
        .expect("init");
    drop(scene.tap.restore());

    let presenter = Collect::default();
    service
        .arm_debug_capture(&mut scene.tap, Box::new(presenter.clone()))
        .expect("arm");
    scene.tap.bind_program(Some(scene.composite.clone())).unwrap();
    scene.tap.draw_indexed(DrawIndexed::count(3)).unwrap();
    scene.tap.bind_program(None).unwrap();

    assert!(!service.is_debug_armed());
    assert!(!scene.tap.is_installed());
    let images = presenter.0.lock().expect("collect lock poisoned");
    assert_eq!(images.len(), 1);
    assert_solid(&images[0], [255, 0, 0, 255]);
}

#[test]
fn blit_rejects_mismatched_formats() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = try_context() else {
        return;
    };
    let mut backend = WgpuBackend::new(context.clone(), FORMAT);
    let surface = backend.create_surface(Extent::new(4, 4)).unwrap();
    let target = RenderTarget::new(&context, Extent::new(4, 4), wgpu::TextureFormat::Bgra8Unorm);

    let err = backend
        .blit(&Arc::downgrade(&target), &surface, Extent::new(4, 4))
        .unwrap_err();
    assert!(matches!(err, CaptureError::FormatMismatch { .. }));

    let stale = Arc::downgrade(&RenderTarget::new(&context, Extent::new(4, 4), FORMAT));
    assert!(backend.target_extent(&stale).is_none());
    assert!(matches!(
        backend.blit(&stale, &surface, Extent::new(4, 4)),
        Err(CaptureError::StaleTarget)
    ));
    backend.destroy_surface(surface);
}

fn multisampled_target(context: &GpuContext, extent: Extent) -> Arc<RenderTarget> {
    let texture = context.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("multisampled_composite"),
        size: wgpu::Extent3d {
            width: extent.width,
            height: extent.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 4,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Arc::new(RenderTarget { texture, view })
}

#[test]
fn multisampled_target_is_rejected_before_copy() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(context) = try_context() else {
        return;
    };
    let mut backend = WgpuBackend::new(context.clone(), FORMAT);
    let surface = backend.create_surface(Extent::new(4, 4)).unwrap();
    let target = multisampled_target(&context, Extent::new(4, 4));
    let weak = Arc::downgrade(&target);

    let err = backend.blit(&weak, &surface, Extent::new(4, 4)).unwrap_err();
    assert!(matches!(
        err,
        CaptureError::SampleCountMismatch {
            source_samples: 4,
            destination_samples: 1
        }
    ));
    assert!(matches!(
        backend.read_pixels(&weak),
        Err(CaptureError::SampleCountMismatch { .. })
    ));
    context.wait_idle().unwrap();
    backend.destroy_surface(surface);
}
