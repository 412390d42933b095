//! Device and queue shared by the backend and the immediate-mode stream.

use std::sync::Arc;

use passtap_core::CaptureError;
use thiserror::Error;

/// Errors produced while setting up or driving the wgpu device.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("buffer mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("buffer mapping callback was dropped")]
    MapCallbackDropped,
    #[error("draw issued with no program bound")]
    NoProgram,
    #[error("draw issued with no render target bound")]
    NoTarget,
    #[error("draw issued with no index buffer bound")]
    NoIndexBuffer,
    #[error("render target was released")]
    TargetReleased,
    #[error("program renders to {program:?} but the bound target is {target:?}")]
    AttachmentFormat {
        program: wgpu::TextureFormat,
        target: wgpu::TextureFormat,
    },
}

impl From<GpuError> for CaptureError {
    fn from(err: GpuError) -> Self {
        CaptureError::Backend(err.to_string())
    }
}

/// Cheap-to-clone handle on a wgpu device and its queue.
#[derive(Debug, Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Wrap a device the host already owns.
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }

    /// Create a standalone device. Blocks on adapter and device requests.
    pub fn create_blocking() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            ..Default::default()
        }))?;
        let info = adapter.get_info();

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("passtap_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            ..Default::default()
        }))?;

        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            "passtap GPU context created"
        );
        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    /// Block until all submitted work has completed.
    pub fn wait_idle(&self) -> Result<(), GpuError> {
        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        Ok(())
    }
}
