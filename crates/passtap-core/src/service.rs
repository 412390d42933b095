//! Capture service: lifecycle glue between the host pipeline and the capture
//! strategies.
//!
//! One service drives one activation at a time. `init` creates the
//! persistent buffer and installs the configured strategy on the tap;
//! `teardown` restores the tap, releases the buffer and clears readiness.

use std::sync::Arc;

use crate::buffer::PersistentBuffer;
use crate::capture::FrameCapture;
use crate::debug::{ArmedGuard, DebugCapture, PngFilePresenter, Presenter};
use crate::detector::PassDetector;
use crate::diagnostics::{Diagnostics, FailureClass};
use crate::error::{CaptureError, CaptureResult};
use crate::identify::PassIdentifier;
use crate::readiness::{CaptureHandle, ReadyNotifier};
use crate::settings::{CaptureMode, CaptureSettings};
use crate::stream::CallStream;
use crate::surface::{SurfaceBackend, Viewport};
use crate::tap::CallStreamTap;

/// What the host hands over once its rendering pipeline is up.
///
/// `backend` is `None` when no graphics context could be obtained; `tap` is
/// `None` when the host does not expose an interceptable call stream.
pub struct PipelineReady<'a, B, S: CallStream> {
    pub viewport: Viewport,
    pub backend: Option<B>,
    pub tap: Option<&'a mut CallStreamTap<S>>,
}

/// Owns the capture lifecycle for one host pipeline.
pub struct PassCaptureService<B: SurfaceBackend> {
    settings: CaptureSettings,
    identifier: Arc<dyn PassIdentifier>,
    backend: Option<B>,
    handle: Option<CaptureHandle<B>>,
    notifier: Arc<ReadyNotifier<CaptureHandle<B>>>,
    guard: ArmedGuard,
    diagnostics: Diagnostics,
}

impl<B: SurfaceBackend> PassCaptureService<B> {
    /// Service matching passes with the substring identifier from `settings`.
    pub fn new(settings: CaptureSettings) -> Self {
        let identifier = Arc::new(settings.identifier.clone());
        Self::with_identifier(settings, identifier)
    }

    /// Service with a custom pass identifier.
    pub fn with_identifier(settings: CaptureSettings, identifier: Arc<dyn PassIdentifier>) -> Self {
        Self {
            settings,
            identifier,
            backend: None,
            handle: None,
            notifier: Arc::new(ReadyNotifier::new()),
            guard: ArmedGuard::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Activate on a ready pipeline.
    ///
    /// Missing graphics context or tap leaves the service inactive with the
    /// failure reported once; the host keeps rendering normally.
    pub fn init<S>(&mut self, ready: PipelineReady<'_, B, S>) -> CaptureResult<()>
    where
        S: CallStream<Target = B::Target> + 'static,
    {
        if self.handle.is_some() {
            tracing::warn!("capture service already active; tear down before re-initializing");
            return Err(CaptureError::AlreadyActive);
        }
        let Some(backend) = ready.backend else {
            return Err(self.fail(FailureClass::ContextUnavailable, CaptureError::ContextUnavailable));
        };
        let Some(tap) = ready.tap else {
            return Err(self.fail(
                FailureClass::HostCapabilityMissing,
                CaptureError::HostCapabilityMissing("interceptable call stream"),
            ));
        };

        let viewport = ready.viewport;
        let resolution = if viewport.resolution.is_finite() && viewport.resolution > 0.0 {
            viewport.resolution
        } else {
            self.settings.resolution
        };
        let handle = CaptureHandle::new(backend.clone());
        if let Err(err) = handle
            .buffers()
            .lock()
            .create(viewport.width, viewport.height, resolution)
        {
            return Err(self.fail(FailureClass::BufferAllocation, err));
        }

        let installed = match self.settings.mode {
            CaptureMode::Realtime => {
                let detector = PassDetector::new(
                    Arc::clone(&self.identifier),
                    FrameCapture::new(
                        handle.clone(),
                        Arc::clone(&self.notifier),
                        self.diagnostics.clone(),
                    ),
                    self.diagnostics.clone(),
                );
                tap.install(Box::new(detector)).map_err(CaptureError::from)
            }
            CaptureMode::DebugOneShot => {
                let presenter = PngFilePresenter::new(&self.settings.debug_output_dir);
                self.arm_with(backend.clone(), tap, Box::new(presenter))
            }
        };
        if let Err(err) = installed {
            handle.buffers().lock().destroy();
            return Err(err);
        }

        tracing::info!(
            width = viewport.width,
            height = viewport.height,
            resolution,
            mode = ?self.settings.mode,
            "pass capture active"
        );
        self.backend = Some(backend);
        self.handle = Some(handle);
        Ok(())
    }

    /// Follow a viewport resize. No-op while inactive.
    pub fn resize(&mut self, width: u32, height: u32) -> CaptureResult<()> {
        let Some(handle) = &self.handle else {
            tracing::debug!(width, height, "resize ignored; capture inactive");
            return Ok(());
        };
        let result = handle.buffers().lock().resize(width, height);
        result.map_err(|err| self.fail(FailureClass::BufferAllocation, err))
    }

    /// Follow a pixel density change. No-op while inactive.
    pub fn set_resolution(&mut self, resolution: f32) -> CaptureResult<()> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        let result = handle.buffers().lock().set_resolution(resolution);
        result.map_err(|err| self.fail(FailureClass::BufferAllocation, err))
    }

    /// Deactivate: restore the tap, release the buffer, clear readiness.
    ///
    /// Outstanding handles observe `is_ready() == false` afterwards. Safe to
    /// call when inactive.
    pub fn teardown<S: CallStream>(&mut self, tap: &mut CallStreamTap<S>) {
        let restored = tap.restore().is_some();
        let was_active = match self.handle.take() {
            Some(handle) => {
                handle.clear_ready();
                handle.buffers().lock().destroy();
                true
            }
            None => false,
        };
        self.backend = None;
        self.notifier.reset();
        self.diagnostics.reset();
        if restored || was_active {
            tracing::info!("pass capture torn down");
        }
    }

    /// Arm a one-shot debug capture of the next target pass.
    ///
    /// Rejected while another capture is armed or while the tap carries an
    /// observer; the running capture is not disturbed.
    pub fn arm_debug_capture<S>(
        &mut self,
        tap: &mut CallStreamTap<S>,
        presenter: Box<dyn Presenter>,
    ) -> CaptureResult<()>
    where
        S: CallStream<Target = B::Target> + 'static,
    {
        let Some(backend) = self.backend.clone() else {
            return Err(self.fail(FailureClass::ContextUnavailable, CaptureError::ContextUnavailable));
        };
        self.arm_with(backend, tap, presenter)
    }

    fn arm_with<S>(
        &mut self,
        backend: B,
        tap: &mut CallStreamTap<S>,
        presenter: Box<dyn Presenter>,
    ) -> CaptureResult<()>
    where
        S: CallStream<Target = B::Target> + 'static,
    {
        let Some(token) = self.guard.try_arm() else {
            return Err(self.fail(FailureClass::DoubleArm, CaptureError::AlreadyArmed));
        };
        let detector = PassDetector::new(
            Arc::clone(&self.identifier),
            DebugCapture::new(backend, presenter, self.diagnostics.clone(), token),
            self.diagnostics.clone(),
        );
        // A rejected install drops the detector and with it the token.
        if let Err(err) = tap.install(Box::new(detector)) {
            return Err(self.fail(FailureClass::DoubleArm, err.into()));
        }
        tracing::info!("debug capture armed");
        Ok(())
    }

    /// Handle onto the persistent buffer, while active.
    pub fn handle(&self) -> Option<CaptureHandle<B>> {
        self.handle.clone()
    }

    pub fn texture(&self) -> Option<PersistentBuffer<B::Surface>> {
        self.handle.as_ref().and_then(CaptureHandle::texture)
    }

    pub fn is_ready(&self) -> bool {
        self.handle.as_ref().is_some_and(CaptureHandle::is_ready)
    }

    /// Called once with the handle when the first pass lands, or immediately
    /// if that already happened this activation.
    pub fn on_ready(&self, callback: impl FnOnce(CaptureHandle<B>) + Send + 'static) {
        self.notifier.subscribe(callback);
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_debug_armed(&self) -> bool {
        self.guard.is_armed()
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn fail(&self, class: FailureClass, err: CaptureError) -> CaptureError {
        self.diagnostics.report(class, &err);
        err
    }
}
