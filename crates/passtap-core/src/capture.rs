//! Frame capture engine: the persist-and-continue end-of-pass strategy.
//!
//! Each completed target pass is blitted into the persistent buffer on the
//! GPU. Nothing is read back to the CPU.

use std::sync::Arc;

use crate::detector::{EndOfPass, PassHandler};
use crate::diagnostics::{Diagnostics, FailureClass};
use crate::readiness::{CaptureHandle, ReadyNotifier};
use crate::surface::SurfaceBackend;
use crate::tap::TapControl;

/// Outcome of one end-of-pass event, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Copied,
    /// No draw happened or the host already released the target.
    SkippedStaleTarget,
    /// The persistent buffer does not exist.
    SkippedNoBuffer,
    /// The buffer was recreated while the pass was running.
    SkippedResized,
    /// The backend refused the copy.
    Failed,
}

/// Persist-and-continue strategy for the realtime path.
pub struct FrameCapture<B: SurfaceBackend> {
    handle: CaptureHandle<B>,
    notifier: Arc<ReadyNotifier<CaptureHandle<B>>>,
    diagnostics: Diagnostics,
    /// Buffer generation when the running pass started.
    pass_generation: Option<u64>,
    frames_copied: u64,
    last_outcome: Option<FrameOutcome>,
}

impl<B: SurfaceBackend> FrameCapture<B> {
    pub fn new(
        handle: CaptureHandle<B>,
        notifier: Arc<ReadyNotifier<CaptureHandle<B>>>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            handle,
            notifier,
            diagnostics,
            pass_generation: None,
            frames_copied: 0,
            last_outcome: None,
        }
    }

    pub fn frames_copied(&self) -> u64 {
        self.frames_copied
    }

    pub fn last_outcome(&self) -> Option<FrameOutcome> {
        self.last_outcome
    }

    fn copy(&mut self, event: &EndOfPass<B::Target>) -> FrameOutcome {
        let mut buffers = self.handle.buffers().lock();

        let Some(generation) = buffers.generation() else {
            return FrameOutcome::SkippedNoBuffer;
        };
        if self.pass_generation != Some(generation) {
            return FrameOutcome::SkippedResized;
        }
        let Some(target) = event.target.as_ref() else {
            return FrameOutcome::SkippedStaleTarget;
        };
        let Some(target_extent) = buffers.backend().target_extent(target) else {
            self.diagnostics.report(
                FailureClass::StaleTarget,
                "render target released before end of pass; frame skipped",
            );
            return FrameOutcome::SkippedStaleTarget;
        };
        let Some(buffer) = buffers.current().cloned() else {
            return FrameOutcome::SkippedNoBuffer;
        };

        let region = target_extent.intersect(buffer.extent);
        if region.is_empty() {
            return FrameOutcome::SkippedStaleTarget;
        }

        match buffers.backend_mut().blit(target, &buffer.surface, region) {
            Ok(()) => FrameOutcome::Copied,
            Err(err) => {
                self.diagnostics.report(
                    FailureClass::CopyFailed,
                    format_args!("persistent buffer copy failed, frame skipped: {err}"),
                );
                FrameOutcome::Failed
            }
        }
    }
}

impl<B: SurfaceBackend> PassHandler<B::Target> for FrameCapture<B> {
    fn pass_started(&mut self) {
        self.pass_generation = self.handle.buffers().lock().generation();
    }

    fn pass_ended(&mut self, event: EndOfPass<B::Target>) -> TapControl {
        let outcome = self.copy(&event);
        self.pass_generation = None;
        self.last_outcome = Some(outcome);

        if outcome == FrameOutcome::Copied {
            self.frames_copied += 1;
            if self.handle.mark_ready() {
                tracing::info!(draws = event.draw_count, "first pass captured; buffer ready");
                self.notifier.notify(self.handle.clone());
            }
        } else {
            tracing::debug!(?outcome, draws = event.draw_count, "pass not captured");
        }
        TapControl::Continue
    }
}
