//! Passtap Core — render-pass capture without touching a graphics API.
//!
//! A [`CallStreamTap`] sits between the host and its draw-call stream. The
//! [`PassDetector`] turns intercepted program binds and indexed draws into
//! pass boundaries, and at the end of each target pass either blits the
//! render target into a persistent buffer ([`FrameCapture`]) or reads it back
//! once for inspection ([`DebugCapture`]). Graphics work goes through the
//! [`SurfaceBackend`] trait; `passtap-gpu` implements it on wgpu.

pub mod buffer;
pub mod capture;
pub mod debug;
pub mod detector;
pub mod diagnostics;
pub mod error;
pub mod identify;
pub mod readiness;
pub mod service;
pub mod settings;
pub mod stream;
pub mod surface;
pub mod tap;

#[cfg(test)]
mod testing;

// Re-exports for convenience.
pub use buffer::{PersistentBuffer, PersistentBufferManager};
pub use capture::{FrameCapture, FrameOutcome};
pub use debug::{ArmToken, ArmedGuard, DataUrlPresenter, DebugCapture, PngFilePresenter, Presenter};
pub use detector::{EndOfPass, PassDetector, PassHandler, PassState};
pub use diagnostics::{Diagnostics, FailureClass};
pub use error::{CaptureError, CaptureResult, IdentifyError, IntrospectError, SettingsError, TapError};
pub use identify::{FnIdentifier, PassIdentifier, StageSelector, SubstringIdentifier};
pub use readiness::{CaptureHandle, ReadyNotifier};
pub use service::{PassCaptureService, PipelineReady};
pub use settings::{CaptureMode, CaptureSettings};
pub use stream::{CallStream, DrawIndexed, ShaderStage, StageKind};
pub use surface::{Extent, SurfaceBackend, Viewport};
pub use tap::{CallObserver, CallStreamTap, TapControl};
