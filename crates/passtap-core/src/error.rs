//! Error types for pass capture.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to introspect a program's attached shader stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntrospectError {
    /// The program has no attached shader objects (opaque or foreign program).
    #[error("program has no attached shader stages")]
    NoAttachedShaders,

    /// The stream cannot report shader sources for this program.
    #[error("shader source unavailable: {0}")]
    SourceUnavailable(String),
}

/// Failure to resolve whether a program belongs to the target pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifyError {
    #[error(transparent)]
    Introspect(#[from] IntrospectError),

    /// The configured stage is not attached to this program.
    #[error("no shader stage at attachment index {index} ({attached} attached)")]
    StageMissing { index: usize, attached: usize },

    /// The program has no fragment stage to inspect.
    #[error("program has no fragment stage")]
    NoFragmentStage,
}

/// Errors from installing or removing a call-stream observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TapError {
    #[error("an observer is already installed on this call stream")]
    AlreadyInstalled,
}

/// Errors raised by the capture service and its surface backend.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No low-level graphics handle was available at arm/init time.
    #[error("graphics context unavailable")]
    ContextUnavailable,

    /// The host does not expose the call-stream hook point.
    #[error("host does not expose the required hook point: {0}")]
    HostCapabilityMissing(&'static str),

    /// A debug capture is already armed.
    #[error("a debug capture is already armed")]
    AlreadyArmed,

    /// The service was initialized twice without an intervening teardown.
    #[error("capture service already active")]
    AlreadyActive,

    #[error(transparent)]
    Tap(#[from] TapError),

    /// The render target was released before it could be read.
    #[error("render target is no longer alive")]
    StaleTarget,

    /// Source and destination surfaces cannot be copied between.
    #[error("surface format mismatch: source {source_format}, destination {destination_format}")]
    FormatMismatch {
        source_format: String,
        destination_format: String,
    },

    /// Copies need matching sample counts; readback needs a single sample.
    #[error("sample count mismatch: source {source_samples}, destination {destination_samples}")]
    SampleCountMismatch {
        source_samples: u32,
        destination_samples: u32,
    },

    /// The source surface was not created with copy-source usage.
    #[error("render target does not allow copies")]
    TargetNotCopyable,

    /// Readback of a format the debug encoder does not handle.
    #[error("unsupported pixel format for readback: {0}")]
    UnsupportedFormat(String),

    /// Backend-specific failure (allocation, mapping, submission).
    #[error("backend error: {0}")]
    Backend(String),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors loading or saving [`CaptureSettings`](crate::settings::CaptureSettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for capture operations.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
