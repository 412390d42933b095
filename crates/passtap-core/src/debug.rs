//! One-shot debug capture: the extract-and-disarm end-of-pass strategy.
//!
//! This is the only path that reads pixels back to the CPU. On its single
//! end-of-pass it reads the target, encodes a PNG, hands it to a
//! [`Presenter`], and detaches from the tap. The [`ArmedGuard`] is cleared
//! when the strategy is dropped, whichever way the attempt ended.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use image::{ImageFormat, RgbaImage};

use crate::detector::{EndOfPass, PassHandler};
use crate::diagnostics::{Diagnostics, FailureClass};
use crate::error::{CaptureError, CaptureResult};
use crate::surface::SurfaceBackend;
use crate::tap::TapControl;

/// Mutual exclusion for debug captures. Owned by the capture service.
#[derive(Debug, Clone, Default)]
pub struct ArmedGuard {
    armed: Arc<AtomicBool>,
}

impl ArmedGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the guard. `None` if a capture is already armed.
    pub fn try_arm(&self) -> Option<ArmToken> {
        self.armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ArmToken {
                armed: Arc::clone(&self.armed),
            })
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

/// Proof of arming; clears the guard when dropped.
#[derive(Debug)]
pub struct ArmToken {
    armed: Arc<AtomicBool>,
}

impl Drop for ArmToken {
    fn drop(&mut self) {
        self.armed.store(false, Ordering::Release);
    }
}

/// Encode an image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> CaptureResult<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Encode an image as a `data:image/png;base64,` URL.
pub fn to_data_url(image: &RgbaImage) -> CaptureResult<String> {
    let png = encode_png(image)?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}

/// Makes a captured image viewable.
pub trait Presenter: Send {
    fn present(&mut self, image: &RgbaImage) -> CaptureResult<()>;
}

/// Writes `pass-capture-<millis>.png` into a directory.
#[derive(Debug, Clone)]
pub struct PngFilePresenter {
    dir: PathBuf,
    last_written: Option<PathBuf>,
}

impl PngFilePresenter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_written: None,
        }
    }

    pub fn last_written(&self) -> Option<&Path> {
        self.last_written.as_deref()
    }
}

impl Presenter for PngFilePresenter {
    fn present(&mut self, image: &RgbaImage) -> CaptureResult<()> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let path = self.dir.join(format!("pass-capture-{millis}.png"));

        std::fs::create_dir_all(&self.dir).map_err(|source| CaptureError::Write {
            path: self.dir.clone(),
            source,
        })?;
        let png = encode_png(image)?;
        std::fs::write(&path, png).map_err(|source| CaptureError::Write {
            path: path.clone(),
            source,
        })?;

        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "debug capture written"
        );
        self.last_written = Some(path);
        Ok(())
    }
}

/// Hands a `data:` URL to a callback, e.g. a host that opens it in a viewer.
pub struct DataUrlPresenter<F>(pub F);

impl<F> Presenter for DataUrlPresenter<F>
where
    F: FnMut(String) + Send,
{
    fn present(&mut self, image: &RgbaImage) -> CaptureResult<()> {
        let url = to_data_url(image)?;
        (self.0)(url);
        Ok(())
    }
}

/// Extract-and-disarm strategy. Fires at most once.
pub struct DebugCapture<B: SurfaceBackend> {
    backend: B,
    presenter: Box<dyn Presenter>,
    diagnostics: Diagnostics,
    _token: ArmToken,
}

impl<B: SurfaceBackend> DebugCapture<B> {
    pub fn new(
        backend: B,
        presenter: Box<dyn Presenter>,
        diagnostics: Diagnostics,
        token: ArmToken,
    ) -> Self {
        Self {
            backend,
            presenter,
            diagnostics,
            _token: token,
        }
    }

    fn extract(&mut self, event: &EndOfPass<B::Target>) -> CaptureResult<()> {
        let target = event.target.as_ref().ok_or(CaptureError::StaleTarget)?;
        let image = self.backend.read_pixels(target)?;
        self.presenter.present(&image)
    }
}

impl<B: SurfaceBackend> PassHandler<B::Target> for DebugCapture<B> {
    fn pass_ended(&mut self, event: EndOfPass<B::Target>) -> TapControl {
        match self.extract(&event) {
            Ok(()) => tracing::info!(draws = event.draw_count, "debug capture complete"),
            Err(err) => {
                self.diagnostics.report(
                    FailureClass::DebugReadback,
                    format_args!("debug capture failed: {err}"),
                );
            }
        }
        TapControl::Detach
    }
}
