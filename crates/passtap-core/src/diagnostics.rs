//! One diagnostic per failure class.
//!
//! Everything here runs inline with the host's render loop, so a failure that
//! repeats every frame must not flood the log. The first occurrence of each
//! class is logged at its class severity, repeats at `trace`.

use std::fmt::Display;
use std::sync::Arc;

use parking_lot::Mutex;

/// Failure classes, one diagnostic each per activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    ContextUnavailable,
    HostCapabilityMissing,
    UnresolvableProgram,
    StaleTarget,
    CopyFailed,
    DoubleArm,
    DebugReadback,
    BufferAllocation,
}

impl FailureClass {
    fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::ContextUnavailable | Self::HostCapabilityMissing | Self::BufferAllocation
        )
    }

    fn bit(self) -> u16 {
        1 << self as u16
    }
}

/// Shared de-duplicating reporter. Clones report into the same set.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    reported: Arc<Mutex<u16>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `message` for `class`. Returns true if this was the first report.
    pub fn report(&self, class: FailureClass, message: impl Display) -> bool {
        let first = {
            let mut reported = self.reported.lock();
            let first = *reported & class.bit() == 0;
            *reported |= class.bit();
            first
        };

        if !first {
            tracing::trace!(?class, "{message}");
        } else if class.is_fatal() {
            tracing::error!(?class, "{message}");
        } else {
            match class {
                FailureClass::UnresolvableProgram | FailureClass::StaleTarget => {
                    tracing::debug!(?class, "{message}");
                }
                _ => tracing::warn!(?class, "{message}"),
            }
        }
        first
    }

    pub fn has_reported(&self, class: FailureClass) -> bool {
        *self.reported.lock() & class.bit() != 0
    }

    /// Forget all reports, e.g. at the start of a new activation.
    pub fn reset(&self) {
        *self.reported.lock() = 0;
    }
}
