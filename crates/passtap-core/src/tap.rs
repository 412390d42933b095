//! Call-stream tap: a decorator over [`CallStream`] with a single
//! registration point for one observer.
//!
//! The tap owns the original stream. With no observer installed every call is
//! forwarded untouched, so a restored tap behaves exactly like the bare
//! stream. Observers are notified synchronously before the call is forwarded.

use crate::error::{IntrospectError, TapError};
use crate::stream::{CallStream, DrawIndexed, ShaderStage};

/// What the tap should do with an observer after notifying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapControl {
    /// Keep observing.
    Continue,
    /// Uninstall this observer before forwarding the current call.
    Detach,
}

/// Receives intercepted calls before they reach the original stream.
pub trait CallObserver<S: CallStream>: Send {
    fn on_bind_program(&mut self, stream: &S, program: Option<&S::Program>) -> TapControl;

    fn on_draw_indexed(&mut self, stream: &S, call: &DrawIndexed) -> TapControl;
}

/// Decorator that forwards every call to the wrapped stream and notifies the
/// installed observer, if any.
pub struct CallStreamTap<S: CallStream> {
    inner: S,
    observer: Option<Box<dyn CallObserver<S>>>,
}

impl<S: CallStream> CallStreamTap<S> {
    /// Wrap `inner` with nothing installed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            observer: None,
        }
    }

    /// Install `observer`. Rejected when one is already installed; the
    /// existing observer is left untouched.
    pub fn install(&mut self, observer: Box<dyn CallObserver<S>>) -> Result<(), TapError> {
        if self.observer.is_some() {
            tracing::warn!("call-stream tap already installed; restore it before installing again");
            return Err(TapError::AlreadyInstalled);
        }
        self.observer = Some(observer);
        tracing::debug!("call-stream tap installed");
        Ok(())
    }

    /// Remove the installed observer and return it. No-op when nothing is
    /// installed.
    pub fn restore(&mut self) -> Option<Box<dyn CallObserver<S>>> {
        let observer = self.observer.take();
        if observer.is_some() {
            tracing::debug!("call-stream tap restored");
        }
        observer
    }

    pub fn is_installed(&self) -> bool {
        self.observer.is_some()
    }

    /// The original stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutable access to the original stream for calls the tap does not
    /// intercept (target binds, buffer setup).
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap the original stream, dropping any installed observer.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn apply(&mut self, control: TapControl) {
        if control == TapControl::Detach {
            self.observer = None;
            tracing::debug!("observer detached itself from the call-stream tap");
        }
    }
}

impl<S: CallStream> CallStream for CallStreamTap<S> {
    type Program = S::Program;
    type Target = S::Target;
    type Output = S::Output;

    fn bind_program(&mut self, program: Option<S::Program>) -> S::Output {
        if let Some(observer) = self.observer.as_mut() {
            let control = observer.on_bind_program(&self.inner, program.as_ref());
            self.apply(control);
        }
        self.inner.bind_program(program)
    }

    fn draw_indexed(&mut self, call: DrawIndexed) -> S::Output {
        if let Some(observer) = self.observer.as_mut() {
            let control = observer.on_draw_indexed(&self.inner, &call);
            self.apply(control);
        }
        self.inner.draw_indexed(call)
    }

    fn bound_target(&self) -> Option<S::Target> {
        self.inner.bound_target()
    }

    fn attached_shaders(&self, program: &S::Program) -> Result<Vec<ShaderStage>, IntrospectError> {
        self.inner.attached_shaders(program)
    }
}
