//! Consumer-facing surface: the capture handle and the one-time ready
//! notification.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::buffer::{PersistentBuffer, PersistentBufferManager};
use crate::surface::SurfaceBackend;

/// Cloneable read-only view of the persistent buffer.
///
/// Consumers must treat the returned surface as read-only; the buffer manager
/// is its only writer.
pub struct CaptureHandle<B: SurfaceBackend> {
    buffers: Arc<Mutex<PersistentBufferManager<B>>>,
    ready: Arc<AtomicBool>,
}

impl<B: SurfaceBackend> Clone for CaptureHandle<B> {
    fn clone(&self) -> Self {
        Self {
            buffers: Arc::clone(&self.buffers),
            ready: Arc::clone(&self.ready),
        }
    }
}

impl<B: SurfaceBackend> CaptureHandle<B> {
    pub(crate) fn new(backend: B) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(PersistentBufferManager::new(backend))),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The persistent buffer, or `None` before the first successful capture
    /// and after teardown.
    pub fn texture(&self) -> Option<PersistentBuffer<B::Surface>> {
        if !self.ready.load(Ordering::Acquire) {
            return None;
        }
        self.buffers.lock().current().cloned()
    }

    /// True exactly when [`texture`](Self::texture) returns a buffer.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && self.buffers.lock().is_valid()
    }

    pub(crate) fn buffers(&self) -> &Arc<Mutex<PersistentBufferManager<B>>> {
        &self.buffers
    }

    /// Set the ready flag. Returns true on the false→true transition.
    pub(crate) fn mark_ready(&self) -> bool {
        !self.ready.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn clear_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

type Subscriber<P> = Box<dyn FnOnce(P) + Send>;

struct NotifierState<P> {
    fired: Option<P>,
    subscribers: Vec<Subscriber<P>>,
}

/// Fires each subscriber exactly once per activation with the payload.
///
/// Subscribing after the notification has fired calls back immediately.
pub struct ReadyNotifier<P> {
    state: Mutex<NotifierState<P>>,
}

impl<P: Clone> Default for ReadyNotifier<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone> ReadyNotifier<P> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NotifierState {
                fired: None,
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn subscribe(&self, callback: impl FnOnce(P) + Send + 'static) {
        let payload = {
            let mut state = self.state.lock();
            match &state.fired {
                Some(payload) => payload.clone(),
                None => {
                    state.subscribers.push(Box::new(callback));
                    return;
                }
            }
        };
        callback(payload);
    }

    /// Fire the notification. Returns false if it already fired this
    /// activation.
    pub fn notify(&self, payload: P) -> bool {
        let subscribers = {
            let mut state = self.state.lock();
            if state.fired.is_some() {
                return false;
            }
            state.fired = Some(payload.clone());
            std::mem::take(&mut state.subscribers)
        };
        for subscriber in subscribers {
            subscriber(payload.clone());
        }
        true
    }

    pub fn has_fired(&self) -> bool {
        self.state.lock().fired.is_some()
    }

    /// Start a new activation: forget the payload and pending subscribers.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.fired = None;
        state.subscribers.clear();
    }
}
