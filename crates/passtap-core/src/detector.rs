//! Pass detector: the Idle/InPass state machine over intercepted calls.
//!
//! Transitions happen only on program binds. A bind while `InPass` first
//! ends the running pass, then the new program is evaluated, so a pass that
//! ends and a pass that begins on the same bind are both observed. Draws
//! while `InPass` count and remember the bound render target.
//!
//! What happens at the end of a pass is a [`PassHandler`] strategy: the frame
//! capture engine persists and keeps going, the debug capture extracts once
//! and detaches.

use std::sync::Arc;

use crate::diagnostics::{Diagnostics, FailureClass};
use crate::error::IdentifyError;
use crate::identify::PassIdentifier;
use crate::stream::{CallStream, DrawIndexed};
use crate::tap::{CallObserver, TapControl};

/// Whether the pipeline is currently inside the target pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassState {
    #[default]
    Idle,
    InPass,
}

/// Raised once per completed target pass.
#[derive(Debug, Clone)]
pub struct EndOfPass<T> {
    /// Render target bound at the last draw of the pass, if any draw happened.
    pub target: Option<T>,
    pub draw_count: u32,
}

/// End-of-pass strategy.
pub trait PassHandler<T>: Send {
    /// Called when the detector enters `InPass`.
    fn pass_started(&mut self) {}

    /// Called when the pass ends. Returning [`TapControl::Detach`] uninstalls
    /// the detector from the tap.
    fn pass_ended(&mut self, event: EndOfPass<T>) -> TapControl;
}

/// State machine that turns program binds and draws into pass boundaries.
pub struct PassDetector<T, H> {
    state: PassState,
    draw_count: u32,
    last_target: Option<T>,
    identifier: Arc<dyn PassIdentifier>,
    handler: H,
    diagnostics: Diagnostics,
}

impl<T, H> PassDetector<T, H>
where
    H: PassHandler<T>,
{
    pub fn new(identifier: Arc<dyn PassIdentifier>, handler: H, diagnostics: Diagnostics) -> Self {
        Self {
            state: PassState::Idle,
            draw_count: 0,
            last_target: None,
            identifier,
            handler,
            diagnostics,
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn end_pass(&mut self) -> TapControl {
        let event = EndOfPass {
            target: self.last_target.take(),
            draw_count: self.draw_count,
        };
        self.state = PassState::Idle;
        tracing::trace!(draws = event.draw_count, "target pass ended");
        self.handler.pass_ended(event)
    }

    fn begin_pass(&mut self) {
        self.state = PassState::InPass;
        self.draw_count = 0;
        self.last_target = None;
        tracing::trace!("target pass started");
        self.handler.pass_started();
    }

    /// Resolve `program` through the identifier. Failures mean "no match".
    fn is_target_program<S>(&self, stream: &S, program: &S::Program) -> bool
    where
        S: CallStream<Target = T>,
    {
        let resolved = stream
            .attached_shaders(program)
            .map_err(IdentifyError::from)
            .and_then(|stages| self.identifier.is_target_pass(&stages));

        match resolved {
            Ok(matched) => matched,
            Err(err) => {
                self.diagnostics.report(
                    FailureClass::UnresolvableProgram,
                    format_args!("program identity unresolved, treated as non-match: {err}"),
                );
                false
            }
        }
    }
}

impl<S, H> CallObserver<S> for PassDetector<S::Target, H>
where
    S: CallStream,
    S::Target: Send,
    H: PassHandler<S::Target>,
{
    fn on_bind_program(&mut self, stream: &S, program: Option<&S::Program>) -> TapControl {
        if self.state == PassState::InPass && self.end_pass() == TapControl::Detach {
            return TapControl::Detach;
        }

        if let Some(program) = program {
            if self.state == PassState::Idle && self.is_target_program(stream, program) {
                self.begin_pass();
            }
        }
        TapControl::Continue
    }

    fn on_draw_indexed(&mut self, stream: &S, _call: &DrawIndexed) -> TapControl {
        if self.state == PassState::InPass {
            self.draw_count = self.draw_count.saturating_add(1);
            self.last_target = stream.bound_target();
        }
        TapControl::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identify::SubstringIdentifier;
    use crate::tap::CallStreamTap;
    use crate::testing::{self, MockTexture, OPAQUE, OTHER, RecordingStream, TARGET};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::sync::Weak;

    type Events = Arc<Mutex<Vec<EndOfPass<Weak<MockTexture>>>>>;

    struct Recorder {
        events: Events,
        starts: Arc<Mutex<u32>>,
        detach_on_end: bool,
    }

    impl PassHandler<Weak<MockTexture>> for Recorder {
        fn pass_started(&mut self) {
            *self.starts.lock() += 1;
        }

        fn pass_ended(&mut self, event: EndOfPass<Weak<MockTexture>>) -> TapControl {
            self.events.lock().push(event);
            if self.detach_on_end {
                TapControl::Detach
            } else {
                TapControl::Continue
            }
        }
    }

    fn tapped(detach_on_end: bool) -> (CallStreamTap<RecordingStream>, Events, Diagnostics) {
        let events: Events = Arc::default();
        let diagnostics = Diagnostics::new();
        let detector = PassDetector::new(
            Arc::new(SubstringIdentifier::new(testing::TAG, Default::default())),
            Recorder {
                events: events.clone(),
                starts: Arc::default(),
                detach_on_end,
            },
            diagnostics.clone(),
        );
        let mut tap = CallStreamTap::new(RecordingStream::default());
        tap.install(Box::new(detector)).unwrap();
        (tap, events, diagnostics)
    }

    fn draws(tap: &mut CallStreamTap<RecordingStream>, n: u32) {
        for _ in 0..n {
            tap.draw_indexed(DrawIndexed::count(3));
        }
    }

    fn counts(events: &Events) -> Vec<u32> {
        events.lock().iter().map(|e| e.draw_count).collect()
    }

    #[test]
    fn other_then_target_then_other_emits_one_pass_with_last_target() {
        let (mut tap, events, _) = tapped(false);
        let scratch = testing::texture(10, 800, 600);
        let composite_a = testing::texture(11, 800, 600);
        let composite_b = testing::texture(12, 800, 600);

        tap.get_mut().bind_target(Some(scratch.clone()));
        tap.bind_program(Some(OTHER));
        draws(&mut tap, 3);

        tap.bind_program(Some(TARGET));
        tap.get_mut().bind_target(Some(composite_a.clone()));
        draws(&mut tap, 4);
        tap.get_mut().bind_target(Some(composite_b.clone()));
        draws(&mut tap, 1);
        tap.bind_program(Some(OTHER));

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].draw_count, 5);
        let target = events[0].target.as_ref().and_then(Weak::upgrade).unwrap();
        assert_eq!(target.id, 12);
    }

    #[test]
    fn back_to_back_passes_do_not_merge_counts() {
        let (mut tap, events, _) = tapped(false);
        tap.bind_program(Some(TARGET));
        draws(&mut tap, 2);
        tap.bind_program(Some(TARGET));
        draws(&mut tap, 3);
        tap.bind_program(None);

        assert_eq!(counts(&events), vec![2, 3]);
    }

    #[test]
    fn pass_without_draws_has_no_target() {
        let (mut tap, events, _) = tapped(false);
        tap.get_mut().bind_target(Some(testing::texture(1, 4, 4)));
        tap.bind_program(Some(TARGET));
        tap.bind_program(Some(OTHER));

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].draw_count, 0);
        assert!(events[0].target.is_none());
    }

    #[test]
    fn unresolvable_program_is_a_non_match() {
        let (mut tap, events, diagnostics) = tapped(false);
        tap.bind_program(Some(OPAQUE));
        draws(&mut tap, 2);
        tap.bind_program(Some(OPAQUE));
        tap.bind_program(Some(OTHER));

        assert!(events.lock().is_empty());
        assert!(diagnostics.has_reported(FailureClass::UnresolvableProgram));
        assert!(tap.is_installed());
    }

    #[test]
    fn opaque_bind_still_ends_running_pass() {
        let (mut tap, events, _) = tapped(false);
        tap.bind_program(Some(TARGET));
        draws(&mut tap, 1);
        tap.bind_program(Some(OPAQUE));
        assert_eq!(counts(&events), vec![1]);
    }

    #[test]
    fn detaching_handler_fires_once() {
        let (mut tap, events, _) = tapped(true);
        testing::run_target_pass(&mut tap, 2);
        testing::run_target_pass(&mut tap, 4);

        assert_eq!(counts(&events), vec![2]);
        assert!(!tap.is_installed());
        // Every call still reached the original stream.
        assert_eq!(tap.get_ref().calls.len(), 2 + 2 + 2 + 4);
    }

    #[test]
    fn detached_handler_does_not_start_a_new_pass_on_the_same_bind() {
        let (mut tap, events, _) = tapped(true);
        tap.bind_program(Some(TARGET));
        draws(&mut tap, 1);
        tap.bind_program(Some(TARGET));
        draws(&mut tap, 1);
        assert_eq!(counts(&events), vec![1]);
    }

    #[test]
    fn draw_count_saturates_instead_of_wrapping() {
        let events: Events = Arc::default();
        let mut detector = PassDetector::new(
            Arc::new(SubstringIdentifier::new(testing::TAG, Default::default())),
            Recorder {
                events: events.clone(),
                starts: Arc::default(),
                detach_on_end: false,
            },
            Diagnostics::new(),
        );
        let stream = RecordingStream::default();
        detector.on_bind_program(&stream, Some(&TARGET));
        detector.draw_count = u32::MAX - 1;

        for _ in 0..3 {
            detector.on_draw_indexed(&stream, &DrawIndexed::count(3));
        }
        assert_eq!(detector.draw_count(), u32::MAX);
        detector.on_bind_program(&stream, None);
        assert_eq!(counts(&events), vec![u32::MAX]);
    }

    proptest! {
        #[test]
        fn each_target_pass_reports_its_own_draw_count(
            passes in proptest::collection::vec((0u32..6, 0u32..12), 0..16)
        ) {
            let (mut tap, events, _) = tapped(false);
            for (noise, target_draws) in &passes {
                tap.bind_program(Some(OTHER));
                draws(&mut tap, *noise);
                testing::run_target_pass(&mut tap, *target_draws);
                draws(&mut tap, *noise);
            }
            let expected: Vec<u32> = passes.iter().map(|(_, n)| *n).collect();
            prop_assert_eq!(counts(&events), expected);
        }
    }
}
