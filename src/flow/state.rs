//! Binding lifecycle state.

use crate::sync::{AtomicU8, Ordering};

/// Lifecycle phase of a flow controller's binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No sink is bound; produced messages are buffered.
    Unbound,
    /// A sink is bound and no drain pass is running.
    Bound,
    /// A drain pass is delivering buffered messages.
    Draining,
    /// The source has terminated. No transitions leave this phase.
    Terminated,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Phase::Bound,
            2 => Phase::Draining,
            3 => Phase::Terminated,
            _ => Phase::Unbound,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Phase::Unbound => 0,
            Phase::Bound => 1,
            Phase::Draining => 2,
            Phase::Terminated => 3,
        }
    }
}

/// Atomic cell tracking progress through the binding lifecycle.
///
/// Readers never take the controller lock, so [`Phase`] can be observed from
/// any thread without contending with delivery.
#[derive(Debug)]
pub(super) struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub(super) fn new() -> Self { Self(AtomicU8::new(Phase::Unbound.as_u8())) }

    pub(super) fn get(&self) -> Phase { Phase::from_u8(self.0.load(Ordering::Acquire)) }

    /// Move from `from` to `to`. Returns `false` if the phase was different.
    fn transition(&self, from: Phase, to: Phase) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// A sink was bound. Ignored once terminated.
    pub(super) fn bind(&self) {
        let _ = self.transition(Phase::Unbound, Phase::Bound)
            || self.transition(Phase::Draining, Phase::Bound);
    }

    /// The binding was removed. Ignored once terminated.
    pub(super) fn unbind(&self) {
        let _ = self.transition(Phase::Bound, Phase::Unbound)
            || self.transition(Phase::Draining, Phase::Unbound);
    }

    /// A drain pass starts. Only a bound controller drains.
    pub(super) fn begin_drain(&self) -> bool { self.transition(Phase::Bound, Phase::Draining) }

    /// A drain pass finished. If the binding was removed mid-pass the phase
    /// has already moved on and is left untouched.
    pub(super) fn end_drain(&self) { let _ = self.transition(Phase::Draining, Phase::Bound); }

    /// Enter the terminal phase.
    pub(super) fn terminate(&self) {
        self.0.store(Phase::Terminated.as_u8(), Ordering::Release);
    }

    pub(super) fn is_terminated(&self) -> bool { self.get() == Phase::Terminated }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn starts_unbound() {
        assert_eq!(PhaseCell::new().get(), Phase::Unbound);
    }

    #[rstest]
    fn drain_round_trip_returns_to_bound() {
        let phase = PhaseCell::new();
        phase.bind();
        assert!(phase.begin_drain());
        assert_eq!(phase.get(), Phase::Draining);
        phase.end_drain();
        assert_eq!(phase.get(), Phase::Bound);
    }

    #[rstest]
    fn unbound_controller_does_not_drain() {
        let phase = PhaseCell::new();
        assert!(!phase.begin_drain());
        assert_eq!(phase.get(), Phase::Unbound);
    }

    #[rstest]
    fn unbind_during_drain_wins() {
        let phase = PhaseCell::new();
        phase.bind();
        assert!(phase.begin_drain());
        phase.unbind();
        phase.end_drain();
        assert_eq!(phase.get(), Phase::Unbound);
    }

    #[rstest]
    fn termination_is_final() {
        let phase = PhaseCell::new();
        phase.bind();
        phase.terminate();
        phase.bind();
        phase.unbind();
        assert!(!phase.begin_drain());
        assert!(phase.is_terminated());
    }
}
