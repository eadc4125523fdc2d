//! Holder for the source a sink is currently bound to.

use super::Source;
use crate::{
    flow::SourceHandle,
    sync::{Mutex, lock},
};

/// Reassignable reference from a sink to at most one source.
///
/// Embedding a `SourceSlot` gives a [`Sink`](super::Sink) implementation the
/// expected binding semantics: installing a new source detaches the previous
/// one and removing the source detaches it from its flow controller.
#[derive(Debug)]
pub struct SourceSlot<M> {
    current: Mutex<Option<SourceHandle<M>>>,
}

impl<M> Default for SourceSlot<M> {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl<M: Send + 'static> SourceSlot<M> {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Install `source`, detaching any different source held previously.
    pub fn set(&self, source: SourceHandle<M>) {
        let previous = lock(&self.current).replace(source.clone());
        match previous {
            Some(previous) if !previous.same_binding(&source) => {
                previous.detach();
            }
            _ => {}
        }
    }

    /// Clear the slot and detach the source it held.
    ///
    /// Returns `true` if a source was present.
    pub fn remove(&self) -> bool {
        let previous = lock(&self.current).take();
        previous.map(|source| source.detach()).is_some()
    }

    /// Forward a demand signal to the bound source, if any.
    pub fn request_more(&self) {
        let source = lock(&self.current).clone();
        if let Some(source) = source {
            source.request_more();
        }
    }

    /// Returns `true` while the installed source's binding is still live.
    ///
    /// A handle whose controller was dropped, terminated, or rebound does not
    /// count.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        lock(&self.current)
            .as_ref()
            .is_some_and(SourceHandle::is_current)
    }

    /// Clone the bound source handle.
    #[must_use]
    pub fn current(&self) -> Option<SourceHandle<M>> { lock(&self.current).clone() }
}
