//! Directory of open message sources.
//!
//! A decoder task owns its [`FlowController`]; consumers elsewhere, such as a
//! subscription manager, find the source by [`SourceId`] and attach a sink to
//! it. The directory never keeps a source open: entries hold weak references
//! and a source counts as open only while some controller handle exists and it
//! has not terminated. Closed entries are swept whenever a lookup meets them
//! and by [`SourceRegistry::sweep`].

use std::sync::{
    Arc,
    Weak,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::{
    demand::Sink,
    flow::{FlowController, Phase, Shared},
};

/// Identifier assigned to a message source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl From<u64> for SourceId {
    fn from(value: u64) -> Self { Self(value) }
}

impl SourceId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }

    /// Allocate a process-unique identifier.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

fn open<M: Send + 'static>(entry: &Weak<Shared<M>>) -> Option<Arc<Shared<M>>> {
    entry.upgrade().filter(|shared| !shared.is_terminated())
}

/// Concurrent directory of open sources keyed by [`SourceId`].
pub struct SourceRegistry<M: Send + 'static> {
    sources: DashMap<SourceId, Weak<Shared<M>>>,
}

impl<M: Send + 'static> Default for SourceRegistry<M> {
    fn default() -> Self {
        Self {
            sources: DashMap::new(),
        }
    }
}

impl<M: Send + 'static> std::fmt::Debug for SourceRegistry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("entries", &self.sources.len())
            .finish()
    }
}

impl<M: Send + 'static> SourceRegistry<M> {
    /// Publish `controller` under its own identifier.
    ///
    /// Returns `false`, and records nothing, when the source has already
    /// terminated.
    pub fn register(&self, controller: &FlowController<M>) -> bool {
        if controller.phase() == Phase::Terminated {
            return false;
        }
        self.sources.insert(controller.id(), controller.downgrade());
        true
    }

    /// Find the open source registered as `id`.
    ///
    /// An entry whose source was dropped or terminated is removed on the way.
    pub fn lookup(&self, id: &SourceId) -> Option<FlowController<M>> {
        let shared = self.sources.get(id).and_then(|entry| open(entry.value()));
        if shared.is_none() {
            self.sources.remove_if(id, |_, entry| open(entry).is_none());
        }
        shared.map(FlowController::from_arc)
    }

    /// Bind `sink` to the open source registered as `id`.
    ///
    /// Returns `false` when no such source is open or the bind was refused.
    /// Anything the source buffered while unbound flows to `sink` straight
    /// away, as far as its demand allows.
    pub fn attach(&self, id: &SourceId, sink: Arc<dyn Sink<M>>) -> bool {
        self.lookup(id).is_some_and(|controller| controller.bind(sink))
    }

    /// Forget `id` without touching the source itself.
    pub fn retire(&self, id: &SourceId) { self.sources.remove(id); }

    /// Number of entries, including closed ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize { self.sources.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.sources.is_empty() }

    /// Drop every entry whose source was dropped or terminated.
    ///
    /// `DashMap::retain` write-locks each shard in turn, so concurrent
    /// lookups may wait briefly.
    pub fn sweep(&self) { self.sources.retain(|_, entry| open(entry).is_some()); }

    /// Sweep, then list the identifiers of the open sources.
    #[must_use]
    pub fn open_ids(&self) -> Vec<SourceId> {
        let mut ids = Vec::with_capacity(self.sources.len());
        self.sources.retain(|id, entry| {
            let keep = open(entry).is_some();
            if keep {
                ids.push(*id);
            }
            keep
        });
        ids.sort_unstable();
        ids
    }

    /// Sweep, then hand out a controller for each open source.
    #[must_use]
    pub fn open_controllers(&self) -> Vec<FlowController<M>> {
        let mut controllers = Vec::with_capacity(self.sources.len());
        self.sources.retain(|_, entry| match open(entry) {
            Some(shared) => {
                controllers.push(FlowController::from_arc(shared));
                true
            }
            None => false,
        });
        controllers
    }
}
