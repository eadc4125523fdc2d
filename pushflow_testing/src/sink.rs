//! Sinks that record what they receive.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pushflow::{
    demand::{DemandCounter, Sink, SourceSlot, UNBOUNDED},
    flow::SourceHandle,
};

/// [`Sink`] collecting delivered messages in memory.
///
/// Demand is credit based, as with
/// [`ChannelSink`](pushflow::demand::ChannelSink), but delivered messages are
/// kept in a vector for inspection.
pub struct RecordingSink<M> {
    received: Mutex<Vec<M>>,
    demand: DemandCounter,
    source: SourceSlot<M>,
    removals: Mutex<usize>,
}

impl<M> std::fmt::Debug for RecordingSink<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSink")
            .field("demand", &self.demand)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<M: Send + 'static> RecordingSink<M> {
    /// Create a sink with no demand.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
            demand: DemandCounter::new(),
            source: SourceSlot::new(),
            removals: Mutex::new(0),
        })
    }

    /// Create a sink that accepts everything.
    #[must_use]
    pub fn unbounded() -> Arc<Self> {
        let sink = Self::new();
        sink.demand.grant(UNBOUNDED);
        sink
    }

    /// Grant `n` credits without notifying the source.
    pub fn add_credit(&self, n: u64) { self.demand.grant(n); }

    /// Grant `n` credits and ask the bound source for more.
    pub fn grant(&self, n: u64) {
        self.demand.grant(n);
        self.source.request_more();
    }

    /// Withdraw demand permanently.
    pub fn cancel(&self) { self.demand.cancel(); }

    /// Detach from the bound source.
    pub fn detach(&self) -> bool { self.source.remove() }

    /// Returns `true` while a source is installed.
    #[must_use]
    pub fn is_bound(&self) -> bool { self.source.is_bound() }

    /// The installed source handle, if any.
    #[must_use]
    pub fn source(&self) -> Option<SourceHandle<M>> { self.source.current() }

    /// Number of times [`Sink::remove_source`] was called.
    #[must_use]
    pub fn removals(&self) -> usize { *lock(&self.removals) }

    /// Number of messages received so far.
    #[must_use]
    pub fn len(&self) -> usize { lock(&self.received).len() }

    /// Returns `true` if nothing has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool { lock(&self.received).is_empty() }

    /// Take every message received so far, in delivery order.
    #[must_use]
    pub fn take(&self) -> Vec<M> { std::mem::take(&mut *lock(&self.received)) }

    /// As a trait object for binding.
    #[must_use]
    pub fn as_sink(self: &Arc<Self>) -> Arc<dyn Sink<M>> {
        Arc::clone(self) as Arc<dyn Sink<M>>
    }
}

impl<M: Clone + Send + 'static> RecordingSink<M> {
    /// Copy of every message received so far, in delivery order.
    #[must_use]
    pub fn received(&self) -> Vec<M> { lock(&self.received).clone() }
}

impl<M: Send + 'static> Sink<M> for RecordingSink<M> {
    fn has_demand(&self) -> bool { self.demand.has_demand() }

    fn set_source(&self, source: SourceHandle<M>) { self.source.set(source); }

    fn remove_source(&self) {
        *lock(&self.removals) += 1;
        self.source.remove();
    }

    fn accept(&self, message: M) {
        self.demand.try_consume();
        lock(&self.received).push(message);
    }
}
