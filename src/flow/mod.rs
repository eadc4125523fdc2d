//! Demand-aware delivery of push messages from one source to one sink.
//!
//! A [`FlowController`] sits between the decoder that produces messages and
//! the [`Sink`] consuming them. For every produced message it decides whether
//! to deliver immediately or park the message in a [`PendingBuffer`]; when the
//! sink signals new demand through [`Source::request_more`] it drains the
//! buffer while demand lasts. Delivery order always matches production order.
//!
//! # Locking
//!
//! Two mutexes guard the controller's shared state:
//!
//! - the *delivery lock* protects the pending buffer and is held for every
//!   `Sink::has_demand`/`Sink::accept` call, which serialises deliveries and
//!   keeps them FIFO whichever thread performs them;
//! - the *binding lock* protects the current binding and is never held while
//!   calling into a sink.
//!
//! Lock order is delivery → binding. `request_more` only ever *tries* the
//! delivery lock and leaves a drain request for the current holder when the
//! lock is busy, so sinks may call it re-entrantly from inside `accept`.
//! Every binding change bumps an atomic epoch; a [`SourceHandle`] issued for
//! an older epoch is inert, and a drain pass stops as soon as the epoch it
//! started with is no longer current.

mod builder;
mod dlq;
mod errors;
mod state;
mod stats;

use std::{
    fmt,
    num::NonZeroUsize,
    sync::{Arc, Weak},
    time::Duration,
};

pub use builder::FlowControllerBuilder;
use dlq::{DeadLetters, LogThrottle};
pub use errors::{FlowConfigError, FlowError};
pub use state::Phase;
use state::PhaseCell;
use static_assertions::const_assert;
pub use stats::FlowStats;
use stats::StatsCell;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    adapter::{ReadControl, ReadGate},
    buffer::{Admission, OverflowPolicy, PendingBuffer},
    demand::{Sink, Source},
    metrics::{self, DeliveryPath, DiscardReason},
    registry::SourceId,
    sync::{AtomicBool, AtomicU64, AtomicUsize, Mutex, MutexGuard, Ordering, lock, try_lock},
};

/// Default pending buffer capacity.
pub const DEFAULT_CAPACITY: usize = 1024;
// Log every lost dead letter by default so problems surface immediately.
const DEFAULT_DLQ_LOG_EVERY_N: usize = 1;
const DEFAULT_DLQ_LOG_INTERVAL: Duration = Duration::from_secs(10);

const_assert!(DEFAULT_CAPACITY > 0);
const_assert!(DEFAULT_DLQ_LOG_EVERY_N > 0);

/// What happens to buffered messages when the source terminates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TerminationPolicy {
    /// Run a final drain pass honouring current demand, then discard whatever
    /// is left.
    #[default]
    Flush,
    /// Discard every buffered message without delivering.
    Discard,
}

/// Outcome of [`FlowController::terminate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TerminationReport {
    /// Messages delivered by the final drain pass.
    pub delivered: usize,
    /// Messages discarded because no demand remained.
    pub discarded: usize,
}

/// Result of offering a message to a [`FlowController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    /// Delivered straight to the sink.
    Delivered,
    /// Appended to the pending buffer.
    Buffered,
    /// Appended after evicting the oldest buffered message.
    Evicted,
    /// Appended, but the buffer is at or beyond capacity and the decoder
    /// should pause.
    Saturated,
}

impl Offer {
    /// Returns `true` when the decoder should stop reading.
    #[must_use]
    pub fn should_pause(self) -> bool { matches!(self, Offer::Saturated) }
}

/// Configuration for building a [`FlowController`].
#[derive(Debug, Clone)]
pub struct FlowConfig<M> {
    /// Pending buffer capacity; `None` for an unbounded buffer.
    pub capacity: Option<usize>,
    /// Policy applied when a bounded buffer is full.
    pub overflow: OverflowPolicy,
    /// Fate of buffered messages when the source terminates.
    pub termination: TerminationPolicy,
    /// Dead-letter queue for evicted, rejected, and discarded messages.
    pub dlq: Option<mpsc::Sender<M>>,
    /// Warn on every `n`th lost dead letter or overflow.
    pub dlq_log_every_n: usize,
    /// Warn at least once per interval while losses continue.
    pub dlq_log_interval: Duration,
}

impl<M> Default for FlowConfig<M> {
    fn default() -> Self { Self::new(Some(DEFAULT_CAPACITY), OverflowPolicy::default()) }
}

impl<M> FlowConfig<M> {
    /// Create a configuration with default termination and logging settings.
    #[must_use]
    pub fn new(capacity: Option<usize>, overflow: OverflowPolicy) -> Self {
        Self {
            capacity,
            overflow,
            termination: TerminationPolicy::default(),
            dlq: None,
            dlq_log_every_n: DEFAULT_DLQ_LOG_EVERY_N,
            dlq_log_interval: DEFAULT_DLQ_LOG_INTERVAL,
        }
    }
}

struct Binding<M> {
    sink: Weak<dyn Sink<M>>,
    epoch: u64,
}

/// State shared by a controller, its clones, and the handles it issues.
pub(crate) struct Shared<M> {
    id: SourceId,
    pending: Mutex<PendingBuffer<M>>,
    pending_len: AtomicUsize,
    binding: Mutex<Option<Binding<M>>>,
    epoch: AtomicU64,
    drain_requested: AtomicBool,
    phase: PhaseCell,
    termination: TerminationPolicy,
    dead_letters: DeadLetters<M>,
    overflow_warnings: LogThrottle,
    stats: StatsCell,
    gate: Arc<ReadGate>,
    read_control: Option<Arc<dyn ReadControl>>,
}

impl<M: Send + 'static> Shared<M> {
    /// Upgrade the bound sink together with the epoch it was bound at.
    ///
    /// A sink dropped without detaching is unbound here.
    fn live_sink(&self) -> Option<(Arc<dyn Sink<M>>, u64)> {
        let mut slot = lock(&self.binding);
        let binding = slot.as_ref()?;
        if let Some(sink) = binding.sink.upgrade() {
            return Some((sink, binding.epoch));
        }
        self.clear_binding(&mut slot);
        debug!(source = %self.id, "bound sink dropped; binding cleared");
        None
    }

    /// Remove the binding held in `slot`, invalidating every handle issued for
    /// it. Must be called with the binding lock held.
    fn clear_binding(&self, slot: &mut Option<Binding<M>>) -> Option<Weak<dyn Sink<M>>> {
        let binding = slot.take()?;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.phase.unbind();
        metrics::dec_bindings();
        Some(binding.sink)
    }

    pub(crate) fn is_terminated(&self) -> bool { self.phase.is_terminated() }

    fn is_current(&self, epoch: u64) -> bool { self.epoch.load(Ordering::Acquire) == epoch }

    /// Ask for a drain pass without blocking.
    fn request_drain(&self) {
        self.drain_requested.store(true, Ordering::SeqCst);
        if let Some(pending) = try_lock(&self.pending) {
            self.release(pending);
        }
    }

    /// Serve outstanding drain requests, then release the delivery lock.
    ///
    /// A request raised after the final check is picked up by its requester,
    /// which finds the lock free.
    fn release<'a>(&'a self, mut pending: MutexGuard<'a, PendingBuffer<M>>) {
        loop {
            while self.drain_requested.swap(false, Ordering::SeqCst) {
                self.drain(&mut pending);
            }
            self.update_gate(&pending);
            self.pending_len.store(pending.len(), Ordering::Release);
            drop(pending);
            if !self.drain_requested.load(Ordering::SeqCst) {
                return;
            }
            match try_lock(&self.pending) {
                Some(next) => pending = next,
                None => return,
            }
        }
    }

    /// Deliver buffered messages while the bound sink has demand.
    ///
    /// Returns the number of messages delivered.
    fn drain(&self, pending: &mut PendingBuffer<M>) -> usize {
        if pending.is_empty() || self.phase.is_terminated() {
            return 0;
        }
        let Some((sink, epoch)) = self.live_sink() else {
            return 0;
        };
        let draining = self.phase.begin_drain();
        let mut delivered = 0;
        while !pending.is_empty() && self.is_current(epoch) && sink.has_demand() {
            let Some(message) = pending.pop() else {
                break;
            };
            sink.accept(message);
            self.stats.delivered(DeliveryPath::Drained);
            self.pending_len.store(pending.len(), Ordering::Release);
            delivered += 1;
        }
        if draining {
            self.phase.end_drain();
        }
        if delivered > 0 {
            debug!(source = %self.id, delivered, remaining = pending.len(), "drained pending messages");
        }
        delivered
    }

    fn enqueue(&self, pending: &mut PendingBuffer<M>, message: M) -> Result<Offer, FlowError> {
        let policy = pending.policy();
        match pending.push(message) {
            Admission::Queued => {
                self.stats.buffered();
                Ok(Offer::Buffered)
            }
            Admission::Saturated => {
                self.stats.buffered();
                self.stats.saturated();
                if pending
                    .capacity()
                    .is_some_and(|capacity| pending.len() > capacity.get())
                {
                    self.overflowed(policy, pending.len());
                }
                Ok(Offer::Saturated)
            }
            Admission::Evicted(oldest) => {
                self.stats.buffered();
                self.overflowed(policy, pending.len());
                self.stats.discarded(DiscardReason::Evicted, 1);
                self.dead_letters.route(oldest, DiscardReason::Evicted);
                Ok(Offer::Evicted)
            }
            Admission::Rejected(message) => {
                self.overflowed(policy, pending.len());
                self.stats.discarded(DiscardReason::Rejected, 1);
                self.dead_letters.route(message, DiscardReason::Rejected);
                Err(FlowError::BufferFull)
            }
        }
    }

    fn overflowed(&self, policy: OverflowPolicy, pending: usize) {
        metrics::inc_overflow(policy);
        if let Some(overflows) = self.overflow_warnings.record() {
            warn!(source = %self.id, %policy, pending, overflows, "pending buffer full");
        }
    }

    /// Close or open the read gate to match buffer saturation.
    fn update_gate(&self, pending: &PendingBuffer<M>) {
        if pending.policy() != OverflowPolicy::Backpressure || self.phase.is_terminated() {
            return;
        }
        if pending.is_full() {
            if self.gate.close() {
                debug!(source = %self.id, pending = pending.len(), "pausing decoder");
                if let Some(control) = &self.read_control {
                    control.pause();
                }
            }
        } else {
            self.open_gate();
        }
    }

    fn open_gate(&self) {
        if self.gate.open() {
            debug!(source = %self.id, "resuming decoder");
            if let Some(control) = &self.read_control {
                control.resume();
            }
        }
    }
}

impl<M> Drop for Shared<M> {
    fn drop(&mut self) {
        if lock(&self.binding).is_some() {
            metrics::dec_bindings();
        }
    }
}

/// Binds a message source to at most one sink and mediates demand.
///
/// Cloning yields another reference to the same controller.
pub struct FlowController<M: Send + 'static>(Arc<Shared<M>>);

impl<M: Send + 'static> Clone for FlowController<M> {
    fn clone(&self) -> Self { Self(Arc::clone(&self.0)) }
}

impl<M: Send + 'static> fmt::Debug for FlowController<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowController")
            .field("id", &self.0.id)
            .field("phase", &self.phase())
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

impl<M: Send + 'static> FlowController<M> {
    /// Start building a new controller.
    #[must_use]
    pub fn builder() -> FlowControllerBuilder<M> { FlowControllerBuilder::default() }

    /// Build a controller from a plain configuration value.
    ///
    /// # Errors
    ///
    /// Returns [`FlowConfigError`] for a zero capacity or log cadence.
    pub fn with_config(config: FlowConfig<M>) -> Result<Self, FlowConfigError> {
        Self::build_with_config(config, None)
    }

    pub(super) fn build_with_config(
        config: FlowConfig<M>,
        read_control: Option<Arc<dyn ReadControl>>,
    ) -> Result<Self, FlowConfigError> {
        let FlowConfig {
            capacity,
            overflow,
            termination,
            dlq,
            dlq_log_every_n,
            dlq_log_interval,
        } = config;
        if dlq_log_every_n == 0 {
            return Err(FlowConfigError::InvalidLogCadence);
        }
        let buffer = match capacity {
            None => PendingBuffer::unbounded(),
            Some(capacity) => {
                let capacity =
                    NonZeroUsize::new(capacity).ok_or(FlowConfigError::InvalidCapacity(capacity))?;
                PendingBuffer::bounded(capacity, overflow)
            }
        };
        let shared = Shared {
            id: SourceId::next(),
            pending: Mutex::new(buffer),
            pending_len: AtomicUsize::new(0),
            binding: Mutex::new(None),
            epoch: AtomicU64::new(0),
            drain_requested: AtomicBool::new(false),
            phase: PhaseCell::new(),
            termination,
            dead_letters: DeadLetters::new(dlq, dlq_log_every_n, dlq_log_interval),
            overflow_warnings: LogThrottle::new(dlq_log_every_n, dlq_log_interval),
            stats: StatsCell::new(),
            gate: Arc::new(ReadGate::new()),
            read_control,
        };
        Ok(Self(Arc::new(shared)))
    }

    /// Identifier of this source.
    #[must_use]
    pub fn id(&self) -> SourceId { self.0.id }

    /// Current binding phase.
    #[must_use]
    pub fn phase(&self) -> Phase { self.0.phase.get() }

    /// Returns `true` while a binding exists.
    ///
    /// A sink dropped without detaching still counts until the controller
    /// next looks for it.
    #[must_use]
    pub fn is_bound(&self) -> bool { lock(&self.0.binding).is_some() }

    /// Number of buffered messages as of the last completed operation.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.0.pending_len.load(Ordering::Acquire) }

    /// Copy of the buffered messages, oldest first.
    ///
    /// Takes the delivery lock; must not be called from inside a sink
    /// callback.
    #[must_use]
    pub fn pending_messages(&self) -> Vec<M>
    where
        M: Clone,
    {
        lock(&self.0.pending).iter().cloned().collect()
    }

    /// Snapshot of delivery and discard counters.
    #[must_use]
    pub fn stats(&self) -> FlowStats { self.0.stats.snapshot() }

    /// Gate an async decoder waits on while the buffer is saturated.
    #[must_use]
    pub fn read_gate(&self) -> &Arc<ReadGate> { &self.0.gate }

    /// Bind `sink`, superseding any current binding.
    ///
    /// The previous sink, if different, has its source removed. `sink`
    /// receives a fresh [`SourceHandle`] through [`Sink::set_source`] and a
    /// drain pass delivers buffered messages it has demand for.
    ///
    /// Returns `false` without binding once the controller has terminated.
    pub fn bind(&self, sink: Arc<dyn Sink<M>>) -> bool {
        let shared = &self.0;
        let (handle, previous) = {
            let mut slot = lock(&shared.binding);
            if shared.phase.is_terminated() {
                debug!(source = %shared.id, "bind ignored; source terminated");
                return false;
            }
            let previous = shared.clear_binding(&mut slot);
            let epoch = shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            *slot = Some(Binding {
                sink: Arc::downgrade(&sink),
                epoch,
            });
            shared.phase.bind();
            metrics::inc_bindings();
            (
                SourceHandle {
                    shared: Arc::downgrade(shared),
                    epoch,
                    id: shared.id,
                },
                previous,
            )
        };
        debug!(source = %shared.id, epoch = handle.epoch, "sink bound");
        let superseded = previous
            .and_then(|weak| weak.upgrade())
            .filter(|previous| !std::ptr::addr_eq(Arc::as_ptr(previous), Arc::as_ptr(&sink)));
        if let Some(previous) = superseded {
            previous.remove_source();
        }
        sink.set_source(handle);
        shared.request_drain();
        true
    }

    /// Remove the current binding.
    ///
    /// The unbound sink has [`Sink::remove_source`] called on it. Buffered
    /// messages stay buffered for the next binding. Returns `false` when
    /// nothing was bound.
    pub fn unbind(&self) -> bool {
        let previous = {
            let mut slot = lock(&self.0.binding);
            self.0.clear_binding(&mut slot)
        };
        let Some(previous) = previous else {
            return false;
        };
        debug!(source = %self.0.id, "sink unbound");
        if let Some(sink) = previous.upgrade() {
            sink.remove_source();
        }
        true
    }

    /// Offer one produced message.
    ///
    /// Buffered messages are drained first. The message is then delivered
    /// immediately when nothing is left buffered and the sink has demand;
    /// otherwise it is buffered behind earlier ones, which is the only point
    /// where the overflow policy applies.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::BufferFull`] when a full buffer rejects the
    /// message under [`OverflowPolicy::RejectNewest`] and
    /// [`FlowError::Terminated`] after [`terminate`](Self::terminate). The
    /// message is routed to the dead-letter queue in the first case and
    /// dropped in the second.
    pub fn offer(&self, message: M) -> Result<Offer, FlowError> {
        let shared = &*self.0;
        let mut pending = lock(&shared.pending);
        if shared.phase.is_terminated() {
            drop(pending);
            debug!(source = %shared.id, "offer after termination dropped");
            return Err(FlowError::Terminated);
        }
        // Serve demand that arrived without a signal before the overflow
        // policy gets a say.
        if !pending.is_empty() {
            shared.drain(&mut pending);
        }
        let ready = if pending.is_empty() {
            shared.live_sink().filter(|(sink, _)| sink.has_demand())
        } else {
            None
        };
        if let Some((sink, _)) = ready {
            sink.accept(message);
            shared.stats.delivered(DeliveryPath::Immediate);
            shared.release(pending);
            return Ok(Offer::Delivered);
        }
        let result = shared.enqueue(&mut pending, message);
        shared.drain_requested.store(true, Ordering::SeqCst);
        shared.release(pending);
        result
    }

    /// Terminate the source.
    ///
    /// Applies the configured [`TerminationPolicy`] to buffered messages,
    /// routes discarded ones to the dead-letter queue, clears the binding,
    /// and reopens the read gate. Later offers fail with
    /// [`FlowError::Terminated`]. Calling it again returns an empty report.
    ///
    /// Takes the delivery lock; must not be called from inside a sink
    /// callback.
    pub fn terminate(&self) -> TerminationReport {
        let shared = &*self.0;
        let mut pending = lock(&shared.pending);
        if shared.phase.is_terminated() {
            return TerminationReport::default();
        }
        let delivered = match shared.termination {
            TerminationPolicy::Flush => shared.drain(&mut pending),
            TerminationPolicy::Discard => 0,
        };
        shared.phase.terminate();
        shared.drain_requested.store(false, Ordering::SeqCst);
        let leftover: Vec<M> = pending.drain_all().collect();
        shared.pending_len.store(0, Ordering::Release);
        drop(pending);

        let discarded = leftover.len();
        for message in leftover {
            shared.dead_letters.route(message, DiscardReason::Terminated);
        }
        shared
            .stats
            .discarded(DiscardReason::Terminated, discarded as u64);

        let previous = {
            let mut slot = lock(&shared.binding);
            shared.clear_binding(&mut slot)
        };
        if let Some(sink) = previous.and_then(|weak| weak.upgrade()) {
            sink.remove_source();
        }
        shared.open_gate();

        if discarded > 0 {
            warn!(
                source = %shared.id,
                policy = ?shared.termination,
                delivered,
                discarded,
                "source terminated with undelivered messages"
            );
        } else {
            debug!(source = %shared.id, delivered, "source terminated");
        }
        TerminationReport {
            delivered,
            discarded,
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared<M>> { Arc::downgrade(&self.0) }

    pub(crate) fn from_arc(shared: Arc<Shared<M>>) -> Self { Self(shared) }
}

impl<M: Send + 'static> Source for FlowController<M> {
    /// Run a drain pass for whichever sink is currently bound.
    fn request_more(&self) { self.0.request_drain(); }
}

/// A sink's reference to the source it is bound to.
///
/// The handle is weak: it neither keeps the controller alive nor outlives the
/// binding it was issued for. Once that binding is superseded or removed,
/// [`request_more`](Source::request_more) and [`detach`](Self::detach) are
/// no-ops.
pub struct SourceHandle<M> {
    shared: Weak<Shared<M>>,
    epoch: u64,
    id: SourceId,
}

impl<M> Clone for SourceHandle<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
            epoch: self.epoch,
            id: self.id,
        }
    }
}

impl<M> fmt::Debug for SourceHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle")
            .field("source", &self.id)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl<M: Send + 'static> SourceHandle<M> {
    /// Identifier of the source this handle refers to.
    #[must_use]
    pub fn id(&self) -> SourceId { self.id }

    /// Returns `true` while the binding this handle was issued for is live.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.is_current(self.epoch))
    }

    /// Returns `true` if both handles were issued for the same binding.
    #[must_use]
    pub fn same_binding(&self, other: &Self) -> bool {
        self.epoch == other.epoch && Weak::ptr_eq(&self.shared, &other.shared)
    }

    /// End the binding this handle was issued for.
    ///
    /// Once this returns the controller starts no further deliveries to the
    /// sink; a delivery already in progress on another thread may still
    /// complete. Buffered messages stay with the controller. Returns `false`
    /// if the binding had already ended.
    pub fn detach(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut slot = lock(&shared.binding);
        if !slot.as_ref().is_some_and(|binding| binding.epoch == self.epoch) {
            return false;
        }
        shared.clear_binding(&mut slot);
        drop(slot);
        debug!(source = %self.id, epoch = self.epoch, "sink detached");
        true
    }
}

impl<M: Send + 'static> Source for SourceHandle<M> {
    fn request_more(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if shared.is_current(self.epoch) {
            shared.request_drain();
        }
    }
}
