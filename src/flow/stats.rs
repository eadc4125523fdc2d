//! Per-controller counters exposed to the surrounding system.

use crate::{
    metrics::{self, DeliveryPath, DiscardReason},
    sync::{AtomicU64, Ordering},
};

/// Point-in-time copy of a controller's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowStats {
    /// Messages delivered on arrival.
    pub delivered_immediately: u64,
    /// Messages delivered by drain passes.
    pub delivered_from_buffer: u64,
    /// Messages parked in the pending buffer.
    pub buffered: u64,
    /// Messages evicted by `DropOldest`.
    pub evicted: u64,
    /// Messages refused by `RejectNewest`.
    pub rejected: u64,
    /// Offers that left a `Backpressure` buffer at or over capacity.
    pub saturated: u64,
    /// Messages discarded on termination.
    pub discarded: u64,
}

impl FlowStats {
    /// Total messages handed to a sink.
    #[must_use]
    pub fn delivered(&self) -> u64 { self.delivered_immediately + self.delivered_from_buffer }
}

#[derive(Debug)]
pub(super) struct StatsCell {
    delivered_immediately: AtomicU64,
    delivered_from_buffer: AtomicU64,
    buffered: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
    saturated: AtomicU64,
    discarded: AtomicU64,
}

impl StatsCell {
    pub(super) fn new() -> Self {
        Self {
            delivered_immediately: AtomicU64::new(0),
            delivered_from_buffer: AtomicU64::new(0),
            buffered: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            saturated: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub(super) fn delivered(&self, path: DeliveryPath) {
        let counter = match path {
            DeliveryPath::Immediate => &self.delivered_immediately,
            DeliveryPath::Drained => &self.delivered_from_buffer,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::inc_delivered(path);
    }

    pub(super) fn buffered(&self) {
        self.buffered.fetch_add(1, Ordering::Relaxed);
        metrics::inc_buffered();
    }

    pub(super) fn saturated(&self) { self.saturated.fetch_add(1, Ordering::Relaxed); }

    pub(super) fn discarded(&self, reason: DiscardReason, count: u64) {
        if count == 0 {
            return;
        }
        let counter = match reason {
            DiscardReason::Evicted => &self.evicted,
            DiscardReason::Rejected => &self.rejected,
            DiscardReason::Terminated => &self.discarded,
        };
        counter.fetch_add(count, Ordering::Relaxed);
        metrics::add_discarded(reason, count);
    }

    pub(super) fn snapshot(&self) -> FlowStats {
        FlowStats {
            delivered_immediately: self.delivered_immediately.load(Ordering::Relaxed),
            delivered_from_buffer: self.delivered_from_buffer.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            saturated: self.saturated.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
