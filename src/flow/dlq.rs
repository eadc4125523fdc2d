//! Dead-letter routing and throttled warnings for discarded messages.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    metrics::DiscardReason,
    sync::{AtomicUsize, Mutex, Ordering, lock},
};

/// Rate limiter for repetitive warnings.
///
/// A warning is emitted on every `every_n`-th event or when `interval` has
/// elapsed since the last one, whichever comes first. The event count resets
/// each time a warning is emitted.
#[derive(Debug)]
pub(super) struct LogThrottle {
    events: AtomicUsize,
    last_log: Mutex<Instant>,
    every_n: usize,
    interval: Duration,
}

impl LogThrottle {
    pub(super) fn new(every_n: usize, interval: Duration) -> Self {
        Self {
            events: AtomicUsize::new(0),
            last_log: Mutex::new(Instant::now()),
            every_n,
            interval,
        }
    }

    /// Record an event. Returns the number of events folded into this warning
    /// when one should be logged now.
    pub(super) fn record(&self) -> Option<usize> {
        let events = self.events.fetch_add(1, Ordering::Relaxed) + 1;
        let mut last = lock(&self.last_log);
        let now = Instant::now();
        if events.is_multiple_of(self.every_n) || now.duration_since(*last) > self.interval {
            *last = now;
            self.events.store(0, Ordering::Relaxed);
            Some(events)
        } else {
            None
        }
    }

    #[cfg(test)]
    pub(super) fn pending(&self) -> usize { self.events.load(Ordering::Relaxed) }
}

/// Optional dead-letter queue receiving messages the controller discards.
#[derive(Debug)]
pub(super) struct DeadLetters<M> {
    tx: Option<mpsc::Sender<M>>,
    losses: LogThrottle,
}

impl<M> DeadLetters<M> {
    pub(super) fn new(tx: Option<mpsc::Sender<M>>, every_n: usize, interval: Duration) -> Self {
        Self {
            tx,
            losses: LogThrottle::new(every_n, interval),
        }
    }

    /// Forward a discarded message to the dead-letter queue if configured.
    ///
    /// Messages are lost when no queue is configured or the queue is full or
    /// closed; the latter two are reported through throttled warnings.
    pub(super) fn route(&self, message: M, reason: DiscardReason) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_) | mpsc::error::TrySendError::Closed(_)) => {
                if let Some(dropped) = self.losses.record() {
                    warn!(
                        dropped,
                        reason = reason.as_str(),
                        log_every_n = self.losses.every_n,
                        log_interval = ?self.losses.interval,
                        "DLQ dropped messages (full or closed)"
                    );
                }
            }
        }
    }

    #[cfg(test)]
    pub(super) fn pending_losses(&self) -> usize { self.losses.pending() }
}
