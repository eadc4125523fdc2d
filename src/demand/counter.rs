//! Credit accounting for a single sink.

use crate::sync::{AtomicU64, Ordering};

/// Sentinel credit value meaning "no limit".
pub const UNBOUNDED: u64 = u64::MAX;

/// Marker written once the counter is cancelled. Distinct from every
/// reachable credit value because grants saturate at [`UNBOUNDED`] - 1 unless
/// [`UNBOUNDED`] itself is requested.
const CANCELLED: u64 = u64::MAX - 1;

/// Thread-safe count of how many more messages a sink will accept.
///
/// The counter is written from the consumer side ([`grant`](Self::grant),
/// [`try_consume`](Self::try_consume), [`cancel`](Self::cancel)) and read by
/// the flow controller through [`has_demand`](Self::has_demand). Reads never
/// mutate the value.
///
/// # Examples
///
/// ```
/// use pushflow::demand::DemandCounter;
///
/// let demand = DemandCounter::new();
/// assert!(!demand.has_demand());
/// demand.grant(2);
/// assert!(demand.try_consume());
/// assert!(demand.try_consume());
/// assert!(!demand.has_demand());
/// ```
#[derive(Debug)]
pub struct DemandCounter {
    credit: AtomicU64,
}

impl Default for DemandCounter {
    fn default() -> Self { Self::new() }
}

impl DemandCounter {
    /// Create a counter with no outstanding demand.
    #[must_use]
    pub fn new() -> Self {
        Self {
            credit: AtomicU64::new(0),
        }
    }

    /// Returns `true` while at least one more message may be delivered.
    #[must_use]
    pub fn has_demand(&self) -> bool {
        let credit = self.credit.load(Ordering::Acquire);
        credit != 0 && credit != CANCELLED
    }

    /// Outstanding credit, or `None` once cancelled.
    ///
    /// [`UNBOUNDED`] is reported as-is.
    #[must_use]
    pub fn available(&self) -> Option<u64> {
        match self.credit.load(Ordering::Acquire) {
            CANCELLED => None,
            credit => Some(credit),
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.credit.load(Ordering::Acquire) == CANCELLED }

    /// Add `n` credits.
    ///
    /// Granting [`UNBOUNDED`] switches the counter to unlimited demand. Other
    /// grants saturate just below the cancellation marker. Grants after
    /// cancellation are ignored.
    ///
    /// Returns `true` when the counter moved from no demand to some demand,
    /// which is the moment a sink should call `request_more()` on its source.
    pub fn grant(&self, n: u64) -> bool {
        if n == 0 {
            return false;
        }
        let mut current = self.credit.load(Ordering::Acquire);
        loop {
            let next = match current {
                CANCELLED | UNBOUNDED => return false,
                _ if n == UNBOUNDED => UNBOUNDED,
                _ => current.saturating_add(n).min(CANCELLED - 1),
            };
            match self.credit.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current == 0,
                Err(actual) => current = actual,
            }
        }
    }

    /// Consume one credit.
    ///
    /// Returns `false` without changing anything when no demand is left.
    /// Unbounded demand is never decremented.
    pub fn try_consume(&self) -> bool {
        let mut current = self.credit.load(Ordering::Acquire);
        loop {
            match current {
                0 | CANCELLED => return false,
                UNBOUNDED => return true,
                _ => {}
            }
            match self.credit.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Permanently withdraw all demand.
    ///
    /// Returns `true` if this call performed the cancellation.
    pub fn cancel(&self) -> bool { self.credit.swap(CANCELLED, Ordering::AcqRel) != CANCELLED }
}
