//! Metric helpers for `pushflow`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::buffer::OverflowPolicy;

/// Name of the gauge tracking live source/sink bindings.
pub const BINDINGS_ACTIVE: &str = "pushflow_bindings_active";
/// Name of the counter tracking messages handed to a sink.
pub const MESSAGES_DELIVERED: &str = "pushflow_messages_delivered_total";
/// Name of the counter tracking messages parked in a pending buffer.
pub const MESSAGES_BUFFERED: &str = "pushflow_messages_buffered_total";
/// Name of the counter tracking bounded-buffer overflows.
pub const OVERFLOWS_TOTAL: &str = "pushflow_overflow_total";
/// Name of the counter tracking messages discarded without delivery.
pub const MESSAGES_DISCARDED: &str = "pushflow_messages_discarded_total";

/// Route a message took to reach its sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryPath {
    /// Delivered on arrival because the buffer was empty and demand existed.
    Immediate,
    /// Delivered by a drain pass from the pending buffer.
    Drained,
}

impl DeliveryPath {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            DeliveryPath::Immediate => "immediate",
            DeliveryPath::Drained => "drained",
        }
    }
}

/// Why a message left the pipeline without being delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// Evicted by [`OverflowPolicy::DropOldest`].
    Evicted,
    /// Refused by [`OverflowPolicy::RejectNewest`].
    Rejected,
    /// Still buffered when the source terminated.
    Terminated,
}

impl DiscardReason {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DiscardReason::Evicted => "evicted",
            DiscardReason::Rejected => "rejected",
            DiscardReason::Terminated => "terminated",
        }
    }
}

/// Increment the active bindings gauge.
pub fn inc_bindings() {
    #[cfg(feature = "metrics")]
    gauge!(BINDINGS_ACTIVE).increment(1.0);
}

/// Decrement the active bindings gauge.
pub fn dec_bindings() {
    #[cfg(feature = "metrics")]
    gauge!(BINDINGS_ACTIVE).decrement(1.0);
}

/// Record a delivered message.
pub fn inc_delivered(path: DeliveryPath) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_DELIVERED, "path" => path.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = path;
}

/// Record a message parked in a pending buffer.
pub fn inc_buffered() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_BUFFERED).increment(1);
}

/// Record a bounded-buffer overflow handled by `policy`.
pub fn inc_overflow(policy: OverflowPolicy) {
    #[cfg(feature = "metrics")]
    counter!(OVERFLOWS_TOTAL, "policy" => policy.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = policy;
}

/// Record `count` discarded messages.
pub fn add_discarded(reason: DiscardReason, count: u64) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_DISCARDED, "reason" => reason.as_str()).increment(count);
    #[cfg(not(feature = "metrics"))]
    let _ = (reason, count);
}
