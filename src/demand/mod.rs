//! Demand-aware roles shared by producers and consumers of push messages.
//!
//! A [`Source`] owns the decoding side and can be asked to produce more input.
//! A [`Sink`] owns the consuming side: it reports whether it currently has
//! [demand](Sink::has_demand), accepts delivered messages, and tracks which
//! source it is bound to. Both roles are shared between the decoder thread
//! and arbitrary consumer threads, so implementations must be thread-safe.

mod channel;
mod counter;
mod slot;

pub use channel::{ChannelSink, PushReceiver};
pub use counter::{DemandCounter, UNBOUNDED};
pub use slot::SourceSlot;

use crate::flow::SourceHandle;

/// Producer side of a binding.
///
/// Sinks call [`request_more`](Self::request_more) whenever they regain
/// capacity, for example after consuming messages or granting new credit.
pub trait Source: Send + Sync {
    /// Signal demand to the source so buffered messages can be drained and
    /// the decoder can resume reading.
    fn request_more(&self);
}

/// Consumer side of a binding.
///
/// The flow controller asks [`has_demand`](Self::has_demand) before every
/// delivery and hands messages over through [`accept`](Self::accept). Both
/// are invoked while the controller holds its delivery lock, so they must
/// return promptly and must not block on other threads.
pub trait Sink<M>: Send + Sync {
    /// Returns `true` if the sink is ready for at least one more message.
    ///
    /// `false` means either the sink has no demand in general or its current
    /// demand is saturated.
    fn has_demand(&self) -> bool;

    /// Install `source` as the active source for this sink.
    ///
    /// Any previously installed source is superseded and should be detached.
    fn set_source(&self, source: SourceHandle<M>);

    /// Remove the active source, if any.
    ///
    /// After this returns the previously bound source no longer asks this sink
    /// for demand and delivers nothing further to it. Calling it without a
    /// bound source is a no-op.
    fn remove_source(&self);

    /// Take delivery of one message.
    fn accept(&self, message: M);
}
