#![doc(html_root_url = "https://docs.rs/pushflow/latest")]
//! Public API for the `pushflow` library.
//!
//! This crate mediates between a producer of push messages, typically a
//! protocol decoder reading from a socket, and a consumer that may only be
//! able to take some of them right now. Messages are delivered immediately
//! while the consumer has demand, buffered in order while it does not, and
//! drained when it asks for more.
//!
//! ```
//! use std::sync::Arc;
//!
//! use pushflow::{demand::ChannelSink, flow::FlowController};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = FlowController::<&'static str>::builder().build()?;
//! let (sink, mut receiver) = ChannelSink::channel();
//! controller.bind(sink);
//!
//! controller.offer("a")?;
//! controller.offer("b")?;
//! assert_eq!(controller.pending_len(), 2);
//!
//! receiver.request(1);
//! assert_eq!(receiver.try_recv(), Some("a"));
//! assert_eq!(controller.pending_len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod buffer;
pub mod demand;
pub mod flow;
pub mod metrics;
pub mod registry;
mod sync;

pub use adapter::{ReadControl, ReadGate, SourceAdapter};
pub use buffer::{OverflowPolicy, PendingBuffer};
pub use demand::{ChannelSink, DemandCounter, PushReceiver, Sink, Source, SourceSlot};
pub use flow::{
    FlowConfig,
    FlowConfigError,
    FlowController,
    FlowControllerBuilder,
    FlowError,
    FlowStats,
    Offer,
    Phase,
    SourceHandle,
    TerminationPolicy,
    TerminationReport,
};
pub use metrics::{BINDINGS_ACTIVE, MESSAGES_BUFFERED, MESSAGES_DELIVERED, MESSAGES_DISCARDED, OVERFLOWS_TOTAL};
pub use registry::{SourceId, SourceRegistry};
