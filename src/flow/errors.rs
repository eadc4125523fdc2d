//! Error types for flow controller operations and configuration.

use thiserror::Error;

/// Errors returned by [`FlowController::offer`](super::FlowController::offer).
///
/// Both are local conditions. Neither should tear down the connection that
/// produced the message.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    /// The pending buffer was full under
    /// [`OverflowPolicy::RejectNewest`](crate::buffer::OverflowPolicy::RejectNewest).
    #[error("pending buffer full")]
    BufferFull,
    /// The source has terminated and accepts no further messages.
    #[error("source terminated")]
    Terminated,
}

/// Errors returned when building a flow controller.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowConfigError {
    /// A bounded buffer was requested with zero capacity.
    #[error("invalid capacity {0}; bounded buffers must hold at least one message")]
    InvalidCapacity(usize),
    /// The dead-letter log cadence was zero.
    #[error("invalid log cadence; dlq_log_every_n must be >= 1")]
    InvalidLogCadence,
}
