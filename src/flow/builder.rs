//! Builder for configuring flow controllers.

use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;

use super::{FlowConfig, FlowConfigError, FlowController, TerminationPolicy};
use crate::{adapter::ReadControl, buffer::OverflowPolicy};

/// Builder for [`FlowController`].
///
/// Defaults: a buffer of [`DEFAULT_CAPACITY`](super::DEFAULT_CAPACITY) messages with
/// [`OverflowPolicy::Backpressure`], [`TerminationPolicy::Flush`], no
/// dead-letter queue, and a warning for every lost dead letter.
///
/// # Examples
///
/// ```
/// use pushflow::{
///     buffer::OverflowPolicy,
///     flow::{FlowController, TerminationPolicy},
/// };
/// use tokio::sync::mpsc;
///
/// let (dlq_tx, _dlq_rx) = mpsc::channel(8);
/// let controller = FlowController::<Vec<u8>>::builder()
///     .capacity(64)
///     .overflow_policy(OverflowPolicy::DropOldest)
///     .termination_policy(TerminationPolicy::Discard)
///     .dlq(Some(dlq_tx))
///     .build()
///     .expect("failed to build FlowController");
/// assert_eq!(controller.pending_len(), 0);
/// ```
pub struct FlowControllerBuilder<M> {
    capacity: Option<usize>,
    overflow: OverflowPolicy,
    termination: TerminationPolicy,
    dlq: Option<mpsc::Sender<M>>,
    dlq_log_every_n: usize,
    dlq_log_interval: Duration,
    read_control: Option<Arc<dyn ReadControl>>,
}

impl<M> std::fmt::Debug for FlowControllerBuilder<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowControllerBuilder")
            .field("capacity", &self.capacity)
            .field("overflow", &self.overflow)
            .field("termination", &self.termination)
            .field("dlq", &self.dlq.is_some())
            .field("dlq_log_every_n", &self.dlq_log_every_n)
            .field("dlq_log_interval", &self.dlq_log_interval)
            .field("read_control", &self.read_control.is_some())
            .finish()
    }
}

impl<M: Send + 'static> Default for FlowControllerBuilder<M> {
    fn default() -> Self {
        let defaults = FlowConfig::<M>::default();
        Self {
            capacity: defaults.capacity,
            overflow: defaults.overflow,
            termination: defaults.termination,
            dlq: defaults.dlq,
            dlq_log_every_n: defaults.dlq_log_every_n,
            dlq_log_interval: defaults.dlq_log_interval,
            read_control: None,
        }
    }
}

impl<M: Send + 'static> FlowControllerBuilder<M> {
    /// Bound the pending buffer to `capacity` messages.
    ///
    /// Zero is rejected by [`build`](Self::build).
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Let the pending buffer grow without limit.
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.capacity = None;
        self
    }

    /// Policy applied when a bounded buffer is full.
    #[must_use]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    /// What happens to buffered messages when the source terminates.
    #[must_use]
    pub fn termination_policy(mut self, policy: TerminationPolicy) -> Self {
        self.termination = policy;
        self
    }

    /// Provide a dead-letter queue for discarded messages.
    ///
    /// Messages are lost when no DLQ is set or the channel is full.
    #[must_use]
    pub fn dlq(mut self, dlq: Option<mpsc::Sender<M>>) -> Self {
        self.dlq = dlq;
        self
    }

    /// Log every `n`th message lost because the DLQ was full or closed.
    #[must_use]
    pub fn dlq_log_every_n(mut self, n: usize) -> Self {
        self.dlq_log_every_n = n;
        self
    }

    /// Log lost dead letters at least once per `interval`.
    #[must_use]
    pub fn dlq_log_interval(mut self, interval: Duration) -> Self {
        self.dlq_log_interval = interval;
        self
    }

    /// Install a hook told when the decoder should pause or resume reading.
    ///
    /// The controller's own [`ReadGate`](crate::adapter::ReadGate) is always
    /// updated; this hook is for decoders that are not driven by
    /// [`SourceAdapter::drive`](crate::adapter::SourceAdapter::drive).
    #[must_use]
    pub fn read_control(mut self, control: Arc<dyn ReadControl>) -> Self {
        self.read_control = Some(control);
        self
    }

    /// Build the configured [`FlowController`].
    ///
    /// # Errors
    ///
    /// Returns [`FlowConfigError::InvalidCapacity`] if a zero capacity was
    /// configured and [`FlowConfigError::InvalidLogCadence`] if
    /// `dlq_log_every_n` is zero.
    pub fn build(self) -> Result<FlowController<M>, FlowConfigError> {
        let config = FlowConfig {
            capacity: self.capacity,
            overflow: self.overflow,
            termination: self.termination,
            dlq: self.dlq,
            dlq_log_every_n: self.dlq_log_every_n,
            dlq_log_interval: self.dlq_log_interval,
        };
        FlowController::build_with_config(config, self.read_control)
    }
}
