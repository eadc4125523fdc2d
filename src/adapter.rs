//! Glue between a message decoder and its flow controller.
//!
//! The decoder hands every decoded message to [`SourceAdapter::on_message`]
//! in arrival order and reports connection teardown through
//! [`SourceAdapter::on_teardown`]. When a bounded buffer under
//! [`OverflowPolicy::Backpressure`](crate::buffer::OverflowPolicy::Backpressure)
//! fills up, the controller closes its [`ReadGate`]; decoders driven by
//! [`SourceAdapter::drive`] stop polling their input until a drain pass frees
//! space again.

use std::fmt;

use futures::{Stream, StreamExt};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::{
    flow::{FlowController, FlowError, Offer, TerminationReport},
    sync::{AtomicBool, Ordering},
};

/// Hook told when the decoder should stop or resume reading.
///
/// Implementations are invoked while the controller holds its delivery lock
/// and must return promptly.
pub trait ReadControl: Send + Sync {
    /// The pending buffer is saturated; stop reading from the transport.
    fn pause(&self);

    /// Space is available again; resume reading.
    fn resume(&self);
}

/// Open/closed flag an async decoder can wait on.
#[derive(Debug)]
pub struct ReadGate {
    paused: AtomicBool,
    notify: Notify,
}

impl Default for ReadGate {
    fn default() -> Self { Self::new() }
}

impl ReadGate {
    /// Create an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Returns `true` while reading should be paused.
    #[must_use]
    pub fn is_paused(&self) -> bool { self.paused.load(Ordering::Acquire) }

    /// Close the gate. Returns `true` if it was open.
    pub(crate) fn close(&self) -> bool { !self.paused.swap(true, Ordering::AcqRel) }

    /// Open the gate and wake waiters. Returns `true` if it was closed.
    pub(crate) fn open(&self) -> bool {
        let was_paused = self.paused.swap(false, Ordering::AcqRel);
        if was_paused {
            self.notify.notify_waiters();
        }
        was_paused
    }

    /// Wait until the gate is open.
    pub async fn wait_open(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_paused() {
                return;
            }
            notified.await;
        }
    }
}

impl ReadControl for ReadGate {
    fn pause(&self) { self.close(); }

    fn resume(&self) { self.open(); }
}

/// Production-side entry point for one decoder.
///
/// Dropping the adapter terminates its controller as if the connection had
/// been torn down.
pub struct SourceAdapter<M: Send + 'static> {
    controller: FlowController<M>,
}

impl<M: Send + 'static> fmt::Debug for SourceAdapter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceAdapter")
            .field("source", &self.controller.id())
            .field("phase", &self.controller.phase())
            .finish()
    }
}

impl<M: Send + 'static> SourceAdapter<M> {
    /// Wrap `controller` for use by a decoder.
    #[must_use]
    pub fn new(controller: FlowController<M>) -> Self { Self { controller } }

    /// The controller messages are offered to.
    #[must_use]
    pub fn controller(&self) -> &FlowController<M> { &self.controller }

    /// Returns `true` while the decoder should not read further input.
    #[must_use]
    pub fn is_paused(&self) -> bool { self.controller.read_gate().is_paused() }

    /// Offer one decoded message.
    ///
    /// # Errors
    ///
    /// Propagates [`FlowError`] from [`FlowController::offer`].
    pub fn on_message(&self, message: M) -> Result<Offer, FlowError> {
        let offer = self.controller.offer(message)?;
        if offer.should_pause() {
            debug!(source = %self.controller.id(), "pending buffer saturated");
        }
        Ok(offer)
    }

    /// The underlying connection is gone: flush or discard buffered messages
    /// and clear the binding.
    pub fn on_teardown(&self) -> TerminationReport { self.controller.terminate() }

    /// Feed every item of `stream` through the controller until it ends.
    ///
    /// Polling is suspended while the read gate is closed. The controller is
    /// terminated when the stream ends, yields an error, or the controller
    /// was terminated elsewhere.
    ///
    /// # Errors
    ///
    /// Returns the first decode error after terminating the controller.
    pub async fn drive<S, E>(&self, mut stream: S) -> Result<TerminationReport, E>
    where
        S: Stream<Item = Result<M, E>> + Unpin,
        E: fmt::Display,
    {
        let gate = self.controller.read_gate();
        loop {
            gate.wait_open().await;
            match stream.next().await {
                Some(Ok(message)) => match self.on_message(message) {
                    Ok(_) | Err(FlowError::BufferFull) => {}
                    Err(FlowError::Terminated) => break,
                },
                Some(Err(error)) => {
                    let report = self.on_teardown();
                    warn!(
                        source = %self.controller.id(),
                        %error,
                        delivered = report.delivered,
                        discarded = report.discarded,
                        "decoder failed; source terminated"
                    );
                    return Err(error);
                }
                None => break,
            }
        }
        Ok(self.on_teardown())
    }
}

impl<M: Send + 'static> Drop for SourceAdapter<M> {
    fn drop(&mut self) { self.controller.terminate(); }
}
