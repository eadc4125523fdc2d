//! Credit-based sink forwarding delivered messages into a tokio channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::{DemandCounter, Sink, SourceSlot};
use crate::flow::SourceHandle;

/// [`Sink`] that forwards accepted messages to a [`PushReceiver`].
///
/// Demand is explicit: nothing is delivered until the receiver calls
/// [`PushReceiver::request`]. Every accepted message consumes one credit.
///
/// # Examples
///
/// ```
/// use pushflow::{demand::ChannelSink, flow::FlowController};
///
/// # fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let controller = FlowController::<u32>::builder().build()?;
/// let (sink, mut receiver) = ChannelSink::channel();
/// controller.bind(sink);
///
/// controller.offer(1)?;
/// assert!(receiver.try_recv().is_none());
///
/// receiver.request(1);
/// assert_eq!(receiver.try_recv(), Some(1));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChannelSink<M> {
    demand: DemandCounter,
    source: SourceSlot<M>,
    tx: mpsc::UnboundedSender<M>,
}

impl<M: Send + 'static> ChannelSink<M> {
    /// Create a sink and the receiver that consumes from it.
    #[must_use]
    pub fn channel() -> (Arc<Self>, PushReceiver<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            demand: DemandCounter::new(),
            source: SourceSlot::new(),
            tx,
        });
        let receiver = PushReceiver {
            sink: Arc::clone(&sink),
            rx,
        };
        (sink, receiver)
    }

    /// Credit accounting backing [`Sink::has_demand`].
    #[must_use]
    pub fn demand(&self) -> &DemandCounter { &self.demand }

    /// Returns `true` while the sink is bound to a source.
    #[must_use]
    pub fn is_bound(&self) -> bool { self.source.is_bound() }
}

impl<M: Send + 'static> Sink<M> for ChannelSink<M> {
    fn has_demand(&self) -> bool { self.demand.has_demand() && !self.tx.is_closed() }

    fn set_source(&self, source: SourceHandle<M>) { self.source.set(source); }

    fn remove_source(&self) { self.source.remove(); }

    fn accept(&self, message: M) {
        self.demand.try_consume();
        if self.tx.send(message).is_err() {
            debug!("push receiver closed; delivered message dropped");
        }
    }
}

/// Consumer half of a [`ChannelSink`].
///
/// Dropping the receiver cancels demand and detaches the sink from its source.
#[derive(Debug)]
pub struct PushReceiver<M: Send + 'static> {
    sink: Arc<ChannelSink<M>>,
    rx: mpsc::UnboundedReceiver<M>,
}

impl<M: Send + 'static> PushReceiver<M> {
    /// Grant `n` more credits and ask the bound source to deliver.
    ///
    /// Pass [`UNBOUNDED`](super::UNBOUNDED) to switch off flow control.
    pub fn request(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.sink.demand.grant(n);
        self.sink.source.request_more();
    }

    /// Receive the next delivered message.
    ///
    /// Returns `None` only after [`cancel`](Self::cancel) and once every
    /// message delivered before it has been consumed.
    pub async fn recv(&mut self) -> Option<M> { self.rx.recv().await }

    /// Receive an already delivered message without waiting.
    pub fn try_recv(&mut self) -> Option<M> { self.rx.try_recv().ok() }

    /// Withdraw all demand and detach from the source.
    ///
    /// Messages delivered before cancellation remain readable.
    pub fn cancel(&mut self) {
        if self.sink.demand.cancel() {
            debug!("push receiver cancelled");
        }
        self.sink.source.remove();
        self.rx.close();
    }

    /// The sink feeding this receiver, for binding to a flow controller.
    #[must_use]
    pub fn sink(&self) -> &Arc<ChannelSink<M>> { &self.sink }
}

impl<M: Send + 'static> Drop for PushReceiver<M> {
    fn drop(&mut self) { self.cancel(); }
}
