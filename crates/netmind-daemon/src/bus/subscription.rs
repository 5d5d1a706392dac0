//! Live subscriber handle.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use netmind_core::Event;

/// A bounded queue of events registered with the bus.
///
/// When the queue is full the bus drops new events for this subscriber only.
/// Dropping the handle (or the stream made from it) unsubscribes on the next
/// broadcast.
#[derive(Debug)]
pub struct Subscription {
    pub(super) id: u64,
    pub(super) rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. `None` once the bus has dropped this
    /// subscriber and the queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Everything currently queued.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Consume the handle as a `Stream` of events.
    pub fn into_stream(self) -> ReceiverStream<Event> {
        ReceiverStream::new(self.rx)
    }
}
