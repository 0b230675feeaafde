//! Per-attachment event fan-out.
//!
//! Each subscriber gets an independent bounded queue. A subscriber that
//! falls behind drops events (backpressure), a subscriber that went away
//! is unsubscribed on the next emit. Detaching an attachment therefore
//! stops delivery to it the moment its stream is dropped.

use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Fan-out point for one kind of event.
pub(crate) struct EventHub<T: Clone> {
    subscribers: Mutex<Vec<mpsc::Sender<T>>>,
    capacity: usize,
}

impl<T: Clone> EventHub<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Register a new subscriber and return its stream.
    pub fn subscribe(&self) -> EventStream<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.lock().unwrap().push(tx);
        EventStream { receiver: rx }
    }

    /// Deliver an event to every live subscriber.
    pub fn emit(&self, event: T) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("event subscriber lagging, dropping event");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

/// A lazy, unbounded sequence of events for one subscriber.
///
/// Usable either through the inherent async `next()` or as a
/// `futures_util::Stream` with combinators.
pub struct EventStream<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> EventStream<T> {
    /// Receive the next event. Returns `None` once the source is gone.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
