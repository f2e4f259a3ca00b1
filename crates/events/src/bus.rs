//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes committed changes to readers. It is not a store:
//! the ledger store is the source of truth and a reader that misses messages
//! rebuilds from it. Delivery is at-least-once, so consumers must tolerate
//! duplicates (the projection runner rejects non-increasing sequence numbers).

use std::sync::mpsc::Receiver;
use std::time::Duration;
use std::sync::Arc;

/// A subscription to the change feed.
///
/// Each subscription receives a copy of every message published after it was
/// created, in publication order. Meant to be drained by a single thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Take every message already delivered, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// ```text
/// Operation → Store commit → EventBus::publish → Projections / treatment log
/// ```
///
/// Publication happens only after a successful commit. A failed `publish`
/// is surfaced to the caller; the committed change is not rolled back.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}


