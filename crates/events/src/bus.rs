//! Post-commit fan-out of events to consumers outside the command path
//! (forecast exporters, notification hooks).
//!
//! The event store is the source of truth. A message reaches the bus only
//! after its commit, so a failed publish delays consumers but loses nothing.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};

/// Receiving end handed out by [`EventBus::subscribe`].
///
/// Sees every message published after it was created, in publish order.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Next pending message, without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Everything published so far and not yet received.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Display + core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        <B as EventBus<M>>::publish(self, message)
    }

    fn subscribe(&self) -> Subscription<M> {
        <B as EventBus<M>>::subscribe(self)
    }
}
