//! Seams between the session manager and the code that reacts to it.
//!
//! The manager drives a [`MessageHandler`] with every decoded inbound
//! message; command code talks back to the hub through [`Outbound`], which
//! the manager implements and tests replace with a recording mock.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hmip_protocol::Message;

use crate::error::SendError;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Receives inbound traffic from the session manager's receive loop.
///
/// Calls are sequential: the next frame is not read until the returned
/// future completes, so implementations should not block on the hub.
pub trait MessageHandler: Send + Sync + 'static {
    /// Called for every successfully decoded inbound message.
    fn on_message(&self, msg: Message) -> HandlerFuture<'_>;

    /// Called once per session, right after the readiness announcement.
    fn on_connected(&self) -> HandlerFuture<'_> {
        Box::pin(async {})
    }
}

/// Outbound path to the hub.
pub trait Outbound: Send + Sync {
    /// Queues a message on the current session without waiting for the write.
    fn send(&self, msg: Message) -> Result<(), SendError>;

    /// Returns `true` while a session is active.
    fn is_connected(&self) -> bool;
}

impl<T: Outbound + ?Sized> Outbound for Arc<T> {
    fn send(&self, msg: Message) -> Result<(), SendError> {
        (**self).send(msg)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
