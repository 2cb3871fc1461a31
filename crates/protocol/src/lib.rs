//! Wire protocol for the HmIP hub plugin WebSocket API.
//!
//! Every frame exchanged with the hub is a JSON [`Message`] envelope
//! carrying a plugin id, a correlation id, a type and an opaque body.
//! Typed bodies for the messages the bridge produces or consumes live in
//! [`messages`].

pub mod constants;
pub mod envelope;
pub mod messages;

pub use constants::MessageType;
pub use envelope::{DecodeError, Message};
