//! Session manager for the hub's plugin WebSocket.
//!
//! Maintains a single authenticated session to the hub, announces plugin
//! readiness on every connect, feeds inbound messages to a
//! [`MessageHandler`], and reconnects after a fixed delay whenever the
//! transport fails.

mod error;
mod handler;
pub mod manager;
mod pumps;
pub(crate) mod reconnection;
mod tls;
pub mod types;
pub mod ws_client;

pub use error::{SendError, SessionError};
pub use handler::{HandlerFuture, MessageHandler, Outbound};
pub use manager::SessionManager;
pub use types::{ReconnectConfig, SessionConfig, SessionState, TlsPolicy};
pub use ws_client::WsError;

/// Capacity of the per-session outbound queue.
///
/// Outbound traffic is a handful of commands; a full queue means the socket
/// is stuck and the session is torn down instead of queuing further.
pub const SEND_BUFFER_SIZE: usize = 64;
