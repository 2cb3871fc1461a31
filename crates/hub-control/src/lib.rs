//! Command dispatch for the HmIP bridge.
//!
//! [`CommandDispatcher`] sits between the hub session and the rest of the
//! bridge: it answers the hub's readiness polls, keeps the
//! [`StateStore`](hmip_device_state::StateStore) current from system-state
//! responses, and turns caller intents into fire-and-forget system requests.
//! It talks to the hub only through [`Outbound`](hmip_hub_connection::Outbound),
//! so tests drive it with a recording mock.

pub mod dispatcher;
pub mod error;

pub use dispatcher::CommandDispatcher;
pub use error::CommandError;
