//! Per-session tasks moving frames between the socket and the manager.

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;
