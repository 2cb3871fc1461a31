/// Errors returned by [`crate::Outbound::send`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("not connected to hub")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors that end [`crate::SessionManager::run`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("gave up after {attempts} consecutive failed connection attempts")]
    RetriesExhausted { attempts: u32 },
}
