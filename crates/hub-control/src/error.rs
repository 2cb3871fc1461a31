//! Command error types.

use hmip_hub_connection::SendError;

/// Errors returned to callers issuing hub commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("not connected to hub")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SendError> for CommandError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::NotConnected => Self::NotConnected,
            SendError::Transport(reason) => Self::Transport(reason),
        }
    }
}
