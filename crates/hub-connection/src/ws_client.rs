//! WebSocket connection setup for a single hub session.
//!
//! Builds the upgrade request with the plugin credentials, resolves the TLS
//! policy and performs the WebSocket handshake.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};

use hmip_protocol::constants::{HEADER_AUTH_TOKEN, HEADER_PLUGIN_ID, WS_MAX_MESSAGE_SIZE};

use crate::error::SendError;
use crate::types::SessionConfig;

/// Upper bound on TCP connect plus TLS and WebSocket handshakes.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Stream type of an open hub session.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport-level errors. Every variant ends the current session and
/// schedules a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("invalid value for header `{0}`")]
    InvalidHeader(&'static str),

    #[error("send failed: {0}")]
    Send(#[from] SendError),

    #[error("timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,
}

/// Builds the upgrade request carrying the `authtoken` and `plugin-id`
/// headers.
pub fn build_request(config: &SessionConfig) -> Result<Request, WsError> {
    let mut request = config.url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        HEADER_AUTH_TOKEN,
        HeaderValue::from_str(&config.auth_token)
            .map_err(|_| WsError::InvalidHeader(HEADER_AUTH_TOKEN))?,
    );
    headers.insert(
        HEADER_PLUGIN_ID,
        HeaderValue::from_str(&config.plugin_id)
            .map_err(|_| WsError::InvalidHeader(HEADER_PLUGIN_ID))?,
    );
    Ok(request)
}

/// Opens a WebSocket to the hub.
///
/// The hub rejects bad credentials during the upgrade; that rejection is
/// returned as-is.
pub async fn connect(config: &SessionConfig) -> Result<WsStream, WsError> {
    let request = build_request(config)?;
    let connector = if config.is_secure() {
        Some(crate::tls::connector_for(&config.tls)?)
    } else {
        None
    };

    let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
    ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

    let handshake = tokio_tungstenite::connect_async_tls_with_config(
        request,
        Some(ws_config),
        false,
        connector,
    );
    let (stream, response) = tokio::time::timeout(CONNECT_TIMEOUT, handshake)
        .await
        .map_err(|_| WsError::Timeout)??;
    tracing::debug!(status = %response.status(), "WebSocket upgrade accepted");
    Ok(stream)
}
