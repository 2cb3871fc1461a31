//! Public types for the session manager.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use hmip_protocol::constants::{HUB_WS_PORT, RECONNECT_DELAY, WS_PING_PERIOD};

/// Lifecycle state of the hub session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; either before the first attempt or waiting to retry.
    Disconnected,
    /// TCP/TLS/WebSocket handshake in progress.
    Connecting { attempt: u32 },
    /// Socket open, readiness announcement being sent.
    Handshaking,
    /// Ready and receiving.
    Connected,
}

impl SessionState {
    /// Short lowercase label used in logs and status output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting { .. } => "connecting",
            Self::Handshaking => "handshaking",
            Self::Connected => "connected",
        }
    }
}

/// How the hub's TLS certificate is verified.
///
/// Hubs ship with a self-signed certificate, so verification is off unless
/// configured otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    /// Accept any certificate.
    #[default]
    NoVerify,
    /// Verify against the operating system's trust store.
    SystemTrust,
    /// Verify against a pinned PEM CA bundle.
    CustomCa(PathBuf),
}

impl TlsPolicy {
    /// Builds the policy from the `verify` flag and optional CA path.
    ///
    /// A CA path without `verify` is ignored.
    pub fn from_settings(verify: bool, ca_cert_path: Option<PathBuf>) -> Self {
        match (verify, ca_cert_path) {
            (false, _) => Self::NoVerify,
            (true, Some(path)) => Self::CustomCa(path),
            (true, None) => Self::SystemTrust,
        }
    }
}

/// Reconnection policy: a fixed delay between attempts, forever by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay after a failed attempt or a lost session.
    pub delay: Duration,
    /// Consecutive failed connection attempts before giving up.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

/// Everything the session manager needs to reach the hub.
#[derive(Clone)]
pub struct SessionConfig {
    /// WebSocket URL, normally `wss://<hub>:9001`.
    pub url: String,
    pub auth_token: String,
    pub plugin_id: String,
    /// Display name sent in the readiness announcement.
    pub friendly_name: String,
    pub tls: TlsPolicy,
    pub reconnect: ReconnectConfig,
    /// Interval between keepalive pings; `None` disables them.
    pub keepalive: Option<Duration>,
    /// Tear the session down when nothing arrives for this long.
    pub read_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Configuration for the hub at `host` with default policies.
    pub fn for_hub(
        host: &str,
        auth_token: impl Into<String>,
        plugin_id: impl Into<String>,
        friendly_name: impl Into<String>,
    ) -> Self {
        Self {
            url: format!("wss://{host}:{HUB_WS_PORT}"),
            auth_token: auth_token.into(),
            plugin_id: plugin_id.into(),
            friendly_name: friendly_name.into(),
            tls: TlsPolicy::default(),
            reconnect: ReconnectConfig::default(),
            keepalive: Some(WS_PING_PERIOD),
            read_timeout: None,
        }
    }

    /// Returns `true` if the URL requires TLS.
    pub fn is_secure(&self) -> bool {
        self.url.starts_with("wss://")
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("url", &self.url)
            .field("auth_token", &"<redacted>")
            .field("plugin_id", &self.plugin_id)
            .field("friendly_name", &self.friendly_name)
            .field("tls", &self.tls)
            .field("reconnect", &self.reconnect)
            .field("keepalive", &self.keepalive)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}
