use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Port of the hub's plugin WebSocket endpoint.
pub const HUB_WS_PORT: u16 = 9001;

/// Port of the hub's REST endpoint used for token activation.
pub const HUB_AUTH_PORT: u16 = 6969;

/// Upgrade request header carrying the plugin auth token.
pub const HEADER_AUTH_TOKEN: &str = "authtoken";

/// Upgrade request header carrying the plugin id.
pub const HEADER_PLUGIN_ID: &str = "plugin-id";

/// System request path that returns the full home state.
pub const PATH_GET_SYSTEM_STATE: &str = "/hmip/home/getSystemState";

/// System request path that switches a device channel on or off.
pub const PATH_SET_SWITCH_STATE: &str = "/hmip/device/control/setSwitchState";

/// Maximum accepted WebSocket message size.
///
/// A full system state of a large installation runs into the megabytes.
pub const WS_MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Default interval between keepalive pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(30);

/// Default delay between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Message type carried in the `type` field of the envelope.
///
/// Unknown type strings are preserved in [`MessageType::Other`] so that a
/// newer hub never makes decoding fail.
///
/// Equality and hashing go by the canonical wire name, so an `Other` holding
/// a known name (`Other("PLUGIN_STATE_RESPONSE")`) equals the known variant
/// it decodes to. Build values from strings with `From` to get the known
/// variant directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Hub asks whether the plugin is ready.
    PluginStateRequest,
    /// Plugin readiness announcement or reply.
    PluginStateResponse,
    /// Plugin-initiated request against the hub's REST-like API.
    SystemRequest,
    /// Hub reply to a system request.
    SystemResponse,
    /// Any type the bridge does not handle.
    Other(String),
}

impl MessageType {
    /// Returns the wire name of this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PluginStateRequest => "PLUGIN_STATE_REQUEST",
            Self::PluginStateResponse => "PLUGIN_STATE_RESPONSE",
            Self::SystemRequest => "HMIP_SYSTEM_REQUEST",
            Self::SystemResponse => "HMIP_SYSTEM_RESPONSE",
            Self::Other(s) => s,
        }
    }

    /// Wire name after mapping aliases and known names held in `Other`.
    pub fn canonical_name(&self) -> &str {
        match self {
            Self::Other(s) => known_wire_name(s).unwrap_or(s),
            known => known.as_str(),
        }
    }
}

/// Canonical name of a known type string, including accepted aliases.
fn known_wire_name(name: &str) -> Option<&'static str> {
    match name {
        // Older hub firmware sends the camel-cased variant.
        "PLUGIN_STATE_REQUEST" | "PluginStateRequest" => Some("PLUGIN_STATE_REQUEST"),
        "PLUGIN_STATE_RESPONSE" => Some("PLUGIN_STATE_RESPONSE"),
        "HMIP_SYSTEM_REQUEST" => Some("HMIP_SYSTEM_REQUEST"),
        "HMIP_SYSTEM_RESPONSE" => Some("HMIP_SYSTEM_RESPONSE"),
        _ => None,
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_name() == other.canonical_name()
    }
}

impl Eq for MessageType {}

impl Hash for MessageType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_name().hash(state);
    }
}

impl From<String> for MessageType {
    fn from(s: String) -> Self {
        match known_wire_name(&s) {
            Some("PLUGIN_STATE_REQUEST") => Self::PluginStateRequest,
            Some("PLUGIN_STATE_RESPONSE") => Self::PluginStateResponse,
            Some("HMIP_SYSTEM_REQUEST") => Self::SystemRequest,
            Some("HMIP_SYSTEM_RESPONSE") => Self::SystemResponse,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
