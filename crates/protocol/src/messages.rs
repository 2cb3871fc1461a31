use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{MessageType, PATH_GET_SYSTEM_STATE, PATH_SET_SWITCH_STATE};
use crate::envelope::Message;

// ---------------------------------------------------------------------------
// Plugin readiness
// ---------------------------------------------------------------------------

/// Readiness reported to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadinessStatus {
    Ready,
    ConfigRequired,
    Error,
}

/// Body of a `PLUGIN_STATE_RESPONSE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStateResponse {
    pub plugin_readiness_status: ReadinessStatus,
    pub friendly_name: String,
}

impl PluginStateResponse {
    /// A `READY` announcement under the given display name.
    pub fn ready(friendly_name: impl Into<String>) -> Self {
        Self {
            plugin_readiness_status: ReadinessStatus::Ready,
            friendly_name: friendly_name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// System requests
// ---------------------------------------------------------------------------

/// Body of an `HMIP_SYSTEM_REQUEST`: a REST-like call tunnelled over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRequest {
    pub path: String,
    #[serde(default)]
    pub body: Map<String, Value>,
}

/// Inner body of a `setSwitchState` system request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSwitchState {
    pub on: bool,
    pub channel_index: u32,
    pub device_id: String,
}

// ---------------------------------------------------------------------------
// System responses
// ---------------------------------------------------------------------------

/// Body of an `HMIP_SYSTEM_RESPONSE`.
///
/// The inner `body` is whatever the tunnelled call returned; for
/// `getSystemState` it is the full home state including the `devices` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default)]
    pub body: Value,
}

impl SystemResponse {
    /// Returns the inner body if it is a full system-state payload, i.e. an
    /// object carrying a `devices` object.
    pub fn system_state(&self) -> Option<&Map<String, Value>> {
        let state = self.body.as_object()?;
        state.get("devices")?.as_object()?;
        Some(state)
    }

    /// Consumes the response, returning the full system state if present.
    pub fn into_system_state(self) -> Option<Map<String, Value>> {
        match self.body {
            Value::Object(state) if state.get("devices").is_some_and(Value::is_object) => {
                Some(state)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Unsolicited `READY` announcement with a fresh correlation id.
pub fn plugin_ready(plugin_id: &str, friendly_name: &str) -> Result<Message, serde_json::Error> {
    Message::with_payload(
        plugin_id,
        MessageType::PluginStateResponse,
        &PluginStateResponse::ready(friendly_name),
    )
}

/// `READY` reply to a hub-initiated `PLUGIN_STATE_REQUEST`.
pub fn plugin_ready_reply(
    request: &Message,
    plugin_id: &str,
    friendly_name: &str,
) -> Result<Message, serde_json::Error> {
    request.reply(
        plugin_id,
        MessageType::PluginStateResponse,
        &PluginStateResponse::ready(friendly_name),
    )
}

/// System request for the full home state.
pub fn get_system_state(plugin_id: &str) -> Result<Message, serde_json::Error> {
    Message::with_payload(
        plugin_id,
        MessageType::SystemRequest,
        &SystemRequest {
            path: PATH_GET_SYSTEM_STATE.into(),
            body: Map::new(),
        },
    )
}

/// System request switching one device channel.
pub fn set_switch_state(
    plugin_id: &str,
    command: &SetSwitchState,
) -> Result<Message, serde_json::Error> {
    Message::with_payload(
        plugin_id,
        MessageType::SystemRequest,
        &SystemRequest {
            path: PATH_SET_SWITCH_STATE.into(),
            body: crate::envelope::to_body(command)?,
        },
    )
}
