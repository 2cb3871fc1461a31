use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::constants::MessageType;

/// Errors produced when decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no string `type` field")]
    MissingType,
}

/// Envelope for all WebSocket communication with the hub.
///
/// The `body` is kept as an untyped JSON object; use [`Message::parse_body`]
/// to read it as one of the typed bodies in [`crate::messages`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "pluginId", default, deserialize_with = "lenient_string")]
    pub plugin_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub body: Map<String, Value>,
}

/// Reads a string field the hub may also send as `null` or a number.
///
/// Numbers and booleans keep their JSON text; anything else becomes empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    })
}

/// Non-object bodies carry nothing the bridge reads; they decode as empty.
fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

impl Message {
    /// Creates a message with a fresh UUIDv4 correlation id.
    pub fn new(
        plugin_id: impl Into<String>,
        msg_type: MessageType,
        body: Map<String, Value>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            id: uuid::Uuid::new_v4().to_string(),
            msg_type,
            body,
        }
    }

    /// Creates a message with a fresh id from a typed body.
    pub fn with_payload<T: Serialize>(
        plugin_id: impl Into<String>,
        msg_type: MessageType,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(plugin_id, msg_type, to_body(payload)?))
    }

    /// Creates a reply to this message that echoes its correlation id.
    pub fn reply<T: Serialize>(
        &self,
        plugin_id: impl Into<String>,
        msg_type: MessageType,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            plugin_id: plugin_id.into(),
            id: self.id.clone(),
            msg_type,
            body: to_body(payload)?,
        })
    }

    /// Deserializes the body into the given type.
    pub fn parse_body<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.body.clone()))
    }

    /// Encodes the message as a JSON text frame.
    ///
    /// Infallible: the envelope only holds strings and a JSON object.
    pub fn encode(&self) -> String {
        let mut obj = Map::with_capacity(4);
        obj.insert("pluginId".into(), Value::String(self.plugin_id.clone()));
        obj.insert("id".into(), Value::String(self.id.clone()));
        obj.insert("type".into(), Value::String(self.msg_type.as_str().into()));
        obj.insert("body".into(), Value::Object(self.body.clone()));
        Value::Object(obj).to_string()
    }

    /// Decodes an inbound frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;
        if !obj.get("type").is_some_and(Value::is_string) {
            return Err(DecodeError::MissingType);
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Serializes a typed payload into an envelope body.
pub fn to_body<T: Serialize>(payload: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(payload)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(serde::ser::Error::custom(format!(
            "message body must be a JSON object, got {other}"
        ))),
    }
}
