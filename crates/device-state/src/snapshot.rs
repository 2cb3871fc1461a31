use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Full system state as last received from the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStateSnapshot {
    /// When the bridge received this state.
    pub received_at: DateTime<Utc>,
    /// The system-state body, including `devices`, `groups` and `home`.
    pub state: Map<String, Value>,
}

/// Id, label and type of one device, as listed in overviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub device_type: String,
}

impl DeviceStateSnapshot {
    /// Wraps a system-state body received now.
    ///
    /// Returns `None` unless the body carries a `devices` object.
    pub fn from_system_state(state: Map<String, Value>) -> Option<Self> {
        Self::received(state, Utc::now())
    }

    pub fn received(state: Map<String, Value>, received_at: DateTime<Utc>) -> Option<Self> {
        if !state.get("devices").is_some_and(Value::is_object) {
            return None;
        }
        Some(Self { received_at, state })
    }

    /// Device id → device attributes.
    ///
    /// Only `None` for a hand-edited snapshot file without `devices`.
    pub fn devices(&self) -> Option<&Map<String, Value>> {
        self.state.get("devices").and_then(Value::as_object)
    }

    pub fn device(&self, id: &str) -> Option<&Value> {
        self.devices()?.get(id)
    }

    pub fn device_count(&self) -> usize {
        self.devices().map_or(0, Map::len)
    }

    /// One summary per device, ordered by id.
    pub fn summaries(&self) -> Vec<DeviceSummary> {
        let Some(devices) = self.devices() else {
            return Vec::new();
        };
        let mut out: Vec<DeviceSummary> = devices
            .iter()
            .map(|(id, dev)| DeviceSummary {
                id: id.clone(),
                label: string_field(dev, "label"),
                device_type: string_field(dev, "type"),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

fn string_field(device: &Value, key: &str) -> String {
    device
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
