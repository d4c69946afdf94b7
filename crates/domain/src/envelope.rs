//! HDP v1 wire envelopes.
//!
//! Every envelope carries `schema: "hdp.v1"`, a `type` discriminator, and
//! `ts` (unix milliseconds), plus fields specific to its type (§6). Incoming
//! frames are parsed leniently — every domain field beyond `schema`/`type`
//! is optional, because payloads are opaque and never deep-validated (§9);
//! a field simply absent from the frame is `None`, not a parse error. Only
//! malformed JSON syntax is a parse error, and that is handled by the
//! ingest subscription handler, not here.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// The only schema version this hub speaks.
pub const SCHEMA: &str = "hdp.v1";

use crate::time;

/// `homenavi/hdp/adapter/hello` (non-retained).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdapterHelloFrame {
    pub adapter_id: String,
    pub protocol: String,
    pub version: String,
    pub supports_pairing: Option<bool>,
    pub supports_interview: Option<bool>,
    pub pairing: Option<AdapterPairingFrame>,
    pub status: Option<String>,
}

/// `homenavi/hdp/adapter/status/<adapter_id>` (retained). `adapter_id` is
/// inferred from the topic's last segment, not carried in the payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdapterStatusFrame {
    pub protocol: Option<String>,
    pub version: Option<String>,
    pub status: Option<String>,
    pub supports_pairing: Option<bool>,
    pub supports_interview: Option<bool>,
    pub pairing: Option<AdapterPairingFrame>,
}

/// The `pairing` sub-object of a hello/status frame.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterPairingFrame {
    pub supported: Option<bool>,
    pub label: Option<String>,
    pub default_timeout_sec: Option<u32>,
    pub instructions: Option<Vec<String>>,
    pub cta_label: Option<String>,
    pub notes: Option<String>,
}

/// `homenavi/hdp/device/metadata/<canonical_id>` (retained).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceMetadataFrame {
    pub protocol: Option<String>,
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub capabilities: Option<Json>,
    pub inputs: Option<Json>,
}

/// `homenavi/hdp/device/state/<canonical_id>` (retained).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceStateFrame {
    pub state: Option<Json>,
    pub corr: Option<String>,
    pub ts: Option<i64>,
    /// The remaining, untyped body — used as the state payload when `state`
    /// itself is absent from the frame (§4.5.b: "payload.state or the whole
    /// payload if absent").
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Json>,
}

/// `homenavi/hdp/device/event/<canonical_id>` (non-retained).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceEventFrame {
    pub event: Option<String>,
    pub data: Option<Json>,
}

/// `homenavi/hdp/pairing/progress/<protocol>` (non-retained).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PairingProgressFrame {
    pub protocol: Option<String>,
    pub stage: Option<String>,
    pub status: Option<String>,
    pub external_id: Option<String>,
    pub device_id: Option<String>,
    pub origin: Option<String>,
}

/// Origin tag the coordinator stamps on every frame it publishes, so it can
/// ignore its own echoes on the same topic (loop prevention, §4.6).
pub const ORIGIN_DEVICE_HUB: &str = "device-hub";

/// `homenavi/hdp/pairing/command/<protocol>` (non-retained), published by
/// the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct PairingCommandEnvelope {
    pub schema: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ts: i64,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<i64>,
}

impl PairingCommandEnvelope {
    #[must_use]
    pub fn start(timeout_sec: i64) -> Self {
        Self {
            schema: SCHEMA,
            kind: "pairing_command",
            ts: time::now_millis(),
            action: "start",
            timeout_sec: Some(timeout_sec),
        }
    }

    #[must_use]
    pub fn stop() -> Self {
        Self {
            schema: SCHEMA,
            kind: "pairing_command",
            ts: time::now_millis(),
            action: "stop",
            timeout_sec: None,
        }
    }
}

/// `homenavi/hdp/pairing/progress/<protocol>` (non-retained), published by
/// the coordinator on every transition.
#[derive(Debug, Clone, Serialize)]
pub struct PairingProgressEnvelope {
    pub schema: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ts: i64,
    pub protocol: String,
    pub status: String,
    pub origin: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl PairingProgressEnvelope {
    #[must_use]
    pub fn new(protocol: impl Into<String>, status: &str, device_id: Option<String>) -> Self {
        Self {
            schema: SCHEMA,
            kind: "pairing_progress",
            ts: time::now_millis(),
            protocol: protocol.into(),
            status: status.to_string(),
            origin: ORIGIN_DEVICE_HUB,
            device_id,
        }
    }
}

/// `homenavi/hdp/device/command/<canonical_id>` (non-retained), published
/// by the REST Surface for `set_state`/`refresh`/`remove_device`.
#[derive(Debug, Clone, Serialize)]
pub struct CommandEnvelope {
    pub schema: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ts: i64,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corr: Option<String>,
}

impl CommandEnvelope {
    #[must_use]
    pub fn new(command: impl Into<String>, args: Option<Json>, corr: Option<String>) -> Self {
        Self {
            schema: SCHEMA,
            kind: "device_command",
            ts: time::now_millis(),
            command: command.into(),
            args,
            corr,
        }
    }
}

/// `homenavi/hdp/device/metadata/<canonical_id>` (retained), republished by
/// the REST Surface after a `POST /devices` or `PATCH /devices/<id>` so
/// adapters and other hub instances observe the canonical record.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceMetadataEnvelope {
    pub schema: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ts: i64,
    pub protocol: String,
    pub external_id: String,
    pub name: String,
    pub icon: String,
    pub manufacturer: String,
    pub model: String,
    pub capabilities: Json,
    pub inputs: Json,
}

impl DeviceMetadataEnvelope {
    #[must_use]
    pub fn from_device(device: &crate::device::Device) -> Self {
        Self {
            schema: SCHEMA,
            kind: "device_metadata",
            ts: time::now_millis(),
            protocol: device.protocol.clone(),
            external_id: device.external_id.clone(),
            name: device.name.clone(),
            icon: device.icon.clone(),
            manufacturer: device.manufacturer.clone(),
            model: device.model.clone(),
            capabilities: device.capabilities.clone(),
            inputs: device.inputs.clone(),
        }
    }
}

/// `homenavi/hdp/device/event/<canonical_id>` (non-retained), published by
/// the hub itself (currently only `device_removed`).
#[derive(Debug, Clone, Serialize)]
pub struct DeviceEventEnvelope {
    pub schema: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ts: i64,
    pub event: &'static str,
}

impl DeviceEventEnvelope {
    #[must_use]
    pub fn device_removed() -> Self {
        Self {
            schema: SCHEMA,
            kind: "device_event",
            ts: time::now_millis(),
            event: "device_removed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_tolerate_missing_optional_fields_on_metadata_frame() {
        let frame: DeviceMetadataFrame = serde_json::from_str("{}").unwrap();
        assert!(frame.name.is_none());
        assert!(frame.capabilities.is_none());
    }

    #[test]
    fn should_use_rest_as_state_when_state_field_absent() {
        let frame: DeviceStateFrame = serde_json::from_str(r#"{"on": true, "corr": "abc"}"#).unwrap();
        assert!(frame.state.is_none());
        assert_eq!(frame.rest.get("on").unwrap(), &Json::Bool(true));
        assert_eq!(frame.corr.as_deref(), Some("abc"));
    }

    #[test]
    fn should_serialize_pairing_command_with_schema_and_kind() {
        let envelope = PairingCommandEnvelope::start(60);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["schema"], SCHEMA);
        assert_eq!(json["type"], "pairing_command");
        assert_eq!(json["action"], "start");
        assert_eq!(json["timeout_sec"], 60);
    }

    #[test]
    fn should_stamp_device_hub_origin_on_progress_envelope() {
        let envelope = PairingProgressEnvelope::new("lan", "active", None);
        assert_eq!(envelope.origin, ORIGIN_DEVICE_HUB);
    }

    #[test]
    fn should_omit_timeout_sec_for_stop_command() {
        let envelope = PairingCommandEnvelope::stop();
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("timeout_sec").is_none());
    }

    #[test]
    fn should_build_metadata_envelope_from_device() {
        let device = crate::device::Device::builder()
            .protocol("lan")
            .external_id("bulb-01")
            .name("Kitchen Light")
            .build()
            .unwrap();
        let envelope = DeviceMetadataEnvelope::from_device(&device);
        assert_eq!(envelope.protocol, "lan");
        assert_eq!(envelope.external_id, "bulb-01");
        assert_eq!(envelope.name, "Kitchen Light");
    }
}
