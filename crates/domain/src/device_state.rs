//! `DeviceState` — the last known opaque state payload for a device.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::id::DeviceId;
use crate::time::{self, Timestamp};

/// Opaque, wholesale-replaced state for a device. Never deep-validated;
/// deleted atomically together with its owning [`Device`](crate::device::Device).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub device_id: DeviceId,
    pub state: Json,
    pub updated_at: Timestamp,
}

impl DeviceState {
    #[must_use]
    pub fn new(device_id: DeviceId, state: Json) -> Self {
        Self {
            device_id,
            state,
            updated_at: time::now(),
        }
    }

    /// `true` if the state payload carries nothing (an empty object, array,
    /// or `null`) — per §4.5.b, an empty state map is ignored on ingest.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.state {
            Json::Null => true,
            Json::Object(map) => map.is_empty(),
            Json::Array(items) => items.is_empty(),
            _ => false,
        }
    }
}
