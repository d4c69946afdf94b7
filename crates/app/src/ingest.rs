//! HDP Ingest (§4.5) — subscribes the whole HDP topic table and dispatches
//! each frame to the Repository, Adapter Registry, or Pairing Coordinator.
//!
//! A JSON decode failure is logged at `debug` and the frame is dropped; it
//! never aborts the subscription or propagates as a [`DeviceHubError`].

use std::sync::Arc;

use devicehub_domain::device::{Device, DeviceMetadataUpdate};
use devicehub_domain::device_state::DeviceState;
use devicehub_domain::envelope::{
    AdapterHelloFrame, AdapterStatusFrame, DeviceEventEnvelope, DeviceEventFrame,
    DeviceMetadataFrame, DeviceStateFrame, PairingProgressFrame,
};
use devicehub_domain::error::DeviceHubError;
use devicehub_domain::identity;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

use crate::adapter_registry::AdapterRegistry;
use crate::pairing_coordinator::PairingCoordinator;
use crate::ports::mqtt_client::{IncomingMessage, MessageHandler};
use crate::ports::{MqttClient, Repository};

const BASE: &str = "homenavi/hdp";

/// Ties the three core services to the live HDP topic space. Construct
/// behind an `Arc`; `start` registers every subscription in the table.
pub struct HdpIngest<R, M> {
    repo: Arc<R>,
    mqtt: Arc<M>,
    registry: Arc<AdapterRegistry>,
    pairing: Arc<PairingCoordinator<R, M>>,
}

impl<R, M> HdpIngest<R, M>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        repo: Arc<R>,
        mqtt: Arc<M>,
        registry: Arc<AdapterRegistry>,
        pairing: Arc<PairingCoordinator<R, M>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            mqtt,
            registry,
            pairing,
        })
    }

    /// Register every subscription in the HDP topic table (§4.5).
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying [`MqttClient::subscribe`] call
    /// returns — a subscription failure here is a startup error, not an
    /// ingest-time one.
    pub async fn start(self: &Arc<Self>) -> Result<(), DeviceHubError> {
        self.subscribe_adapter_hello().await?;
        self.subscribe_adapter_status().await?;
        self.subscribe_device_metadata().await?;
        self.subscribe_device_state().await?;
        self.subscribe_device_event().await?;
        self.subscribe_pairing_progress().await?;
        Ok(())
    }

    async fn subscribe_adapter_hello(self: &Arc<Self>) -> Result<(), DeviceHubError> {
        let registry = Arc::clone(&self.registry);
        let handler: MessageHandler = Arc::new(move |msg: IncomingMessage| {
            let registry = Arc::clone(&registry);
            Box::pin(async move {
                match serde_json::from_slice::<AdapterHelloFrame>(&msg.payload) {
                    Ok(frame) => registry.ingest_hello(frame),
                    Err(err) => {
                        tracing::debug!(topic = %msg.topic, error = %err, "dropping malformed adapter/hello frame");
                    }
                }
            })
        });
        self.mqtt.subscribe(format!("{BASE}/adapter/hello"), handler).await
    }

    async fn subscribe_adapter_status(self: &Arc<Self>) -> Result<(), DeviceHubError> {
        let registry = Arc::clone(&self.registry);
        let handler: MessageHandler = Arc::new(move |msg: IncomingMessage| {
            let registry = Arc::clone(&registry);
            Box::pin(async move {
                let Some(adapter_id) = msg.topic.rsplit('/').next() else { return };
                let adapter_id = adapter_id.to_string();
                match serde_json::from_slice::<AdapterStatusFrame>(&msg.payload) {
                    Ok(frame) => registry.ingest_status(adapter_id, frame),
                    Err(err) => {
                        tracing::debug!(topic = %msg.topic, error = %err, "dropping malformed adapter/status frame");
                    }
                }
            })
        });
        self.mqtt.subscribe(format!("{BASE}/adapter/status/#"), handler).await
    }

    async fn subscribe_device_metadata(self: &Arc<Self>) -> Result<(), DeviceHubError> {
        let repo = Arc::clone(&self.repo);
        let pairing = Arc::clone(&self.pairing);
        let handler: MessageHandler = Arc::new(move |msg: IncomingMessage| {
            let repo = Arc::clone(&repo);
            let pairing = Arc::clone(&pairing);
            Box::pin(async move { handle_device_metadata(repo.as_ref(), pairing.as_ref(), &msg).await })
        });
        self.mqtt.subscribe(format!("{BASE}/device/metadata/#"), handler).await
    }

    async fn subscribe_device_state(self: &Arc<Self>) -> Result<(), DeviceHubError> {
        let repo = Arc::clone(&self.repo);
        let handler: MessageHandler = Arc::new(move |msg: IncomingMessage| {
            let repo = Arc::clone(&repo);
            Box::pin(async move { handle_device_state(repo.as_ref(), &msg).await })
        });
        self.mqtt.subscribe(format!("{BASE}/device/state/#"), handler).await
    }

    async fn subscribe_device_event(self: &Arc<Self>) -> Result<(), DeviceHubError> {
        let repo = Arc::clone(&self.repo);
        let mqtt = Arc::clone(&self.mqtt);
        let handler: MessageHandler = Arc::new(move |msg: IncomingMessage| {
            let repo = Arc::clone(&repo);
            let mqtt = Arc::clone(&mqtt);
            Box::pin(async move { handle_device_event(repo.as_ref(), mqtt.as_ref(), &msg).await })
        });
        self.mqtt.subscribe(format!("{BASE}/device/event/#"), handler).await
    }

    async fn subscribe_pairing_progress(self: &Arc<Self>) -> Result<(), DeviceHubError> {
        let pairing = Arc::clone(&self.pairing);
        let handler: MessageHandler = Arc::new(move |msg: IncomingMessage| {
            let pairing = Arc::clone(&pairing);
            Box::pin(async move {
                let Some(protocol_from_topic) = msg.topic.rsplit('/').next() else { return };
                let protocol_from_topic = protocol_from_topic.to_string();
                match serde_json::from_slice::<PairingProgressFrame>(&msg.payload) {
                    Ok(frame) => pairing.on_progress_frame(&protocol_from_topic, frame).await,
                    Err(err) => {
                        tracing::debug!(topic = %msg.topic, error = %err, "dropping malformed pairing_progress frame");
                    }
                }
            })
        });
        self.mqtt.subscribe(format!("{BASE}/pairing/progress/#"), handler).await
    }
}

/// §4.5.a. Derive `(protocol, external)` from the topic's id segment, or —
/// when that segment carries no `/` — from `payload.protocol` plus the
/// whole segment; normalize; drop silently on any failure.
async fn handle_device_metadata<R, M>(repo: &R, pairing: &PairingCoordinator<R, M>, msg: &IncomingMessage)
where
    R: Repository,
    M: MqttClient,
{
    let Some(id_segment) = msg.topic.strip_prefix(&format!("{BASE}/device/metadata/")) else {
        return;
    };
    let frame: DeviceMetadataFrame = match serde_json::from_slice(&msg.payload) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::debug!(topic = %msg.topic, error = %err, "dropping malformed device/metadata frame");
            return;
        }
    };

    let (protocol_raw, external_raw) = match identity::split(id_segment) {
        Ok(parts) => parts,
        Err(_) => {
            let Some(protocol) = frame.protocol.clone() else { return };
            (protocol, id_segment.to_string())
        }
    };
    let Ok((_, normalized_external)) = identity::normalize(&protocol_raw, &external_raw) else {
        return;
    };
    let protocol = protocol_raw.trim().to_ascii_lowercase();

    let cancel = CancellationToken::new();
    let existing = repo
        .get_by_external(protocol.clone(), normalized_external.clone(), cancel.clone())
        .await
        .ok()
        .flatten();
    let is_new = existing.is_none();
    let mut device = existing.unwrap_or_else(|| {
        Device::builder()
            .protocol(protocol.clone())
            .external_id(normalized_external.clone())
            .build()
            .expect("protocol and external_id are non-empty after normalize")
    });

    let changed = device.merge_metadata(&DeviceMetadataUpdate {
        name: frame.name,
        icon: frame.icon,
        manufacturer: frame.manufacturer,
        model: frame.model,
        capabilities: frame.capabilities,
        inputs: frame.inputs,
    });

    if !changed && !is_new {
        return;
    }

    let device = match repo.upsert(device, cancel).await {
        Ok(device) => device,
        Err(err) => {
            tracing::warn!(%protocol, error = %err, "failed to persist ingested device metadata");
            return;
        }
    };

    if is_new {
        pairing.on_device_candidate(&device).await;
    }
}

/// §4.5.b. Resolve via `split` + `normalize` + `GetByExternal`; an absent
/// device or an empty state payload is silently ignored.
async fn handle_device_state<R: Repository>(repo: &R, msg: &IncomingMessage) {
    let Some(id_segment) = msg.topic.strip_prefix(&format!("{BASE}/device/state/")) else {
        return;
    };
    let Ok((protocol_raw, external_raw)) = identity::split(id_segment) else {
        return;
    };
    let Ok((_, normalized_external)) = identity::normalize(&protocol_raw, &external_raw) else {
        return;
    };

    let frame: DeviceStateFrame = match serde_json::from_slice(&msg.payload) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::debug!(topic = %msg.topic, error = %err, "dropping malformed device/state frame");
            return;
        }
    };
    if let Some(corr) = &frame.corr {
        tracing::debug!(%corr, "device state correlation id");
    }
    if let Some(ts) = frame.ts {
        tracing::debug!(ts, "device state frame timestamp");
    }

    let protocol = protocol_raw.trim().to_ascii_lowercase();
    let cancel = CancellationToken::new();
    let Ok(Some(device)) = repo.get_by_external(protocol, normalized_external, cancel.clone()).await else {
        return;
    };

    let state = frame.state.unwrap_or_else(|| Json::Object(frame.rest));
    if DeviceState::new(device.id, state.clone()).is_empty() {
        return;
    }

    if let Err(err) = repo.touch_online(device.id, cancel.clone()).await {
        tracing::warn!(error = %err, "failed to mark device online during state ingest");
    }
    if let Err(err) = repo.save_device_state(device.id, state, cancel).await {
        tracing::warn!(error = %err, "failed to persist ingested device state");
    }
}

/// §4.5.c. Only `device_removed` has hub-side effect; other event names are
/// out of scope for the core and are ignored.
async fn handle_device_event<R: Repository, M: MqttClient>(repo: &R, mqtt: &M, msg: &IncomingMessage) {
    let Some(id_segment) = msg.topic.strip_prefix(&format!("{BASE}/device/event/")) else {
        return;
    };
    let Ok((protocol_raw, external_raw)) = identity::split(id_segment) else {
        return;
    };
    let Ok((canonical_id, normalized_external)) = identity::normalize(&protocol_raw, &external_raw) else {
        return;
    };

    let frame: DeviceEventFrame = match serde_json::from_slice(&msg.payload) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::debug!(topic = %msg.topic, error = %err, "dropping malformed device/event frame");
            return;
        }
    };
    if frame.event.as_deref() != Some("device_removed") {
        return;
    }

    let protocol = protocol_raw.trim().to_ascii_lowercase();
    let cancel = CancellationToken::new();
    let Ok(Some(device)) = repo.get_by_external(protocol, normalized_external, cancel.clone()).await else {
        return;
    };

    if let Err(err) = repo.delete_device_and_state(device.id, cancel).await {
        tracing::warn!(error = %err, "failed to delete device on device_removed event");
        return;
    }

    publish_removal_tombstones(mqtt, &canonical_id).await;
}

/// Publish zero-byte retained tombstones on the metadata/state/command_result
/// topics for `canonical_id`, then the non-retained `device_removed` event
/// (§4.6 "Retained-topic hygiene on deletion", §6). Shared with the REST
/// Surface's `DELETE /devices/<id>` handler.
pub async fn publish_removal_tombstones<M: MqttClient>(mqtt: &M, canonical_id: &str) {
    for suffix in ["metadata", "state", "command_result"] {
        let topic = format!("{BASE}/device/{suffix}/{canonical_id}");
        if let Err(err) = mqtt.publish_with(topic.clone(), Vec::new(), true).await {
            tracing::warn!(topic = %topic, error = %err, "failed to publish retained tombstone");
        }
    }
    let payload = serde_json::to_vec(&DeviceEventEnvelope::device_removed()).unwrap_or_default();
    if let Err(err) = mqtt.publish(format!("{BASE}/device/event/{canonical_id}"), payload).await {
        tracing::warn!(%canonical_id, error = %err, "failed to publish device_removed event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devicehub_domain::id::DeviceId;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRepo {
        devices: Mutex<HashMap<DeviceId, Device>>,
        states: Mutex<HashMap<DeviceId, Json>>,
        online_touches: Mutex<Vec<DeviceId>>,
    }

    impl Repository for FakeRepo {
        async fn upsert(&self, device: Device, _cancel: CancellationToken) -> Result<Device, DeviceHubError> {
            self.devices.lock().unwrap().insert(device.id, device.clone());
            Ok(device)
        }
        async fn get_by_id(&self, id: DeviceId, _cancel: CancellationToken) -> Result<Option<Device>, DeviceHubError> {
            Ok(self.devices.lock().unwrap().get(&id).cloned())
        }
        async fn get_by_external(
            &self,
            protocol: String,
            normalized_external: String,
            _cancel: CancellationToken,
        ) -> Result<Option<Device>, DeviceHubError> {
            Ok(self
                .devices
                .lock()
                .unwrap()
                .values()
                .find(|d| d.protocol == protocol && d.external_id == normalized_external)
                .cloned())
        }
        async fn list(&self, _cancel: CancellationToken) -> Result<Vec<Device>, DeviceHubError> {
            Ok(self.devices.lock().unwrap().values().cloned().collect())
        }
        async fn touch_online(&self, id: DeviceId, _cancel: CancellationToken) -> Result<(), DeviceHubError> {
            self.online_touches.lock().unwrap().push(id);
            if let Some(device) = self.devices.lock().unwrap().get_mut(&id) {
                device.online = true;
            }
            Ok(())
        }
        async fn save_device_state(
            &self,
            id: DeviceId,
            state: Json,
            _cancel: CancellationToken,
        ) -> Result<(), DeviceHubError> {
            self.states.lock().unwrap().insert(id, state);
            Ok(())
        }
        async fn get_device_state(
            &self,
            id: DeviceId,
            _cancel: CancellationToken,
        ) -> Result<Option<DeviceState>, DeviceHubError> {
            Ok(self.states.lock().unwrap().get(&id).cloned().map(|state| DeviceState::new(id, state)))
        }
        async fn delete_device_and_state(&self, id: DeviceId, _cancel: CancellationToken) -> Result<(), DeviceHubError> {
            self.devices.lock().unwrap().remove(&id);
            self.states.lock().unwrap().remove(&id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeMqtt {
        published: Mutex<Vec<(String, Vec<u8>, bool)>>,
    }

    impl MqttClient for FakeMqtt {
        async fn publish_with(&self, topic: String, payload: Vec<u8>, retain: bool) -> Result<(), DeviceHubError> {
            self.published.lock().unwrap().push((topic, payload, retain));
            Ok(())
        }
        async fn subscribe(
            &self,
            _filter: String,
            _handler: MessageHandler,
        ) -> Result<(), DeviceHubError> {
            Ok(())
        }
    }

    fn message(topic: &str, body: Json) -> IncomingMessage {
        IncomingMessage {
            topic: topic.to_string(),
            payload: serde_json::to_vec(&body).unwrap(),
            retained: true,
        }
    }

    #[tokio::test]
    async fn should_create_device_on_first_metadata_frame() {
        let repo = FakeRepo::default();
        let registry = Arc::new(AdapterRegistry::new());
        let pairing = PairingCoordinator::new(Arc::new(FakeRepo::default()), Arc::new(FakeMqtt::default()), Arc::clone(&registry));

        let msg = message(
            "homenavi/hdp/device/metadata/lan/bulb-01",
            json!({"name": "Kitchen Light"}),
        );
        handle_device_metadata(&repo, pairing.as_ref(), &msg).await;

        let devices = repo.devices.lock().unwrap();
        assert_eq!(devices.len(), 1);
        let device = devices.values().next().unwrap();
        assert_eq!(device.protocol, "lan");
        assert_eq!(device.external_id, "bulb-01");
        assert_eq!(device.name, "Kitchen Light");
    }

    #[tokio::test]
    async fn should_skip_write_when_metadata_unchanged_for_existing_device() {
        let repo = FakeRepo::default();
        let device = Device::builder()
            .protocol("lan")
            .external_id("bulb-01")
            .name("Kitchen Light")
            .build()
            .unwrap();
        repo.devices.lock().unwrap().insert(device.id, device.clone());

        let registry = Arc::new(AdapterRegistry::new());
        let pairing = PairingCoordinator::new(Arc::new(FakeRepo::default()), Arc::new(FakeMqtt::default()), registry);

        let msg = message(
            "homenavi/hdp/device/metadata/lan/bulb-01",
            json!({"name": "Kitchen Light"}),
        );
        handle_device_metadata(&repo, pairing.as_ref(), &msg).await;

        assert_eq!(repo.devices.lock().unwrap().len(), 1, "no duplicate device should be created");
    }

    #[tokio::test]
    async fn should_drop_metadata_frame_with_no_derivable_protocol() {
        let repo = FakeRepo::default();
        let registry = Arc::new(AdapterRegistry::new());
        let pairing = PairingCoordinator::new(Arc::new(FakeRepo::default()), Arc::new(FakeMqtt::default()), registry);

        let msg = message("homenavi/hdp/device/metadata/onlyonesegment", json!({"name": "x"}));
        handle_device_metadata(&repo, pairing.as_ref(), &msg).await;

        assert!(repo.devices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_persist_state_and_touch_online_for_known_device() {
        let repo = FakeRepo::default();
        let device = Device::builder().protocol("lan").external_id("bulb-01").build().unwrap();
        repo.devices.lock().unwrap().insert(device.id, device.clone());

        let msg = message("homenavi/hdp/device/state/lan/bulb-01", json!({"on": true}));
        handle_device_state(&repo, &msg).await;

        assert_eq!(repo.online_touches.lock().unwrap().len(), 1);
        let states = repo.states.lock().unwrap();
        assert_eq!(states.get(&device.id).unwrap()["on"], json!(true));
    }

    #[tokio::test]
    async fn should_ignore_empty_state_payload() {
        let repo = FakeRepo::default();
        let device = Device::builder().protocol("lan").external_id("bulb-01").build().unwrap();
        repo.devices.lock().unwrap().insert(device.id, device.clone());

        let msg = message("homenavi/hdp/device/state/lan/bulb-01", json!({"state": {}}));
        handle_device_state(&repo, &msg).await;

        assert!(repo.states.lock().unwrap().is_empty());
        assert!(repo.online_touches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_ignore_state_for_unknown_device() {
        let repo = FakeRepo::default();
        let msg = message("homenavi/hdp/device/state/lan/ghost", json!({"on": true}));
        handle_device_state(&repo, &msg).await;
        assert!(repo.states.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_delete_device_and_publish_tombstones_on_device_removed_event() {
        let repo = FakeRepo::default();
        let mqtt = FakeMqtt::default();
        let device = Device::builder().protocol("lan").external_id("bulb-01").build().unwrap();
        repo.devices.lock().unwrap().insert(device.id, device.clone());

        let msg = message(
            "homenavi/hdp/device/event/lan/bulb-01",
            json!({"event": "device_removed"}),
        );
        handle_device_event(&repo, &mqtt, &msg).await;

        assert!(repo.devices.lock().unwrap().is_empty());
        let published = mqtt.published.lock().unwrap();
        assert_eq!(published.len(), 4, "3 tombstones plus the device_removed event");
        assert!(published.iter().take(3).all(|(_, payload, retain)| payload.is_empty() && *retain));
        assert!(!published[3].2, "device_removed event must not be retained");
    }

    #[tokio::test]
    async fn should_ignore_non_removal_event() {
        let repo = FakeRepo::default();
        let mqtt = FakeMqtt::default();
        let device = Device::builder().protocol("lan").external_id("bulb-01").build().unwrap();
        repo.devices.lock().unwrap().insert(device.id, device.clone());

        let msg = message("homenavi/hdp/device/event/lan/bulb-01", json!({"event": "button_pressed"}));
        handle_device_event(&repo, &mqtt, &msg).await;

        assert_eq!(repo.devices.lock().unwrap().len(), 1);
        assert!(mqtt.published.lock().unwrap().is_empty());
    }
}
