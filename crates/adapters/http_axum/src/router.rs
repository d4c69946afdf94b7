//! Axum router assembly.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use devicehub_app::ports::{MqttClient, Repository};

use crate::state::AppState;

/// Build the top-level axum [`Router`]. All REST routes are nested under
/// `/api/hdp` (§4.7); there is no dashboard or other outer surface.
pub fn build<R, M>(state: AppState<R, M>) -> Router
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/hdp", crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use devicehub_app::adapter_registry::AdapterRegistry;
    use devicehub_app::pairing_coordinator::PairingCoordinator;
    use devicehub_app::ports::mqtt_client::MessageHandler;
    use devicehub_app::ports::Repository;
    use devicehub_domain::device::Device;
    use devicehub_domain::device_state::DeviceState;
    use devicehub_domain::error::DeviceHubError;
    use devicehub_domain::id::DeviceId;
    use serde_json::Value as Json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct StubRepo {
        devices: Mutex<HashMap<DeviceId, Device>>,
    }

    impl Repository for StubRepo {
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
        async fn touch_online(&self, _id: DeviceId, _cancel: CancellationToken) -> Result<(), DeviceHubError> {
            Ok(())
        }
        async fn save_device_state(&self, _id: DeviceId, _state: Json, _cancel: CancellationToken) -> Result<(), DeviceHubError> {
            Ok(())
        }
        async fn get_device_state(&self, _id: DeviceId, _cancel: CancellationToken) -> Result<Option<DeviceState>, DeviceHubError> {
            Ok(None)
        }
        async fn delete_device_and_state(&self, id: DeviceId, _cancel: CancellationToken) -> Result<(), DeviceHubError> {
            self.devices.lock().unwrap().remove(&id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubMqtt;

    impl devicehub_app::ports::MqttClient for StubMqtt {
        async fn publish_with(&self, _topic: String, _payload: Vec<u8>, _retain: bool) -> Result<(), DeviceHubError> {
            Ok(())
        }
        async fn subscribe(&self, _filter: String, _handler: MessageHandler) -> Result<(), DeviceHubError> {
            Ok(())
        }
    }

    fn test_state() -> AppState<StubRepo, StubMqtt> {
        let repo = Arc::new(StubRepo::default());
        let mqtt = Arc::new(StubMqtt);
        let registry = Arc::new(AdapterRegistry::new());
        let pairing = PairingCoordinator::new(Arc::clone(&repo), Arc::clone(&mqtt), Arc::clone(&registry));
        AppState::new(repo, mqtt, registry, pairing)
    }

    #[tokio::test]
    async fn should_return_ok_when_health_check_called() {
        let app = build(test_state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn should_return_empty_list_when_no_devices() {
        let app = build(test_state());

        let response = app
            .oneshot(Request::builder().uri("/api/hdp/devices").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_device() {
        let app = build(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/hdp/devices/lan/unknown-bulb")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_route_canonical_id_with_embedded_slash_to_a_known_device() {
        let state = test_state();
        let device = Device::builder().protocol("zigbee").external_id("0xabcd").build().unwrap();
        state.repo.devices.lock().unwrap().insert(device.id, device);
        let app = build(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/hdp/devices/zigbee/0xABCD")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
