//! End-to-end smoke tests for the full devicehubd stack.
//!
//! Each test spins up the complete application (in-memory `SQLite`, the real
//! repository, a fake in-process MQTT client, and the real axum router) and
//! exercises the HTTP layer via `tower::ServiceExt::oneshot` — no TCP port is
//! bound, and no real broker is required.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use devicehub_adapter_http_axum::router;
use devicehub_adapter_http_axum::state::AppState;
use devicehub_adapter_storage_sqlite_sqlx::{Config, SqliteRepository};
use devicehub_app::adapter_registry::AdapterRegistry;
use devicehub_app::pairing_coordinator::PairingCoordinator;
use devicehub_app::ports::mqtt_client::{IncomingMessage, MessageHandler};
use devicehub_app::ports::MqttClient;
use devicehub_domain::error::DeviceHubError;

/// In-process MQTT fake recording every publish; never reaches a broker.
#[derive(Default)]
struct FakeMqtt {
    published: Mutex<Vec<(String, Vec<u8>, bool)>>,
}

impl MqttClient for FakeMqtt {
    async fn publish_with(&self, topic: String, payload: Vec<u8>, retain: bool) -> Result<(), DeviceHubError> {
        self.published.lock().unwrap().push((topic, payload, retain));
        Ok(())
    }

    async fn subscribe(&self, _filter: String, _handler: MessageHandler) -> Result<(), DeviceHubError> {
        Ok(())
    }
}

async fn app() -> axum::Router {
    let db = Config {
        database_url: "sqlite::memory:".to_string(),
    }
    .build()
    .await
    .expect("in-memory database should initialize");

    let repo = Arc::new(SqliteRepository::new(db.pool().clone()));
    let mqtt = Arc::new(FakeMqtt::default());
    let registry = Arc::new(AdapterRegistry::new());
    let pairing = PairingCoordinator::new(Arc::clone(&repo), Arc::clone(&mqtt), Arc::clone(&registry));

    let state = AppState::new(repo, mqtt, registry, pairing);
    router::build(state)
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn should_return_ok_when_health_check_called() {
    let resp = app()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn should_complete_device_crud_cycle_through_rest_surface() {
    let app = app().await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/hdp/devices")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"protocol":"lan","external_id":"bulb-01","metadata":{"name":"Kitchen Light"}}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    let device_id = created["id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/hdp/devices")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/hdp/devices/{device_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/hdp/devices/lan/bulb-01")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK, "canonical id lookup should also resolve");

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/hdp/devices/{device_id}/commands"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"state":{"on":true}}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/hdp/devices/{device_id}?force=true"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/hdp/devices")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let list = body_json(resp).await;
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn should_reject_duplicate_device_creation_with_conflict() {
    let app = app().await;

    let create = || {
        Request::builder()
            .method("POST")
            .uri("/api/hdp/devices")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"protocol":"lan","external_id":"bulb-02"}"#))
            .unwrap()
    };

    let resp = app.clone().oneshot(create()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app.oneshot(create()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn should_return_not_found_for_unknown_device() {
    let resp = app()
        .await
        .oneshot(
            Request::builder()
                .uri("/api/hdp/devices/lan/no-such-device")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn should_start_and_stop_a_pairing_session_through_rest_surface() {
    let app = app().await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/hdp/pairings")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"protocol":"lan","timeout":30}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/hdp/pairings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let sessions = body_json(resp).await;
    assert_eq!(sessions.as_array().unwrap().len(), 1);

    let resp = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/hdp/pairings?protocol=lan")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

