//! JSON REST handlers for integrations, pairing config, and pairing
//! sessions (§4.7).

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use devicehub_app::ports::{MqttClient, Repository};
use devicehub_domain::adapter::{IntegrationSummary, PairingConfigSummary};
use devicehub_domain::pairing::{PairingSession, PairingStatus};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/hdp/integrations`
pub async fn integrations<R, M>(
    State(state): State<AppState<R, M>>,
) -> Json<Vec<IntegrationSummary>>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    Json(state.registry.integrations())
}

/// `GET /api/hdp/pairing-config`
pub async fn pairing_config<R, M>(
    State(state): State<AppState<R, M>>,
) -> Json<Vec<PairingConfigSummary>>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    Json(state.registry.pairing_configs())
}

/// `GET /api/hdp/pairings`
pub async fn list<R, M>(State(state): State<AppState<R, M>>) -> Json<Vec<PairingSession>>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    Json(state.pairing.list())
}

/// Request body for `POST /api/hdp/pairings`.
#[derive(Deserialize)]
pub struct StartPairingRequest {
    pub protocol: String,
    #[serde(default)]
    pub timeout: i64,
    #[serde(default)]
    pub metadata: JsonValue,
}

/// `POST /api/hdp/pairings`
pub async fn start<R, M>(
    State(state): State<AppState<R, M>>,
    Json(req): Json<StartPairingRequest>,
) -> Result<(StatusCode, Json<PairingSession>), ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    let known_devices: Vec<_> = state
        .repo
        .list(tokio_util::sync::CancellationToken::new())
        .await?
        .into_iter()
        .map(|device| device.id)
        .collect();

    let session = state
        .pairing
        .start(&req.protocol, req.timeout, req.metadata, known_devices)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(session)))
}

#[derive(Deserialize)]
pub struct StopPairingQuery {
    pub protocol: String,
}

/// `DELETE /api/hdp/pairings?protocol=<protocol>`
pub async fn stop<R, M>(
    State(state): State<AppState<R, M>>,
    Query(query): Query<StopPairingQuery>,
) -> Result<Json<PairingSession>, ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    let session = state.pairing.stop(&query.protocol, PairingStatus::Stopped).await?;
    Ok(Json(session))
}
