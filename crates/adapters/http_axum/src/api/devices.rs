//! JSON REST handlers for devices (§4.7).

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use devicehub_app::ports::{MqttClient, Repository};
use devicehub_domain::device::{Device, DeviceMetadataUpdate};
use devicehub_domain::envelope::{CommandEnvelope, DeviceMetadataEnvelope};
use devicehub_domain::error::{ConflictError, DeviceHubError, ValidationError};
use devicehub_domain::id::DeviceId;
use devicehub_domain::identity;

use crate::error::ApiError;
use crate::state::AppState;

/// Resolve `<id>` per §4.7: either the opaque surrogate id or the
/// canonical `protocol/external_id` form.
async fn resolve<R: Repository>(
    repo: &R,
    id: &str,
    cancel: CancellationToken,
) -> Result<Option<Device>, DeviceHubError> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return repo.get_by_id(DeviceId::from_uuid(uuid), cancel).await;
    }

    let Ok((protocol_raw, external_raw)) = identity::split(id) else {
        return Ok(None);
    };
    let Ok((_, normalized_external)) = identity::normalize(&protocol_raw, &external_raw) else {
        return Ok(None);
    };
    let protocol = protocol_raw.trim().to_ascii_lowercase();
    repo.get_by_external(protocol, normalized_external, cancel).await
}

fn not_found(id: &str) -> ApiError {
    DeviceHubError::from(devicehub_domain::error::NotFoundError {
        entity: "Device",
        id: id.to_string(),
    })
    .into()
}

/// Split a `/devices/<tail>` catch-all capture into the id portion and a
/// recognized trailing action, if any. `<id>` itself may embed `/` (canonical
/// ids like `zigbee/0xABCD`), so the route captures everything after
/// `/devices/` and this is where the `/commands`/`/refresh` suffixes are
/// peeled back off (§4.7, §6.3).
fn split_tail(tail: &str) -> (String, Option<&'static str>) {
    if let Some(id) = tail.strip_suffix("/commands") {
        return (id.to_string(), Some("commands"));
    }
    if let Some(id) = tail.strip_suffix("/refresh") {
        return (id.to_string(), Some("refresh"));
    }
    (tail.to_string(), None)
}

fn parse_body<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes)
        .map_err(|err| DeviceHubError::from(ValidationError::MalformedBody(err.to_string())).into())
}

fn parse_optional_body<T: serde::de::DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.is_empty() {
        Ok(T::default())
    } else {
        parse_body(bytes)
    }
}

/// A device enriched with its current state, per `GET /devices` / `GET
/// /devices/<id>`.
#[derive(Serialize)]
struct DeviceView {
    #[serde(flatten)]
    device: Device,
    state: JsonValue,
}

async fn enrich<R: Repository>(repo: &R, device: Device) -> Result<DeviceView, DeviceHubError> {
    let state = repo
        .get_device_state(device.id, CancellationToken::new())
        .await?
        .map_or(JsonValue::Object(serde_json::Map::new()), |s| s.state);
    Ok(DeviceView { device, state })
}

/// `GET /api/hdp/devices`
pub async fn list<R, M>(State(state): State<AppState<R, M>>) -> Result<Json<Vec<DeviceView>>, ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    let devices = state.repo.list(CancellationToken::new()).await?;
    let mut views = Vec::with_capacity(devices.len());
    for device in devices {
        views.push(enrich(&*state.repo, device).await?);
    }
    Ok(Json(views))
}

/// `GET /api/hdp/devices/<id>`, `<id>` may embed `/` (§6.3).
pub async fn get<R, M>(
    State(state): State<AppState<R, M>>,
    Path(tail): Path<String>,
) -> Result<Json<DeviceView>, ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    let (id, suffix) = split_tail(&tail);
    if suffix.is_some() {
        return Err(not_found(&tail));
    }
    let device = resolve(&*state.repo, &id, CancellationToken::new())
        .await?
        .ok_or_else(|| not_found(&id))?;
    Ok(Json(enrich(&*state.repo, device).await?))
}

/// Request body for `POST /api/hdp/devices`.
#[derive(Deserialize)]
pub struct CreateDeviceRequest {
    pub protocol: String,
    pub external_id: String,
    pub metadata: Option<CreateDeviceMetadata>,
    pub capabilities: Option<JsonValue>,
    pub inputs: Option<JsonValue>,
}

#[derive(Deserialize, Default)]
pub struct CreateDeviceMetadata {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

/// `POST /api/hdp/devices`
pub async fn create<R, M>(
    State(state): State<AppState<R, M>>,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<DeviceView>), ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    let (canonical, normalized_external) = identity::normalize(&req.protocol, &req.external_id)
        .map_err(DeviceHubError::from)?;
    let (protocol, _) = identity::split(&canonical).map_err(DeviceHubError::from)?;

    if state
        .repo
        .get_by_external(protocol.clone(), normalized_external.clone(), CancellationToken::new())
        .await?
        .is_some()
    {
        return Err(DeviceHubError::from(ConflictError::DeviceAlreadyExists {
            protocol,
            external_id: normalized_external,
        })
        .into());
    }

    let metadata = req.metadata.unwrap_or_default();
    let mut builder = Device::builder().protocol(protocol).external_id(normalized_external);
    if let Some(name) = metadata.name {
        builder = builder.name(name);
    }
    if let Some(icon) = metadata.icon {
        builder = builder.icon(icon);
    }
    if let Some(manufacturer) = metadata.manufacturer {
        builder = builder.manufacturer(manufacturer);
    }
    if let Some(model) = metadata.model {
        builder = builder.model(model);
    }
    if let Some(capabilities) = req.capabilities {
        builder = builder.capabilities(capabilities);
    }
    if let Some(inputs) = req.inputs {
        builder = builder.inputs(inputs);
    }

    let device = builder.build()?;
    let device = state.repo.upsert(device, CancellationToken::new()).await?;

    republish_metadata(&*state.mqtt, &device).await;

    let view = enrich(&*state.repo, device).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Request body for `PATCH /api/hdp/devices/<id>` — currently `icon` only
/// (§4.7).
#[derive(Deserialize)]
pub struct PatchDeviceRequest {
    pub icon: Option<String>,
}

/// `PATCH /api/hdp/devices/<id>` (already-stripped `id`, no trailing action).
pub async fn patch<R, M>(
    State(state): State<AppState<R, M>>,
    Path(id): Path<String>,
    Json(req): Json<PatchDeviceRequest>,
) -> Result<Json<DeviceView>, ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    if req.icon.is_none() {
        return Err(DeviceHubError::from(ValidationError::NoUpdatableField).into());
    }

    let mut device = resolve(&*state.repo, &id, CancellationToken::new())
        .await?
        .ok_or_else(|| not_found(&id))?;

    device.merge_metadata(&DeviceMetadataUpdate {
        icon: req.icon,
        ..Default::default()
    });

    let device = state.repo.upsert(device, CancellationToken::new()).await?;
    republish_metadata(&*state.mqtt, &device).await;

    Ok(Json(enrich(&*state.repo, device).await?))
}

/// Dispatches `PATCH /api/hdp/devices/<id>` (metadata patch) and `PATCH
/// /api/hdp/devices/<id>/commands` (`set_state`) from the same catch-all
/// route, since `<id>` may itself embed `/` (§6.3).
pub async fn patch_dispatch<R, M>(
    state: State<AppState<R, M>>,
    Path(tail): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    match split_tail(&tail) {
        (id, None) => {
            let req: PatchDeviceRequest = parse_body(&body)?;
            patch(state, Path(id), Json(req)).await.map(IntoResponse::into_response)
        }
        (id, Some("commands")) => {
            let req: SetStateRequest = parse_body(&body)?;
            set_state(state, Path(id), Json(req)).await.map(IntoResponse::into_response)
        }
        _ => Err(not_found(&tail)),
    }
}

#[derive(Deserialize, Default)]
pub struct DeleteQuery {
    #[serde(default)]
    pub force: bool,
}

/// `DELETE /api/hdp/devices/<id>?force=<bool>`, `<id>` may embed `/` (§6.3).
pub async fn delete<R, M>(
    State(state): State<AppState<R, M>>,
    Path(tail): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    let (id, suffix) = split_tail(&tail);
    if suffix.is_some() {
        return Err(not_found(&tail));
    }
    let device = resolve(&*state.repo, &id, CancellationToken::new())
        .await?
        .ok_or_else(|| not_found(&id))?;

    if !query.force {
        let envelope = CommandEnvelope::new("remove_device", None, None);
        let payload = serde_json::to_vec(&envelope).unwrap_or_default();
        let topic = format!("homenavi/hdp/device/command/{}", device.canonical_id());
        if let Err(err) = state.mqtt.publish(topic, payload).await {
            tracing::warn!(device_id = %device.id, error = %err, "failed to publish remove_device command");
        }
    }

    state
        .repo
        .delete_device_and_state(device.id, CancellationToken::new())
        .await?;
    devicehub_app::ingest::publish_removal_tombstones(&*state.mqtt, &device.canonical_id()).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Request body for `POST|PATCH /api/hdp/devices/<id>/commands`.
#[derive(Deserialize)]
pub struct SetStateRequest {
    pub state: JsonValue,
    pub transition_ms: Option<u64>,
    pub correlation_id: Option<String>,
}

#[derive(Serialize)]
pub struct CommandQueuedResponse {
    pub status: &'static str,
    pub device_id: DeviceId,
    pub corr: String,
}

/// `POST|PATCH /api/hdp/devices/<id>/commands` (already-stripped `id`, no
/// trailing action). `args` is the filtered state map itself, augmented with
/// `transition_ms` — not `args.state` (§4.7, §8).
pub async fn set_state<R, M>(
    State(state): State<AppState<R, M>>,
    Path(id): Path<String>,
    Json(req): Json<SetStateRequest>,
) -> Result<(StatusCode, Json<CommandQueuedResponse>), ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    let filtered = filter_non_empty(req.state);
    if matches!(&filtered, JsonValue::Object(map) if map.is_empty()) {
        return Err(DeviceHubError::from(ValidationError::EmptyState).into());
    }

    let device = resolve(&*state.repo, &id, CancellationToken::new())
        .await?
        .ok_or_else(|| not_found(&id))?;

    let corr = req.correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut args = match filtered {
        JsonValue::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("state".to_string(), other);
            map
        }
    };
    if let Some(transition_ms) = req.transition_ms {
        args.insert("transition_ms".to_string(), JsonValue::from(transition_ms));
    }

    let envelope = CommandEnvelope::new("set_state", Some(JsonValue::Object(args)), Some(corr.clone()));
    let payload = serde_json::to_vec(&envelope).unwrap_or_default();
    let topic = format!("homenavi/hdp/device/command/{}", device.canonical_id());
    state.mqtt.publish(topic, payload).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CommandQueuedResponse {
            status: "queued",
            device_id: device.id,
            corr,
        }),
    ))
}

/// Drop `null` values and empty string/object/array values from a state
/// map before checking it is non-empty (§4.7).
fn filter_non_empty(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .filter(|(_, v)| !is_blank(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Request body for `POST /api/hdp/devices/<id>/refresh`.
#[derive(Deserialize, Default)]
pub struct RefreshRequest {
    pub metadata: Option<bool>,
    pub state: Option<bool>,
    pub properties: Option<Vec<String>>,
}

/// `POST /api/hdp/devices/<id>/refresh` (already-stripped `id`, no trailing
/// action).
pub async fn refresh<R, M>(
    State(state): State<AppState<R, M>>,
    Path(id): Path<String>,
    body: Option<Json<RefreshRequest>>,
) -> Result<StatusCode, ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let device = resolve(&*state.repo, &id, CancellationToken::new())
        .await?
        .ok_or_else(|| not_found(&id))?;

    let metadata = req.metadata.unwrap_or(true);
    let mut refresh_state = req.state.unwrap_or(true);
    if !metadata && !refresh_state {
        refresh_state = true;
    }

    let mut args = serde_json::Map::new();
    args.insert("metadata".to_string(), JsonValue::Bool(metadata));
    args.insert("state".to_string(), JsonValue::Bool(refresh_state));
    if let Some(properties) = req.properties {
        args.insert(
            "properties".to_string(),
            JsonValue::Array(properties.into_iter().map(JsonValue::String).collect()),
        );
    }

    let envelope = CommandEnvelope::new("refresh", Some(JsonValue::Object(args)), None);
    let payload = serde_json::to_vec(&envelope).unwrap_or_default();
    let topic = format!("homenavi/hdp/device/command/{}", device.canonical_id());
    state.mqtt.publish(topic, payload).await?;

    Ok(StatusCode::ACCEPTED)
}

/// Dispatches `POST /api/hdp/devices/<id>/commands` (`set_state`) and `POST
/// /api/hdp/devices/<id>/refresh` from the same catch-all route, since
/// `<id>` may itself embed `/` (§6.3).
pub async fn post_dispatch<R, M>(
    state: State<AppState<R, M>>,
    Path(tail): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    match split_tail(&tail) {
        (id, Some("commands")) => {
            let req: SetStateRequest = parse_body(&body)?;
            set_state(state, Path(id), Json(req)).await.map(IntoResponse::into_response)
        }
        (id, Some("refresh")) => {
            let req: RefreshRequest = parse_optional_body(&body)?;
            refresh(state, Path(id), Some(Json(req))).await.map(IntoResponse::into_response)
        }
        _ => Err(not_found(&tail)),
    }
}

async fn republish_metadata<M: MqttClient>(mqtt: &M, device: &Device) {
    let envelope = DeviceMetadataEnvelope::from_device(device);
    let payload = serde_json::to_vec(&envelope).unwrap_or_default();
    let topic = format!("homenavi/hdp/device/metadata/{}", device.canonical_id());
    if let Err(err) = mqtt.publish_with(topic, payload, true).await {
        tracing::warn!(device_id = %device.id, error = %err, "failed to republish device metadata");
    }
}
