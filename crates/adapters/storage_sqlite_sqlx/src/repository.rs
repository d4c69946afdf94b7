//! `SQLite` implementation of the [`Repository`] port.

use std::future::Future;

use serde_json::Value as Json;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};
use tokio_util::sync::CancellationToken;

use devicehub_app::ports::Repository;
use devicehub_domain::device::Device;
use devicehub_domain::device_state::DeviceState;
use devicehub_domain::error::DeviceHubError;
use devicehub_domain::id::DeviceId;

use crate::error::StorageError;

struct DeviceRow(Device);

impl FromRow<'_, SqliteRow> for DeviceRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let capabilities: String = row.try_get("capabilities")?;
        let inputs: String = row.try_get("inputs")?;

        Ok(Self(Device {
            id: DeviceId::from_uuid(row.try_get("id")?),
            protocol: row.try_get("protocol")?,
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            icon: row.try_get("icon")?,
            manufacturer: row.try_get("manufacturer")?,
            model: row.try_get("model")?,
            capabilities: decode_json(&capabilities)?,
            inputs: decode_json(&inputs)?,
            online: row.try_get("online")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

fn decode_json(text: &str) -> Result<Json, sqlx::Error> {
    serde_json::from_str(text).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

fn encode_json(value: &Json) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

struct DeviceStateRow(DeviceState);

impl FromRow<'_, SqliteRow> for DeviceStateRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let state: String = row.try_get("state")?;
        Ok(Self(DeviceState {
            device_id: DeviceId::from_uuid(row.try_get("device_id")?),
            state: decode_json(&state)?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

const UPSERT: &str = "\
    INSERT INTO devices (id, protocol, external_id, name, icon, manufacturer, model, capabilities, inputs, online, created_at, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(id) DO UPDATE SET \
    protocol = excluded.protocol, external_id = excluded.external_id, name = excluded.name, icon = excluded.icon, \
    manufacturer = excluded.manufacturer, model = excluded.model, capabilities = excluded.capabilities, \
    inputs = excluded.inputs, online = excluded.online, updated_at = excluded.updated_at";
const SELECT_BY_ID: &str = "SELECT * FROM devices WHERE id = ?";
const SELECT_BY_EXTERNAL: &str = "SELECT * FROM devices WHERE protocol = ? AND external_id = ?";
const SELECT_ALL: &str = "SELECT * FROM devices";
const TOUCH_ONLINE: &str = "UPDATE devices SET online = 1, updated_at = ? WHERE id = ?";
const UPSERT_STATE: &str = "\
    INSERT INTO device_state (device_id, state, updated_at) VALUES (?, ?, ?) \
    ON CONFLICT(device_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at";
const SELECT_STATE: &str = "SELECT * FROM device_state WHERE device_id = ?";
const DELETE_STATE: &str = "DELETE FROM device_state WHERE device_id = ?";
const DELETE_DEVICE: &str = "DELETE FROM devices WHERE id = ?";

/// `SQLite`-backed [`Repository`].
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Race `fut` against `cancel`, mapping an early cancellation to
/// [`StorageError::Cancelled`].
async fn guarded<T>(
    cancel: CancellationToken,
    fut: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, StorageError> {
    tokio::select! {
        result = fut => Ok(result?),
        () = cancel.cancelled() => Err(StorageError::Cancelled),
    }
}

impl Repository for SqliteRepository {
    async fn upsert(&self, device: Device, cancel: CancellationToken) -> Result<Device, DeviceHubError> {
        guarded(
            cancel,
            sqlx::query(UPSERT)
                .bind(device.id.as_uuid())
                .bind(&device.protocol)
                .bind(&device.external_id)
                .bind(&device.name)
                .bind(&device.icon)
                .bind(&device.manufacturer)
                .bind(&device.model)
                .bind(encode_json(&device.capabilities))
                .bind(encode_json(&device.inputs))
                .bind(device.online)
                .bind(device.created_at)
                .bind(device.updated_at)
                .execute(&self.pool),
        )
        .await?;

        Ok(device)
    }

    async fn get_by_id(&self, id: DeviceId, cancel: CancellationToken) -> Result<Option<Device>, DeviceHubError> {
        let row: Option<DeviceRow> = guarded(
            cancel,
            sqlx::query_as(SELECT_BY_ID).bind(id.as_uuid()).fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(|r| r.0))
    }

    async fn get_by_external(
        &self,
        protocol: String,
        normalized_external: String,
        cancel: CancellationToken,
    ) -> Result<Option<Device>, DeviceHubError> {
        let row: Option<DeviceRow> = guarded(
            cancel,
            sqlx::query_as(SELECT_BY_EXTERNAL)
                .bind(protocol)
                .bind(normalized_external)
                .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(|r| r.0))
    }

    async fn list(&self, cancel: CancellationToken) -> Result<Vec<Device>, DeviceHubError> {
        let rows: Vec<DeviceRow> = guarded(cancel, sqlx::query_as(SELECT_ALL).fetch_all(&self.pool)).await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn touch_online(&self, id: DeviceId, cancel: CancellationToken) -> Result<(), DeviceHubError> {
        guarded(
            cancel,
            sqlx::query(TOUCH_ONLINE)
                .bind(devicehub_domain::time::now())
                .bind(id.as_uuid())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn save_device_state(&self, id: DeviceId, state: Json, cancel: CancellationToken) -> Result<(), DeviceHubError> {
        guarded(
            cancel,
            sqlx::query(UPSERT_STATE)
                .bind(id.as_uuid())
                .bind(encode_json(&state))
                .bind(devicehub_domain::time::now())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn get_device_state(&self, id: DeviceId, cancel: CancellationToken) -> Result<Option<DeviceState>, DeviceHubError> {
        let row: Option<DeviceStateRow> = guarded(
            cancel,
            sqlx::query_as(SELECT_STATE).bind(id.as_uuid()).fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(|r| r.0))
    }

    async fn delete_device_and_state(&self, id: DeviceId, cancel: CancellationToken) -> Result<(), DeviceHubError> {
        let mut tx = guarded(cancel.clone(), async { self.pool.begin().await }).await?;

        guarded(cancel.clone(), sqlx::query(DELETE_STATE).bind(id.as_uuid()).execute(&mut *tx)).await?;
        guarded(cancel.clone(), sqlx::query(DELETE_DEVICE).bind(id.as_uuid()).execute(&mut *tx)).await?;

        guarded(cancel, async { tx.commit().await }).await?;
        Ok(())
    }
}
