//! Repository port — persistence for devices and device state (§4.2).

use std::future::Future;

use devicehub_domain::device::Device;
use devicehub_domain::device_state::DeviceState;
use devicehub_domain::error::DeviceHubError;
use devicehub_domain::id::DeviceId;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

/// Persistence boundary for devices and their state. Every operation takes
/// a [`CancellationToken`] so callers (HTTP handlers, ingest handlers,
/// pairing timers) can abandon an in-flight repository call on shutdown or
/// client disconnect without leaving the caller's task stuck.
///
/// `get_by_id`/`get_by_external` return `Ok(None)` for an absent device,
/// never an error. `upsert` generates an opaque id when the device carries
/// none yet. `delete_device_and_state` is atomic: the device row and its
/// state row disappear together or not at all.
pub trait Repository: Send + Sync {
    fn upsert(
        &self,
        device: Device,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Device, DeviceHubError>> + Send;

    fn get_by_id(
        &self,
        id: DeviceId,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Option<Device>, DeviceHubError>> + Send;

    fn get_by_external(
        &self,
        protocol: String,
        normalized_external: String,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Option<Device>, DeviceHubError>> + Send;

    fn list(
        &self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Vec<Device>, DeviceHubError>> + Send;

    fn touch_online(
        &self,
        id: DeviceId,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), DeviceHubError>> + Send;

    fn save_device_state(
        &self,
        id: DeviceId,
        state: Json,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), DeviceHubError>> + Send;

    fn get_device_state(
        &self,
        id: DeviceId,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Option<DeviceState>, DeviceHubError>> + Send;

    fn delete_device_and_state(
        &self,
        id: DeviceId,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), DeviceHubError>> + Send;
}
