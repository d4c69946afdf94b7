//! JSON REST API handler modules (§4.7). Every route is mounted under
//! `/api/hdp`.

#[allow(clippy::missing_errors_doc)]
pub mod devices;
#[allow(clippy::missing_errors_doc)]
pub mod pairing;

use axum::Router;
use axum::routing::{get, post};

use devicehub_app::ports::{MqttClient, Repository};

use crate::state::AppState;

/// Build the `/api/hdp` sub-router.
pub fn routes<R, M>() -> Router<AppState<R, M>>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    Router::new()
        .route("/devices", get(devices::list::<R, M>).post(devices::create::<R, M>))
        .route(
            "/devices/{*id}",
            get(devices::get::<R, M>)
                .patch(devices::patch_dispatch::<R, M>)
                .delete(devices::delete::<R, M>)
                .post(devices::post_dispatch::<R, M>),
        )
        .route("/integrations", get(pairing::integrations::<R, M>))
        .route("/pairing-config", get(pairing::pairing_config::<R, M>))
        .route(
            "/pairings",
            get(pairing::list::<R, M>)
                .post(pairing::start::<R, M>)
                .delete(pairing::stop::<R, M>),
        )
}
