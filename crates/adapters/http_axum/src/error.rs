//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use devicehub_domain::error::DeviceHubError;

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`DeviceHubError`] to an HTTP response with an appropriate status
/// code, per §7's error taxonomy.
pub struct ApiError(DeviceHubError);

impl From<DeviceHubError> for ApiError {
    fn from(err: DeviceHubError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            DeviceHubError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            DeviceHubError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            DeviceHubError::Conflict(err) => (StatusCode::CONFLICT, err.to_string()),
            DeviceHubError::Unsupported(err) => (StatusCode::NOT_IMPLEMENTED, err.to_string()),
            DeviceHubError::Upstream(err) => {
                tracing::error!(error = %err, "upstream error");
                (StatusCode::BAD_GATEWAY, "upstream unavailable".to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
