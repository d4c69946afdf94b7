//! Common error types used across the workspace.
//!
//! Each layer defines its own concrete error types. The domain layer provides
//! the taxonomy below; adapter layers define their own (e.g. `StorageError`
//! wrapping `sqlx::Error`, `MqttError` wrapping `rumqttc::ClientError`) and
//! wire them into [`DeviceHubError`] via `#[from]`/`#[source]` conversion.
//!
//! Ingest-path failures (malformed JSON, unresolvable device references) are
//! deliberately *not* represented here: they are logged at the point of
//! occurrence and dropped, never surfaced as a [`DeviceHubError`].

/// Validation failures raised by domain invariant checks or REST input
/// parsing. Maps to HTTP 400.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("protocol and external_id are required")]
    ProtocolExternalRequired,
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
    #[error("id is not a canonical device id or a known surrogate id")]
    NotCanonical,
    #[error("no updatable field present")]
    NoUpdatableField,
    #[error("state must contain at least one non-empty field")]
    EmptyState,
    #[error("timeout_sec must be a positive integer")]
    InvalidTimeout,
    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

/// Returned when a lookup by identifier finds nothing. Maps to HTTP 404.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Returned when a uniqueness constraint would be violated. Maps to HTTP 409.
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error("device {protocol}/{external_id} already exists")]
    DeviceAlreadyExists {
        protocol: String,
        external_id: String,
    },
    #[error("a pairing session is already active for protocol {0}")]
    PairingAlreadyActive(String),
}

/// Returned when a protocol does not support the requested operation.
/// Maps to HTTP 501.
#[derive(Debug, thiserror::Error)]
pub enum UnsupportedError {
    #[error("protocol {0} does not support pairing")]
    PairingUnsupported(String),
}

/// Top-level domain error. Adapter crates introduce additional variants by
/// wrapping their own error types via `#[from]`/`#[source]`.
#[derive(Debug, thiserror::Error)]
pub enum DeviceHubError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("conflict")]
    Conflict(#[from] ConflictError),

    #[error("unsupported")]
    Unsupported(#[from] UnsupportedError),

    #[error("upstream unavailable")]
    Upstream(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience alias used throughout the domain and application layers.
pub type Result<T> = std::result::Result<T, DeviceHubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_validation_error_message() {
        let err = ValidationError::ProtocolExternalRequired;
        assert_eq!(err.to_string(), "protocol and external_id are required");
    }

    #[test]
    fn should_display_not_found_error_with_entity_and_id() {
        let err = NotFoundError {
            entity: "Device",
            id: "abc-123".to_string(),
        };
        assert_eq!(err.to_string(), "Device abc-123 not found");
    }

    #[test]
    fn should_convert_validation_error_into_devicehub_error() {
        let err: DeviceHubError = ValidationError::EmptyState.into();
        assert!(matches!(err, DeviceHubError::Validation(_)));
    }

    #[test]
    fn should_convert_not_found_error_into_devicehub_error() {
        let err: DeviceHubError = NotFoundError {
            entity: "Device",
            id: "xyz".to_string(),
        }
        .into();
        assert!(matches!(err, DeviceHubError::NotFound(_)));
    }

    #[test]
    fn should_convert_conflict_error_into_devicehub_error() {
        let err: DeviceHubError =
            ConflictError::PairingAlreadyActive("zigbee".to_string()).into();
        assert!(matches!(err, DeviceHubError::Conflict(_)));
    }

    #[test]
    fn should_convert_unsupported_error_into_devicehub_error() {
        let err: DeviceHubError =
            UnsupportedError::PairingUnsupported("zigbee".to_string()).into();
        assert!(matches!(err, DeviceHubError::Unsupported(_)));
    }
}
