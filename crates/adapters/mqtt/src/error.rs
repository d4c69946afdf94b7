//! MQTT adapter error types.

use devicehub_domain::error::DeviceHubError;

/// Errors specific to the MQTT adapter. Every variant maps to
/// [`DeviceHubError::Upstream`] — a broker-side failure is never a
/// validation or not-found condition from the core's point of view.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client returned an error (publish/subscribe rejected,
    /// connection lost, etc.).
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),
}

impl From<MqttError> for DeviceHubError {
    fn from(err: MqttError) -> Self {
        Self::Upstream(Box::new(err))
    }
}
