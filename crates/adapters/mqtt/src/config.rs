//! MQTT adapter configuration.

use serde::Deserialize;

/// Broker connection settings. The HDP topic space itself (`homenavi/hdp/…`)
/// is fixed by the protocol, not configurable here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "devicehub".to_string(),
            keep_alive_secs: 30,
        }
    }
}
