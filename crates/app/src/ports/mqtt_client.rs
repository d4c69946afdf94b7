//! MQTT Client wrapper port (§4.3).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use devicehub_domain::error::DeviceHubError;

/// A single inbound MQTT delivery, already stripped of broker/QoS detail.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retained: bool,
}

/// A subscription callback. Boxed rather than expressed as an `impl Future`
/// return because handlers are stored in a registry and invoked by topic at
/// delivery time — an associated-type-free object is required there.
pub type MessageHandler =
    Arc<dyn Fn(IncomingMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Publish/subscribe boundary against the HDP topic space.
///
/// Implementations must preserve arrival order *within* a topic and must
/// never assume ordering *across* topics. A publish issued from inside a
/// delivery handler must not deadlock: the implementation runs publishes on
/// a task independent of the delivery path. On reconnect, implementations
/// re-establish every subscription registered through `subscribe` before
/// resuming delivery.
pub trait MqttClient: Send + Sync {
    /// Publish non-retained, at-least-once.
    fn publish(
        &self,
        topic: String,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), DeviceHubError>> + Send {
        self.publish_with(topic, payload, false)
    }

    /// Publish with an explicit retain flag, at-least-once.
    fn publish_with(
        &self,
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<(), DeviceHubError>> + Send;

    /// Subscribe to a topic filter (`+`/`#` wildcards supported), invoking
    /// `handler` for every matching delivery.
    fn subscribe(
        &self,
        filter: String,
        handler: MessageHandler,
    ) -> impl Future<Output = Result<(), DeviceHubError>> + Send;
}
