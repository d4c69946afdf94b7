//! # devicehub-adapter-mqtt
//!
//! `MqttClient` port implementation backed by `rumqttc`.
//!
//! ## Ordering and concurrency (§4.3)
//!
//! Delivery for a single topic is strictly FIFO; delivery across distinct
//! topics is concurrent and carries no ordering guarantee. This is achieved
//! by handing every inbound publish to a per-topic worker task over an
//! unbounded channel: the eventloop-polling task only enqueues and returns
//! immediately, so a handler that itself calls `publish` can never block —
//! let alone deadlock — the poll loop.
//!
//! ## Reconnection
//!
//! On every `ConnAck` (including the first), every filter registered
//! through [`MqttClient::subscribe`] so far is re-subscribed before
//! resuming delivery, so a dropped connection never silently drops
//! subscriptions.
//!
//! ## Dependency rule
//!
//! Depends on `devicehub-app` (for the `MqttClient`/`IncomingMessage` port)
//! and `devicehub-domain` (for `DeviceHubError`). Never imports another
//! adapter crate.

mod config;
mod error;

pub use config::MqttConfig;
pub use error::MqttError;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use devicehub_app::ports::mqtt_client::{IncomingMessage, MessageHandler};
use devicehub_app::ports::MqttClient;
use devicehub_domain::error::DeviceHubError;

type TopicWorkItem = (IncomingMessage, Vec<MessageHandler>);

/// `MqttClient` implementation over a live broker connection. Construct via
/// [`MqttAdapter::connect`], which also spawns the eventloop driver task.
pub struct MqttAdapter {
    client: AsyncClient,
    subscriptions: Mutex<Vec<(String, MessageHandler)>>,
    workers: Mutex<HashMap<String, mpsc::UnboundedSender<TopicWorkItem>>>,
}

impl MqttAdapter {
    /// Connect to the broker described by `config` and spawn the eventloop
    /// driver. Returns the adapter (wrap subscriptions/publishes through it)
    /// and the driver's join handle, for the composition root to hold.
    #[must_use]
    pub fn connect(config: &MqttConfig) -> (Arc<Self>, JoinHandle<()>) {
        let mut opts = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        opts.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs)));
        let (client, eventloop) = AsyncClient::new(opts, 256);

        let adapter = Arc::new(Self {
            client,
            subscriptions: Mutex::new(Vec::new()),
            workers: Mutex::new(HashMap::new()),
        });

        let driver = Arc::clone(&adapter);
        let handle = tokio::spawn(async move { driver.drive(eventloop).await });

        (adapter, handle)
    }

    async fn drive(self: Arc<Self>, mut eventloop: EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.resubscribe_all().await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.dispatch(publish);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "MQTT eventloop error, backing off before reconnect");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    async fn resubscribe_all(&self) {
        let filters: Vec<String> = {
            let subscriptions = self.subscriptions.lock().expect("mqtt subscriptions mutex poisoned");
            subscriptions.iter().map(|(filter, _)| filter.clone()).collect()
        };
        for filter in filters {
            if let Err(err) = self.client.subscribe(&filter, QoS::AtLeastOnce).await {
                tracing::warn!(%filter, error = %err, "failed to re-subscribe after reconnect");
            }
        }
    }

    fn dispatch(self: &Arc<Self>, publish: Publish) {
        let matching: Vec<MessageHandler> = {
            let subscriptions = self.subscriptions.lock().expect("mqtt subscriptions mutex poisoned");
            subscriptions
                .iter()
                .filter(|(filter, _)| topic_matches(filter, &publish.topic))
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };
        if matching.is_empty() {
            return;
        }

        let message = IncomingMessage {
            topic: publish.topic.clone(),
            payload: publish.payload.to_vec(),
            retained: publish.retain,
        };

        let sender = self.topic_worker(publish.topic.clone());
        if sender.send((message, matching)).is_err() {
            tracing::warn!(topic = %publish.topic, "mqtt delivery worker gone, dropping message");
        }
    }

    /// Get or lazily create the single-consumer worker task that serializes
    /// delivery for one exact topic string.
    fn topic_worker(self: &Arc<Self>, topic: String) -> mpsc::UnboundedSender<TopicWorkItem> {
        let mut workers = self.workers.lock().expect("mqtt workers mutex poisoned");
        if let Some(sender) = workers.get(&topic) {
            return sender.clone();
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<TopicWorkItem>();
        tokio::spawn(async move {
            while let Some((message, handlers)) = rx.recv().await {
                for handler in handlers {
                    handler(message.clone()).await;
                }
            }
        });
        workers.insert(topic, tx.clone());
        tx
    }
}

impl MqttClient for MqttAdapter {
    async fn publish_with(&self, topic: String, payload: Vec<u8>, retain: bool) -> Result<(), DeviceHubError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|err| MqttError::Client(err).into())
    }

    async fn subscribe(&self, filter: String, handler: MessageHandler) -> Result<(), DeviceHubError> {
        self.client
            .subscribe(&filter, QoS::AtLeastOnce)
            .await
            .map_err(MqttError::Client)?;
        self.subscriptions
            .lock()
            .expect("mqtt subscriptions mutex poisoned")
            .push((filter, handler));
        Ok(())
    }
}

/// MQTT wildcard match: `+` matches exactly one level, `#` (only legal as
/// the last filter segment) matches the remainder of the topic.
fn topic_matches(filter: &str, topic: &str) -> bool {
    let filter_parts: Vec<&str> = filter.split('/').collect();
    let topic_parts: Vec<&str> = topic.split('/').collect();

    let mut fi = 0;
    let mut ti = 0;
    while fi < filter_parts.len() {
        match filter_parts[fi] {
            "#" => return true,
            "+" => {
                if ti >= topic_parts.len() {
                    return false;
                }
            }
            literal => {
                if ti >= topic_parts.len() || topic_parts[ti] != literal {
                    return false;
                }
            }
        }
        fi += 1;
        ti += 1;
    }
    ti == topic_parts.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_match_exact_topic() {
        assert!(topic_matches("homenavi/hdp/adapter/hello", "homenavi/hdp/adapter/hello"));
        assert!(!topic_matches("homenavi/hdp/adapter/hello", "homenavi/hdp/adapter/goodbye"));
    }

    #[test]
    fn should_match_single_level_plus_wildcard() {
        assert!(topic_matches("homenavi/hdp/adapter/status/+", "homenavi/hdp/adapter/status/zigbee-1"));
        assert!(!topic_matches(
            "homenavi/hdp/adapter/status/+",
            "homenavi/hdp/adapter/status/zigbee-1/extra"
        ));
    }

    #[test]
    fn should_match_multi_level_hash_wildcard() {
        assert!(topic_matches("homenavi/hdp/device/metadata/#", "homenavi/hdp/device/metadata/lan/bulb-01"));
        assert!(topic_matches("homenavi/hdp/device/metadata/#", "homenavi/hdp/device/metadata/lan"));
        assert!(!topic_matches("homenavi/hdp/device/metadata/#", "homenavi/hdp/device/state/lan"));
    }

    #[test]
    fn should_not_match_shorter_topic_against_literal_filter() {
        assert!(!topic_matches("homenavi/hdp/adapter/hello", "homenavi/hdp/adapter"));
    }

    #[tokio::test]
    async fn should_build_mqtt_options_from_config() {
        let config = MqttConfig {
            broker_host: "example.com".to_string(),
            broker_port: 8883,
            client_id: "test-client".to_string(),
            ..MqttConfig::default()
        };
        let (adapter, handle) = MqttAdapter::connect(&config);
        handle.abort();
        assert!(adapter.subscriptions.lock().unwrap().is_empty());
    }
}
