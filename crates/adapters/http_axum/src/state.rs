//! Shared application state for axum handlers.

use std::sync::Arc;

use devicehub_app::adapter_registry::AdapterRegistry;
use devicehub_app::pairing_coordinator::PairingCoordinator;
use devicehub_app::ports::{MqttClient, Repository};

/// Application state shared across all axum handlers.
///
/// Generic over the repository and MQTT client implementations to avoid
/// dynamic dispatch. `Clone` is implemented manually so the underlying
/// types themselves do not need to be `Clone` — only the `Arc` wrappers are
/// cloned.
pub struct AppState<R, M> {
    pub repo: Arc<R>,
    pub mqtt: Arc<M>,
    pub registry: Arc<AdapterRegistry>,
    pub pairing: Arc<PairingCoordinator<R, M>>,
}

impl<R, M> Clone for AppState<R, M> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            mqtt: Arc::clone(&self.mqtt),
            registry: Arc::clone(&self.registry),
            pairing: Arc::clone(&self.pairing),
        }
    }
}

impl<R, M> AppState<R, M>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    /// Create a new application state from pre-wrapped `Arc` collaborators.
    /// Use this constructor — the repository, MQTT client, and adapter
    /// registry are already shared with the ingest and pairing background
    /// tasks before the HTTP state is built.
    #[must_use]
    pub fn new(
        repo: Arc<R>,
        mqtt: Arc<M>,
        registry: Arc<AdapterRegistry>,
        pairing: Arc<PairingCoordinator<R, M>>,
    ) -> Self {
        Self {
            repo,
            mqtt,
            registry,
            pairing,
        }
    }
}
