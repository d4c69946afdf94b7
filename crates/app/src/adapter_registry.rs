//! Adapter Registry (§4.4) — a live, in-memory catalog of protocol adapters,
//! built entirely from retained hello/status frames. All mutations funnel
//! through one mutex; readers get consistent snapshots cloned under the
//! lock. Every method here is synchronous compute over in-memory state —
//! there is no IO and therefore nothing to `.await` while the lock is held,
//! by construction.

use std::collections::HashMap;
use std::sync::Mutex;

use devicehub_domain::adapter::{
    AdapterInfo, AdapterInfoUpdate, AdapterStatus, IntegrationSummary, PairingConfigSummary,
    PairingUi, title_case,
};
use devicehub_domain::envelope::{AdapterHelloFrame, AdapterPairingFrame, AdapterStatusFrame};

/// The Adapter Registry. Cheap to construct, intended to be wrapped in an
/// `Arc` and shared between the ingest subscription handlers and the REST
/// Surface's `/integrations` and `/pairing-config` handlers.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Mutex<HashMap<String, AdapterInfo>>,
}

fn pairing_frame_to_ui(frame: &AdapterPairingFrame) -> PairingUi {
    PairingUi {
        label: frame.label.clone().unwrap_or_default(),
        default_timeout_sec: frame.default_timeout_sec,
        instructions: frame.instructions.clone().unwrap_or_default(),
        cta_label: frame.cta_label.clone().unwrap_or_default(),
        notes: frame.notes.clone().unwrap_or_default(),
    }
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a non-retained `adapter/hello` frame.
    #[tracing::instrument(skip(self, frame), fields(adapter_id = %frame.adapter_id))]
    pub fn ingest_hello(&self, frame: AdapterHelloFrame) {
        let update = AdapterInfoUpdate {
            protocol: Some(frame.protocol),
            version: Some(frame.version),
            supports_pairing: frame.supports_pairing,
            supports_interview: frame.supports_interview,
            pairing: frame.pairing.as_ref().map(pairing_frame_to_ui),
            status: frame.status.as_deref().map(AdapterStatus::from_str_lossy),
        };
        let mut adapters = self.adapters.lock().expect("adapter registry mutex poisoned");
        adapters
            .entry(frame.adapter_id.clone())
            .or_insert_with(|| AdapterInfo::new(frame.adapter_id))
            .merge(update);
    }

    /// Ingest a retained `adapter/status/<adapter_id>` frame; `adapter_id`
    /// is the topic's last path segment, inferred by the caller.
    #[tracing::instrument(skip(self, frame), fields(%adapter_id))]
    pub fn ingest_status(&self, adapter_id: String, frame: AdapterStatusFrame) {
        let update = AdapterInfoUpdate {
            protocol: frame.protocol,
            version: frame.version,
            supports_pairing: frame.supports_pairing,
            supports_interview: frame.supports_interview,
            pairing: frame.pairing.as_ref().map(pairing_frame_to_ui),
            status: frame.status.as_deref().map(AdapterStatus::from_str_lossy),
        };
        let mut adapters = self.adapters.lock().expect("adapter registry mutex poisoned");
        adapters
            .entry(adapter_id.clone())
            .or_insert_with(|| AdapterInfo::new(adapter_id))
            .merge(update);
    }

    /// Snapshot of every known adapter, cloned under the lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AdapterInfo> {
        self.adapters
            .lock()
            .expect("adapter registry mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Derived Integrations catalog: one entry per distinct protocol.
    #[must_use]
    pub fn integrations(&self) -> Vec<IntegrationSummary> {
        let mut by_protocol: HashMap<String, IntegrationSummary> = HashMap::new();
        for adapter in self.snapshot() {
            if adapter.protocol.is_empty() {
                continue;
            }
            by_protocol
                .entry(adapter.protocol.clone())
                .and_modify(|summary| {
                    summary.status = summary.status.best(adapter.status);
                    if summary.label == title_case(&adapter.protocol)
                        && let Some(pairing) = &adapter.pairing
                        && !pairing.label.is_empty()
                    {
                        summary.label = pairing.label.clone();
                    }
                })
                .or_insert_with(|| IntegrationSummary {
                    protocol: adapter.protocol.clone(),
                    label: adapter
                        .pairing
                        .as_ref()
                        .map(|p| p.label.clone())
                        .filter(|label| !label.is_empty())
                        .unwrap_or_else(|| title_case(&adapter.protocol)),
                    status: adapter.status,
                    notes: adapter
                        .pairing
                        .as_ref()
                        .map(|p| p.notes.clone())
                        .unwrap_or_default(),
                });
        }
        let mut result: Vec<_> = by_protocol.into_values().collect();
        result.sort_by(|a, b| a.protocol.cmp(&b.protocol));
        result
    }

    /// Derived Pairing-config catalog: one entry per protocol with at least
    /// one adapter advertising `supports_pairing = true`; most-recently
    /// updated adapter wins on conflict.
    #[must_use]
    pub fn pairing_configs(&self) -> Vec<PairingConfigSummary> {
        let mut winners: HashMap<String, AdapterInfo> = HashMap::new();
        for adapter in self.snapshot() {
            if !adapter.supports_pairing || adapter.protocol.is_empty() {
                continue;
            }
            winners
                .entry(adapter.protocol.clone())
                .and_modify(|current| {
                    if adapter.updated_at > current.updated_at {
                        *current = adapter.clone();
                    }
                })
                .or_insert(adapter);
        }
        let mut result: Vec<_> = winners
            .into_values()
            .map(|adapter| {
                let pairing = adapter.pairing.unwrap_or_default();
                PairingConfigSummary {
                    label: if pairing.label.is_empty() {
                        title_case(&adapter.protocol)
                    } else {
                        pairing.label
                    },
                    protocol: adapter.protocol,
                    default_timeout_sec: pairing.default_timeout_sec,
                    instructions: pairing.instructions,
                    cta_label: pairing.cta_label,
                    notes: pairing.notes,
                    supports_interview: adapter.supports_interview,
                }
            })
            .collect();
        result.sort_by(|a, b| a.protocol.cmp(&b.protocol));
        result
    }

    /// `true` iff some adapter currently advertises `supports_pairing =
    /// true` for `protocol`. Never hard-coded per protocol.
    #[must_use]
    pub fn is_pairing_supported(&self, protocol: &str) -> bool {
        self.pairing_configs()
            .iter()
            .any(|entry| entry.protocol == protocol)
    }

    /// `true` iff the winning pairing-config entry for `protocol` advertises
    /// interview support.
    #[must_use]
    pub fn supports_interview(&self, protocol: &str) -> bool {
        self.pairing_configs()
            .iter()
            .any(|entry| entry.protocol == protocol && entry.supports_interview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(adapter_id: &str, protocol: &str, pairing: bool, interview: bool) -> AdapterHelloFrame {
        AdapterHelloFrame {
            adapter_id: adapter_id.to_string(),
            protocol: protocol.to_string(),
            version: "1.0.0".to_string(),
            supports_pairing: Some(pairing),
            supports_interview: Some(interview),
            pairing: pairing.then(|| AdapterPairingFrame {
                supported: Some(true),
                label: Some("Zigbee".to_string()),
                default_timeout_sec: Some(120),
                instructions: Some(vec!["press button".to_string()]),
                cta_label: Some("Start".to_string()),
                notes: Some("".to_string()),
            }),
            status: Some("online".to_string()),
        }
    }

    #[test]
    fn should_create_adapter_on_first_hello() {
        let registry = AdapterRegistry::new();
        registry.ingest_hello(hello("adapter-1", "zigbee", true, true));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].protocol, "zigbee");
        assert_eq!(snapshot[0].status, AdapterStatus::Online);
    }

    #[test]
    fn should_report_pairing_supported_only_via_catalog() {
        let registry = AdapterRegistry::new();
        assert!(!registry.is_pairing_supported("zigbee"));
        registry.ingest_hello(hello("adapter-1", "zigbee", true, true));
        assert!(registry.is_pairing_supported("zigbee"));
        assert!(registry.supports_interview("zigbee"));
        assert!(!registry.is_pairing_supported("lan"));
    }

    #[test]
    fn should_merge_status_frame_without_clobbering_protocol() {
        let registry = AdapterRegistry::new();
        registry.ingest_hello(hello("adapter-1", "zigbee", true, true));
        registry.ingest_status(
            "adapter-1".to_string(),
            AdapterStatusFrame {
                status: Some("degraded".to_string()),
                ..Default::default()
            },
        );
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].protocol, "zigbee");
        assert_eq!(snapshot[0].status, AdapterStatus::Degraded);
    }

    #[test]
    fn should_pick_best_status_across_adapters_of_same_protocol() {
        let registry = AdapterRegistry::new();
        registry.ingest_hello(hello("adapter-1", "zigbee", false, false));
        registry.ingest_status(
            "adapter-1".to_string(),
            AdapterStatusFrame {
                status: Some("offline".to_string()),
                ..Default::default()
            },
        );
        registry.ingest_hello(hello("adapter-2", "zigbee", false, false));
        registry.ingest_status(
            "adapter-2".to_string(),
            AdapterStatusFrame {
                status: Some("online".to_string()),
                ..Default::default()
            },
        );
        let integrations = registry.integrations();
        let zigbee = integrations.iter().find(|i| i.protocol == "zigbee").unwrap();
        assert_eq!(zigbee.status, AdapterStatus::Online);
    }

    #[test]
    fn should_fall_back_to_title_cased_protocol_when_no_pairing_label() {
        let registry = AdapterRegistry::new();
        registry.ingest_hello(hello("adapter-1", "lan", false, false));
        let integrations = registry.integrations();
        assert_eq!(integrations[0].label, "Lan");
    }
}
