//! Adapter Registry data model — everything the registry knows about a
//! protocol adapter, derived entirely from retained hello/status frames
//! (never hard-coded per protocol).

use serde::{Deserialize, Serialize};

use crate::time::{self, Timestamp};

/// Liveness status of an adapter, as last reported on its retained status
/// topic. Ranked `Online > Degraded > Unknown > Offline` for catalog
/// aggregation (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    Online,
    Degraded,
    Offline,
    Unknown,
}

impl AdapterStatus {
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Self::Online,
            "degraded" => Self::Degraded,
            "offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }

    /// Higher is better; used to pick the best status across several
    /// adapters advertising the same protocol.
    fn rank(self) -> u8 {
        match self {
            Self::Online => 3,
            Self::Degraded => 2,
            Self::Unknown => 1,
            Self::Offline => 0,
        }
    }

    /// Pick the better of two statuses by the `online > degraded > unknown
    /// > offline` ranking.
    #[must_use]
    pub fn best(self, other: Self) -> Self {
        if self.rank() >= other.rank() { self } else { other }
    }
}

/// Optional pairing UI hints an adapter may advertise alongside
/// `pairing.supported = true`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairingUi {
    #[serde(default)]
    pub label: String,
    pub default_timeout_sec: Option<u32>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub cta_label: String,
    #[serde(default)]
    pub notes: String,
}

/// Everything known about one adapter process, keyed by `adapter_id`.
/// In-memory, process lifetime only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub adapter_id: String,
    pub protocol: String,
    pub version: String,
    pub supports_pairing: bool,
    pub supports_interview: bool,
    pub pairing: Option<PairingUi>,
    pub status: AdapterStatus,
    pub updated_at: Timestamp,
}

/// A partial update derived from a hello or status frame. Every field is
/// optional; a missing field leaves the previous value untouched, and an
/// empty string never overwrites a non-empty one (§4.4).
#[derive(Debug, Clone, Default)]
pub struct AdapterInfoUpdate {
    pub protocol: Option<String>,
    pub version: Option<String>,
    pub supports_pairing: Option<bool>,
    pub supports_interview: Option<bool>,
    pub pairing: Option<PairingUi>,
    pub status: Option<AdapterStatus>,
}

impl AdapterInfo {
    #[must_use]
    pub fn new(adapter_id: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            protocol: String::new(),
            version: String::new(),
            supports_pairing: false,
            supports_interview: false,
            pairing: None,
            status: AdapterStatus::Unknown,
            updated_at: time::now(),
        }
    }

    /// Apply an update, honoring the "missing leaves previous, empty string
    /// doesn't overwrite" merge rule.
    pub fn merge(&mut self, update: AdapterInfoUpdate) {
        if let Some(protocol) = update.protocol
            && !protocol.trim().is_empty()
        {
            self.protocol = protocol.trim().to_ascii_lowercase();
        }
        if let Some(version) = update.version
            && !version.trim().is_empty()
        {
            self.version = version;
        }
        if let Some(flag) = update.supports_pairing {
            self.supports_pairing = flag;
        }
        if let Some(flag) = update.supports_interview {
            self.supports_interview = flag;
        }
        if let Some(pairing) = update.pairing {
            self.pairing = Some(pairing);
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        self.updated_at = time::now();
    }
}

/// One entry of the derived Integrations catalog: one per distinct
/// protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationSummary {
    pub protocol: String,
    pub label: String,
    pub status: AdapterStatus,
    pub notes: String,
}

/// One entry of the derived Pairing-config catalog: one per protocol with
/// at least one adapter advertising `pairing.supported = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfigSummary {
    pub protocol: String,
    pub label: String,
    pub default_timeout_sec: Option<u32>,
    pub instructions: Vec<String>,
    pub cta_label: String,
    pub notes: String,
    pub supports_interview: bool,
}

/// Title-case a protocol name for use as a fallback integration label, e.g.
/// `"zigbee"` -> `"Zigbee"`.
#[must_use]
pub fn title_case(protocol: &str) -> String {
    let mut chars = protocol.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
