//! Pairing session state machine data model.
//!
//! The session record itself is pure data; the transition logic lives in
//! the Pairing Coordinator service (`devicehub-app`), which is the only
//! thing allowed to mutate a session in place. This module only encodes the
//! shape of a session and its status vocabulary.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::id::{DeviceId, PairingSessionId};
use crate::time::Timestamp;

/// A pairing session's status label. Transitions and their wire-level
/// spelling are documented alongside the coordinator; this enum is the
/// closed set of labels a session can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStatus {
    Starting,
    Active,
    DeviceJoined,
    Interviewing,
    InterviewComplete,
    DeviceDetected,
    Completed,
    Failed,
    Stopped,
    Timeout,
    Error,
}

impl PairingStatus {
    /// Terminal statuses end a session's lifecycle; no further transition
    /// follows one. Matches §4.6's terminal-state list.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Stopped | Self::Timeout | Self::Error
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Active => "active",
            Self::DeviceJoined => "device_joined",
            Self::Interviewing => "interviewing",
            Self::InterviewComplete => "interview_complete",
            Self::DeviceDetected => "device_detected",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

/// One protocol's in-flight (or most recently terminated) pairing session.
/// In-memory, process lifetime; at most one active session per protocol is
/// enforced by the coordinator, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingSession {
    pub id: PairingSessionId,
    pub protocol: String,
    pub status: PairingStatus,
    pub active: bool,
    pub started_at: Timestamp,
    pub expires_at: Timestamp,
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub metadata: Json,
    #[serde(skip)]
    pub known_devices: HashSet<DeviceId>,
    pub candidate_external_id: Option<String>,
    pub awaiting_interview: bool,
    /// Cancellation handle for this session's timeout timer. A
    /// back-reference to the coordinator would risk a reference cycle and
    /// couples this pure data type to the service that owns it; a
    /// cancellation handle is the narrowest thing a timer task needs (§9).
    /// Cloning a session clones a handle to the *same* underlying signal,
    /// so a snapshot returned to a caller still observes the real
    /// cancellation when the coordinator later cancels it.
    #[serde(skip)]
    pub cancel: tokio_util::sync::CancellationToken,
}

impl PairingSession {
    /// Start a brand-new session. `timeout_sec` is assumed already clamped
    /// by the caller (coordinator) to `[1, 300]`.
    #[must_use]
    pub fn start(
        protocol: impl Into<String>,
        started_at: Timestamp,
        timeout_sec: i64,
        known_devices: HashSet<DeviceId>,
        metadata: Json,
    ) -> Self {
        Self {
            id: PairingSessionId::new(),
            protocol: protocol.into(),
            status: PairingStatus::Starting,
            active: true,
            started_at,
            expires_at: started_at + chrono::Duration::seconds(timeout_sec),
            device_id: None,
            metadata,
            known_devices,
            candidate_external_id: None,
            awaiting_interview: false,
            cancel: tokio_util::sync::CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Clamp a caller-supplied timeout to `[1, 300]` seconds, defaulting
/// non-positive values to 60 (§4.6 Start).
#[must_use]
pub fn clamp_timeout_sec(requested: i64) -> i64 {
    if requested <= 0 {
        60
    } else {
        requested.clamp(1, 300)
    }
}
