//! Pairing Coordinator (§4.6) — the permit-join state machine.
//!
//! One coordinator owns `Map<protocol, PairingSession>` under a single
//! mutex. Session mutations are computed synchronously under that lock;
//! publishes and repository calls always happen afterwards, against a
//! cloned snapshot, never while the lock is held.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use devicehub_domain::device::{Device, DeviceMetadataUpdate};
use devicehub_domain::envelope::{
    ORIGIN_DEVICE_HUB, PairingCommandEnvelope, PairingProgressEnvelope, PairingProgressFrame,
};
use devicehub_domain::error::{ConflictError, DeviceHubError, NotFoundError, UnsupportedError};
use devicehub_domain::id::{DeviceId, PairingSessionId};
use devicehub_domain::identity;
use devicehub_domain::pairing::{PairingSession, PairingStatus, clamp_timeout_sec};
use devicehub_domain::time;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

use crate::adapter_registry::AdapterRegistry;
use crate::ports::{MqttClient, Repository};

fn command_topic(protocol: &str) -> String {
    format!("homenavi/hdp/pairing/command/{protocol}")
}

fn progress_topic(protocol: &str) -> String {
    format!("homenavi/hdp/pairing/progress/{protocol}")
}

fn parse_terminal_label(s: &str) -> Option<PairingStatus> {
    match s {
        "timeout" => Some(PairingStatus::Timeout),
        "stopped" => Some(PairingStatus::Stopped),
        "failed" => Some(PairingStatus::Failed),
        "error" => Some(PairingStatus::Error),
        "completed" => Some(PairingStatus::Completed),
        _ => None,
    }
}

/// The coordinator. Construct behind an `Arc` — timers spawned by `start`
/// hold a clone of that `Arc` so they can act on a fired deadline.
pub struct PairingCoordinator<R, M> {
    sessions: Mutex<HashMap<String, PairingSession>>,
    repo: Arc<R>,
    mqtt: Arc<M>,
    registry: Arc<AdapterRegistry>,
}

impl<R, M> PairingCoordinator<R, M>
where
    R: Repository + Send + Sync + 'static,
    M: MqttClient + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(repo: Arc<R>, mqtt: Arc<M>, registry: Arc<AdapterRegistry>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            repo,
            mqtt,
            registry,
        })
    }

    /// Snapshot of a single protocol's session, if any has ever started.
    #[must_use]
    pub fn snapshot(&self, protocol: &str) -> Option<PairingSession> {
        self.sessions
            .lock()
            .expect("pairing sessions mutex poisoned")
            .get(protocol)
            .cloned()
    }

    /// Snapshot of every protocol with a session record.
    #[must_use]
    pub fn list(&self) -> Vec<PairingSession> {
        self.sessions
            .lock()
            .expect("pairing sessions mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    async fn publish_progress(&self, protocol: &str, status: PairingStatus, device_id: Option<DeviceId>) {
        let envelope = PairingProgressEnvelope::new(protocol, status.as_str(), device_id.map(|id| id.to_string()));
        let payload = serde_json::to_vec(&envelope).unwrap_or_default();
        if let Err(err) = self.mqtt.publish(progress_topic(protocol), payload).await {
            tracing::warn!(%protocol, error = %err, "failed to publish pairing_progress event");
        }
    }

    async fn publish_stop_command(&self, protocol: &str) {
        let payload = serde_json::to_vec(&PairingCommandEnvelope::stop()).unwrap_or_default();
        if let Err(err) = self.mqtt.publish(command_topic(protocol), payload).await {
            tracing::warn!(%protocol, error = %err, "failed to publish pairing stop command");
        }
    }

    /// Start a new pairing session for `protocol_raw`.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if the protocol does not normalize to
    /// non-empty or no adapter advertises pairing support for it, and
    /// `Conflict` if a session is already active for the protocol.
    #[tracing::instrument(skip(self, metadata, known_devices), fields(protocol = %protocol_raw))]
    pub async fn start(
        self: &Arc<Self>,
        protocol_raw: &str,
        timeout_sec: i64,
        metadata: Json,
        known_devices: Vec<DeviceId>,
    ) -> Result<PairingSession, DeviceHubError> {
        let protocol = protocol_raw.trim().to_ascii_lowercase();
        if protocol.is_empty() || !self.registry.is_pairing_supported(&protocol) {
            return Err(UnsupportedError::PairingUnsupported(protocol_raw.to_string()).into());
        }

        {
            let sessions = self.sessions.lock().expect("pairing sessions mutex poisoned");
            if sessions.get(&protocol).is_some_and(|session| session.active) {
                return Err(ConflictError::PairingAlreadyActive(protocol).into());
            }
        }

        let timeout = clamp_timeout_sec(timeout_sec);
        let known: HashSet<DeviceId> = known_devices.into_iter().collect();
        let session = PairingSession::start(protocol.clone(), time::now(), timeout, known, metadata);
        let session_id = session.id;
        let cancel = session.cancel.clone();
        let expires_at = session.expires_at;

        {
            let mut sessions = self.sessions.lock().expect("pairing sessions mutex poisoned");
            sessions.insert(protocol.clone(), session);
        }

        let start_payload = serde_json::to_vec(&PairingCommandEnvelope::start(timeout)).unwrap_or_default();
        if let Err(err) = self.mqtt.publish(command_topic(&protocol), start_payload).await {
            let mut sessions = self.sessions.lock().expect("pairing sessions mutex poisoned");
            sessions.remove(&protocol);
            return Err(err);
        }

        let active_snapshot = {
            let mut sessions = self.sessions.lock().expect("pairing sessions mutex poisoned");
            let session = sessions
                .get_mut(&protocol)
                .expect("session installed just above");
            session.status = PairingStatus::Active;
            session.clone()
        };

        self.publish_progress(&protocol, PairingStatus::Active, None).await;
        self.arm_timer(protocol, session_id, cancel, expires_at);

        Ok(active_snapshot)
    }

    fn arm_timer(
        self: &Arc<Self>,
        protocol: String,
        session_id: PairingSessionId,
        cancel: CancellationToken,
        expires_at: time::Timestamp,
    ) {
        let coordinator = Arc::clone(self);
        let remaining = (expires_at - time::now())
            .to_std()
            .unwrap_or(StdDuration::from_secs(0));
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(remaining) => {
                    coordinator.on_timeout(&protocol, session_id).await;
                }
            }
        });
    }

    async fn on_timeout(&self, protocol: &str, session_id: PairingSessionId) {
        let should_fire = {
            let sessions = self.sessions.lock().expect("pairing sessions mutex poisoned");
            sessions
                .get(protocol)
                .is_some_and(|session| session.active && session.id == session_id)
        };
        if should_fire {
            self.transition_terminal(protocol, PairingStatus::Timeout).await;
        }
    }

    /// Move a session to a terminal label, cancel its timer (idempotent),
    /// and emit the stop command plus the terminal progress event. Returns
    /// `None` if no session record exists at all for the protocol.
    async fn transition_terminal(&self, protocol: &str, label: PairingStatus) -> Option<PairingSession> {
        let snapshot = {
            let mut sessions = self.sessions.lock().expect("pairing sessions mutex poisoned");
            let session = sessions.get_mut(protocol)?;
            session.active = false;
            session.status = label;
            session.cancel.cancel();
            session.clone()
        };
        self.publish_stop_command(protocol).await;
        self.publish_progress(protocol, label, snapshot.device_id).await;
        Some(snapshot)
    }

    /// Stop a session. Idempotent: calling `stop` again on an
    /// already-terminal session is a no-op that returns the terminal
    /// snapshot unchanged (§8).
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if the protocol does not support pairing, and
    /// `NotFound` if no session has ever been started for it.
    pub async fn stop(&self, protocol_raw: &str, label: PairingStatus) -> Result<PairingSession, DeviceHubError> {
        let protocol = protocol_raw.trim().to_ascii_lowercase();
        if !self.registry.is_pairing_supported(&protocol) {
            return Err(UnsupportedError::PairingUnsupported(protocol).into());
        }

        {
            let sessions = self.sessions.lock().expect("pairing sessions mutex poisoned");
            match sessions.get(&protocol) {
                None => {
                    return Err(NotFoundError {
                        entity: "PairingSession",
                        id: protocol,
                    }
                    .into());
                }
                Some(session) if session.is_terminal() => return Ok(session.clone()),
                Some(_) => {}
            }
        }

        self.transition_terminal(&protocol, label)
            .await
            .ok_or_else(|| {
                NotFoundError {
                    entity: "PairingSession",
                    id: protocol.clone(),
                }
                .into()
            })
    }

    /// Candidate-acceptance hook, invoked by HDP Ingest the moment a
    /// metadata frame materializes a brand-new device (§4.5.a / §4.6).
    pub async fn on_device_candidate(&self, device: &Device) {
        let protocol = device.protocol.clone();
        let supports_interview = self.registry.supports_interview(&protocol);

        let accepted = {
            let mut sessions = self.sessions.lock().expect("pairing sessions mutex poisoned");
            let accept = sessions.get(&protocol).is_some_and(|session| {
                session.active
                    && session.device_id.is_none()
                    && !session.known_devices.contains(&device.id)
                    && session
                        .candidate_external_id
                        .as_deref()
                        .is_none_or(|candidate| candidate.eq_ignore_ascii_case(&device.external_id))
                    && device.created_at >= session.started_at - chrono::Duration::seconds(5)
            });
            if !accept {
                return;
            }
            let session = sessions.get_mut(&protocol).expect("checked present above");
            session.device_id = Some(device.id);
            session.status = PairingStatus::DeviceDetected;
            if supports_interview {
                session.awaiting_interview = true;
            } else {
                session.active = false;
            }
            session.clone()
        };

        self.publish_progress(&accepted.protocol, accepted.status, accepted.device_id).await;
        self.apply_pairing_hints(device.id, &accepted.metadata).await;
        self.publish_stop_command(&accepted.protocol).await;

        if !supports_interview {
            let _ = self.stop(&accepted.protocol, PairingStatus::Completed).await;
        }
    }

    /// Apply pairing-start metadata hints to the just-accepted device: a
    /// hint only wins over an existing field that is itself blank (§4.6),
    /// unlike the general ingest merge where a non-empty hint always wins.
    async fn apply_pairing_hints(&self, device_id: DeviceId, hints: &Json) {
        let Json::Object(map) = hints else { return };
        if map.is_empty() {
            return;
        }
        let cancel = CancellationToken::new();
        let Ok(Some(mut device)) = self.repo.get_by_id(device_id, cancel.clone()).await else {
            return;
        };

        let hint = |key: &str| {
            map.get(key)
                .and_then(Json::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let update = DeviceMetadataUpdate {
            name: device.name.is_empty().then(|| hint("name")).flatten(),
            icon: device.icon.is_empty().then(|| hint("icon")).flatten(),
            manufacturer: device.manufacturer.is_empty().then(|| hint("manufacturer")).flatten(),
            model: device.model.is_empty().then(|| hint("model")).flatten(),
            capabilities: None,
            inputs: None,
        };

        if device.merge_metadata(&update) {
            let _ = self.repo.upsert(device, cancel).await;
        }
    }

    fn record_candidate_external_id(&self, protocol: &str, raw: &str) {
        let mut sessions = self.sessions.lock().expect("pairing sessions mutex poisoned");
        let Some(session) = sessions.get_mut(protocol) else { return };
        if session.candidate_external_id.is_some() {
            return;
        }
        let prefix = format!("{protocol}/");
        let stripped = raw.strip_prefix(prefix.as_str()).unwrap_or(raw);
        if let Ok((_, normalized_external)) = identity::normalize(protocol, stripped) {
            session.candidate_external_id = Some(normalized_external);
        }
    }

    async fn set_status(&self, protocol: &str, status: PairingStatus, awaiting_interview: bool) {
        let snapshot = {
            let mut sessions = self.sessions.lock().expect("pairing sessions mutex poisoned");
            let Some(session) = sessions.get_mut(protocol) else { return };
            session.status = status;
            session.awaiting_interview = awaiting_interview;
            session.clone()
        };
        self.publish_progress(protocol, status, snapshot.device_id).await;
    }

    /// Reconcile an adapter-published `pairing_progress` frame (§4.6).
    /// Frames the coordinator itself published (carrying its own origin
    /// tag) are ignored — that is how the loop is broken.
    pub async fn on_progress_frame(&self, protocol_from_topic: &str, frame: PairingProgressFrame) {
        if frame.origin.as_deref() == Some(ORIGIN_DEVICE_HUB) {
            return;
        }

        let protocol = frame
            .protocol
            .clone()
            .unwrap_or_else(|| protocol_from_topic.to_string())
            .trim()
            .to_ascii_lowercase();
        if protocol.is_empty() {
            return;
        }

        if let Some(candidate) = frame.external_id.as_deref().or(frame.device_id.as_deref()) {
            self.record_candidate_external_id(&protocol, candidate);
        }

        let stage = frame.stage.as_deref().map(str::to_ascii_lowercase).unwrap_or_default();
        let status = frame.status.as_deref().map(str::to_ascii_lowercase).unwrap_or_default();

        if let Some(label) = parse_terminal_label(&stage).or_else(|| parse_terminal_label(&status)) {
            self.transition_terminal(&protocol, label).await;
            return;
        }

        if !self.registry.supports_interview(&protocol) {
            return;
        }

        match stage.as_str() {
            "device_joined" | "device_announced" => {
                self.set_status(&protocol, PairingStatus::DeviceJoined, true).await;
            }
            "interview_started" | "interviewing" => {
                self.set_status(&protocol, PairingStatus::Interviewing, true).await;
            }
            "interview_succeeded" | "interview_complete" | "completed" => {
                self.set_status(&protocol, PairingStatus::InterviewComplete, false).await;
                let _ = self.stop(&protocol, PairingStatus::Completed).await;
            }
            "interview_failed" | "failed" => {
                let _ = self.stop(&protocol, PairingStatus::Failed).await;
            }
            _ => {}
        }
    }
}
