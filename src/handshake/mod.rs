//! key: component-handshake
//! Onboarding protocol for a new component joining the mesh:
//! `pending → (governance_approved ∧ crypto_validated) → announced →
//! (quorum_met | quorum_failed) → integrated → observation_window`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::warn;

use crate::config::{HANDSHAKE_ACK_TIMEOUT, HANDSHAKE_OBSERVATION_WINDOW};
use crate::crypto::{CryptoIdentity, CryptoRegistry};
use crate::error::{GraceError, GraceResult};
use crate::governance::GovernanceGate;
use crate::log::{AppendRequest, ImmutableLog, LogResult};
use crate::mesh::{safe_publish, Event, EventMesh};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Pending,
    Announced,
    Integrated,
    ObservationWindow,
    Failed,
}

fn default_required_acknowledgers() -> HashSet<String> {
    ["planner", "memory_broker", "health_graph", "anomaly_hub", "executor"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Per-attempt channel the handshake listens on for `handshake.ack`
/// events; each required acknowledger sends its member id once.
pub struct AckChannel {
    sender: mpsc::Sender<String>,
    receiver: Mutex<mpsc::Receiver<String>>,
}

impl AckChannel {
    pub fn new() -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(64);
        Arc::new(Self {
            sender,
            receiver: Mutex::new(receiver),
        })
    }

    pub async fn ack(&self, acknowledger: impl Into<String>) {
        let _ = self.sender.send(acknowledger.into()).await;
    }
}

pub struct ComponentHandshake {
    governance: Arc<GovernanceGate>,
    crypto_registry: Arc<CryptoRegistry>,
    log: Arc<ImmutableLog>,
    mesh: Arc<EventMesh>,
    required_acknowledgers: HashSet<String>,
    ack_timeout: Duration,
}

impl ComponentHandshake {
    pub fn new(
        governance: Arc<GovernanceGate>,
        crypto_registry: Arc<CryptoRegistry>,
        log: Arc<ImmutableLog>,
        mesh: Arc<EventMesh>,
    ) -> Self {
        Self {
            governance,
            crypto_registry,
            log,
            mesh,
            required_acknowledgers: default_required_acknowledgers(),
            ack_timeout: *HANDSHAKE_ACK_TIMEOUT,
        }
    }

    pub fn with_required_acknowledgers(mut self, required: HashSet<String>) -> Self {
        self.required_acknowledgers = required;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Drives one component through onboarding. `ack_channel` is the
    /// caller-owned sink fed by each required acknowledger's `ack` call.
    pub async fn onboard(
        &self,
        identity: &CryptoIdentity,
        ack_channel: Arc<AckChannel>,
    ) -> GraceResult<HandshakeState> {
        if !self.crypto_registry.is_validated(&identity.entity_id) {
            self.record(identity, HandshakeState::Failed, "crypto_validation_failed").await;
            return Err(GraceError::Unauthorized(format!(
                "component {} has no validated crypto identity",
                identity.entity_id
            )));
        }

        let decision = self
            .governance
            .check(
                &identity.entity_id,
                "handshake.announce",
                &identity.entity_id,
                crate::governance::ActionContext::default(),
            )
            .await;

        if decision.decision != crate::governance::Decision::Allow {
            self.record(identity, HandshakeState::Failed, "governance_denied").await;
            return Err(GraceError::Unauthorized(format!(
                "component {} not approved by governance: {}",
                identity.entity_id, decision.reason
            )));
        }

        self.record(identity, HandshakeState::Announced, "announced").await;
        safe_publish(
            &self.mesh,
            Event::new(
                "handshake.announced",
                "handshake",
                "handshake",
                &identity.entity_id,
                "handshake",
                Default::default(),
            ),
        )
        .await;

        let mut acked: HashSet<String> = HashSet::new();
        let wait_result = timeout(self.ack_timeout, async {
            let mut receiver = ack_channel.receiver.lock().await;
            while acked.len() < self.required_acknowledgers.len() {
                match receiver.recv().await {
                    Some(who) => {
                        if self.required_acknowledgers.contains(&who) {
                            acked.insert(who);
                        }
                    }
                    None => break,
                }
            }
        })
        .await;

        if wait_result.is_err() || acked.len() < self.required_acknowledgers.len() {
            self.record(identity, HandshakeState::Failed, "quorum_failed").await;
            warn!(
                component = %identity.entity_id,
                acked = acked.len(),
                required = self.required_acknowledgers.len(),
                "handshake quorum not met"
            );
            return Ok(HandshakeState::Failed);
        }

        self.record(identity, HandshakeState::Integrated, "quorum_met").await;
        safe_publish(
            &self.mesh,
            Event::new(
                "handshake.integrated",
                "handshake",
                "handshake",
                &identity.entity_id,
                "handshake",
                Default::default(),
            ),
        )
        .await;

        tokio::spawn(open_observation_window(
            self.mesh.clone(),
            self.log.clone(),
            identity.entity_id.clone(),
        ));

        Ok(HandshakeState::ObservationWindow)
    }

    async fn record(&self, identity: &CryptoIdentity, state: HandshakeState, reason: &str) {
        crate::log::safe_log(
            &self.log,
            AppendRequest {
                actor: "handshake".into(),
                action: format!("handshake_{}", state_name(state)),
                resource: identity.entity_id.clone(),
                subsystem: "handshake".into(),
                payload: serde_json::json!({ "reason": reason, "crypto_id": identity.crypto_id }),
                result: LogResult::Decided,
            },
        )
        .await;
    }
}

fn state_name(state: HandshakeState) -> &'static str {
    match state {
        HandshakeState::Pending => "pending",
        HandshakeState::Announced => "announced",
        HandshakeState::Integrated => "integrated",
        HandshakeState::ObservationWindow => "observation_window",
        HandshakeState::Failed => "failed",
    }
}

async fn open_observation_window(mesh: Arc<EventMesh>, log: Arc<ImmutableLog>, component: String) {
    tokio::time::sleep(*HANDSHAKE_OBSERVATION_WINDOW).await;
    crate::log::safe_log(
        &log,
        AppendRequest {
            actor: "handshake".into(),
            action: "handshake_observation_window_closed".into(),
            resource: component.clone(),
            subsystem: "handshake".into(),
            payload: serde_json::json!({}),
            result: LogResult::Decided,
        },
    )
    .await;
    safe_publish(
        &mesh,
        Event::new(
            "handshake.observation_window_closed",
            "handshake",
            "handshake",
            &component,
            "handshake",
            Default::default(),
        ),
    )
    .await;
}
