//! key: enrichment
//! Raw `Event` -> ranked `EnrichedEvent` with intent, confidence, and
//! context pulled from the Health Graph and recent episodic memory.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{ENRICHMENT_CONTEXT_DEPTH, MIN_EVENT_CONFIDENCE};
use crate::health::{HealthGraph, NodeStatus};
use crate::mesh::Event;
use crate::memory::{AgenticMemoryBroker, MemoryRequest, MemoryType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DeployNewVersion,
    AdjustCapacity,
    SignalDegradation,
    UnknownIntent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub event_id: Uuid,
    pub original_event: Event,
    pub signer_identity: String,
    pub intent: Intent,
    pub context: Value,
    pub expected_outcome: String,
    pub confidence: f64,
    pub risk: f64,
}

/// Guardrail bias the Meta Coordinator publishes; biases risk scoring by a
/// bounded multiplicative factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guardrail {
    Tighten,
    Maintain,
    Loosen,
}

impl Guardrail {
    pub fn risk_multiplier(self) -> f64 {
        match self {
            Guardrail::Tighten => 1.25,
            Guardrail::Maintain => 1.0,
            Guardrail::Loosen => 0.8,
        }
    }
}

pub struct Enrichment {
    health: Arc<HealthGraph>,
    memory: Arc<AgenticMemoryBroker>,
}

/// Outcome of running enrichment: either a ranked event, or a note that the
/// event was dropped as low-confidence (logged as `low_confidence`).
pub enum EnrichmentOutcome {
    Enriched(EnrichedEvent),
    DroppedLowConfidence { event_id: Uuid, confidence: f64 },
}

impl Enrichment {
    pub fn new(health: Arc<HealthGraph>, memory: Arc<AgenticMemoryBroker>) -> Self {
        Self { health, memory }
    }

    pub async fn enrich(&self, event: Event, guardrail: Guardrail) -> EnrichmentOutcome {
        let signer_identity = event.source.clone();
        let intent = infer_intent(&event.event_type);

        let node = self.health.get(&event.resource);
        let dependency_chain = self
            .health
            .dependency_chain(&event.resource, *ENRICHMENT_CONTEXT_DEPTH);

        let memory_response = self
            .memory
            .request_memory(MemoryRequest {
                domain: event.subsystem.clone(),
                memory_type: MemoryType::Episodic,
                query_tags: vec![event.event_type.clone()],
                query_context: Default::default(),
                include_cross_domain: false,
                limit: 5,
                requesting_trust: 1.0,
                actor: event.actor.clone(),
            })
            .await;

        let corroborating = memory_response.memories.len();

        let kpi_deviation = node
            .as_ref()
            .map(|n| n.kpis.values().cloned().fold(0.0_f64, f64::max))
            .unwrap_or(0.0);

        let confidence = score_confidence(corroborating, kpi_deviation);

        if confidence < *MIN_EVENT_CONFIDENCE {
            return EnrichmentOutcome::DroppedLowConfidence {
                event_id: event.event_id,
                confidence,
            };
        }

        let priority = node.as_ref().map(|n| n.priority).unwrap_or(0);
        let blast_radius = self.health.blast_radius(&event.resource);
        let status = node.as_ref().map(|n| n.status).unwrap_or(NodeStatus::Unknown);
        let risk = score_risk(&event.event_type, priority, blast_radius, status, guardrail);

        let context = serde_json::json!({
            "node_status": status,
            "dependency_chain": dependency_chain,
            "corroborating_events": corroborating,
        });

        EnrichmentOutcome::Enriched(EnrichedEvent {
            event_id: event.event_id,
            expected_outcome: expected_outcome_for(intent),
            original_event: event,
            signer_identity,
            intent,
            context,
            confidence,
            risk,
        })
    }
}

fn infer_intent(event_type: &str) -> Intent {
    if event_type.starts_with("deploy") {
        Intent::DeployNewVersion
    } else if event_type.starts_with("scale") {
        Intent::AdjustCapacity
    } else if event_type.starts_with("alert") || event_type.starts_with("incident") {
        Intent::SignalDegradation
    } else {
        Intent::UnknownIntent
    }
}

fn expected_outcome_for(intent: Intent) -> String {
    match intent {
        Intent::DeployNewVersion => "new version rolled out without regression".into(),
        Intent::AdjustCapacity => "resource headroom restored".into(),
        Intent::SignalDegradation => "degraded dependency recovers".into(),
        Intent::UnknownIntent => "no specific outcome expected".into(),
    }
}

/// Monotonic in corroborating recent events and KPI deviation, bounded to
/// `[0, 1]`.
fn score_confidence(corroborating_events: usize, kpi_deviation: f64) -> f64 {
    let corroboration_term = (corroborating_events as f64 / 5.0).min(1.0) * 0.6;
    let deviation_term = (kpi_deviation / 100.0).clamp(0.0, 1.0) * 0.4;
    (corroboration_term + deviation_term).clamp(0.0, 1.0)
}

fn score_risk(
    event_type: &str,
    priority: i32,
    blast_radius: u64,
    status: NodeStatus,
    guardrail: Guardrail,
) -> f64 {
    let base = base_weight_for_event_type(event_type);
    let priority_term = (priority as f64 / 10.0).clamp(0.0, 1.0);
    let blast_term = (blast_radius as f64 / 20.0).clamp(0.0, 1.0);
    let status_term = match status {
        NodeStatus::Critical => 1.0,
        NodeStatus::Degraded => 0.6,
        NodeStatus::Unknown => 0.3,
        NodeStatus::Healthy => 0.1,
    };

    let raw = (base * 0.4 + priority_term * 0.2 + blast_term * 0.2 + status_term * 0.2)
        * guardrail.risk_multiplier();
    raw.clamp(0.0, 1.0)
}

fn base_weight_for_event_type(event_type: &str) -> f64 {
    if event_type.starts_with("incident") || event_type.contains("critical") {
        0.9
    } else if event_type.starts_with("alert") || event_type.starts_with("health") {
        0.6
    } else if event_type.starts_with("deploy") {
        0.4
    } else {
        0.3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_inferred_from_event_type_prefix() {
        assert_eq!(infer_intent("deploy.started"), Intent::DeployNewVersion);
        assert_eq!(infer_intent("scale.requested"), Intent::AdjustCapacity);
        assert_eq!(infer_intent("alert.fired"), Intent::SignalDegradation);
        assert_eq!(infer_intent("incident.opened"), Intent::SignalDegradation);
        assert_eq!(infer_intent("mystery.thing"), Intent::UnknownIntent);
    }

    #[test]
    fn confidence_boundary_0_4_is_kept_0_399_is_dropped() {
        // corroboration term alone can't reach 0.4, so use kpi deviation to
        // probe the documented boundary directly.
        assert!(score_confidence(0, 99.75) < 0.4);
        assert!(score_confidence(0, 100.0) >= 0.4);
    }

    #[test]
    fn tighten_increases_risk_loosen_decreases_it() {
        let maintain = score_risk("incident.degraded", 5, 3, NodeStatus::Degraded, Guardrail::Maintain);
        let tighten = score_risk("incident.degraded", 5, 3, NodeStatus::Degraded, Guardrail::Tighten);
        let loosen = score_risk("incident.degraded", 5, 3, NodeStatus::Degraded, Guardrail::Loosen);
        assert!(tighten > maintain);
        assert!(loosen < maintain);
    }
}
