//! key: planner
//! Selects a playbook for an `EnrichedEvent`, scores the resulting
//! `RecoveryPlan`'s risk, and routes it through Governance.

mod models;
mod registry;

pub use models::{
    ActionRecord, PlanOutcome, PlanStatus, Playbook, Predicate, RecoveryPlan, RiskLevel,
    SuccessStats,
};
pub use registry::{predicate_holds, PlanContext, PlaybookRegistry};

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::REVIEW_THRESHOLD;
use crate::enrichment::{EnrichedEvent, Guardrail};
use crate::error::{GraceError, GraceResult};
use crate::governance::{ActionContext, Decision, GovernanceGate};
use crate::log::{AppendRequest, ImmutableLog, LogResult};
use crate::mesh::{safe_publish, Event, EventMesh};

pub struct Planner {
    registry: Arc<PlaybookRegistry>,
    governance: Arc<GovernanceGate>,
    mesh: Arc<EventMesh>,
    log: Arc<ImmutableLog>,
}

impl Planner {
    pub fn new(
        registry: Arc<PlaybookRegistry>,
        governance: Arc<GovernanceGate>,
        mesh: Arc<EventMesh>,
        log: Arc<ImmutableLog>,
    ) -> Self {
        Self {
            registry,
            governance,
            mesh,
            log,
        }
    }

    pub async fn plan(
        &self,
        enriched: &EnrichedEvent,
        guardrail: Guardrail,
        blast_radius: u64,
    ) -> GraceResult<RecoveryPlan> {
        let ctx = context_from_enriched(enriched);

        let mut candidates = self.registry.matching(&ctx);
        if candidates.is_empty() {
            return Err(GraceError::NotFound(format!(
                "no playbook matches event {}",
                enriched.original_event.event_type
            )));
        }
        candidates.sort_by(|a, b| {
            b.outcomes
                .success_rate()
                .partial_cmp(&a.outcomes.success_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.risk_level.cmp(&b.risk_level))
        });
        let playbook = candidates.into_iter().next().unwrap();

        let blast_term = (blast_radius as f64 / 20.0).clamp(0.0, 1.0);
        let risk_score = ((playbook.risk_level.as_score() * 0.3
            + enriched.risk * 0.4
            + blast_term * 0.3)
            * guardrail.risk_multiplier())
        .clamp(0.0, 1.0);

        let requires_approval = playbook.requires_approval || risk_score >= *REVIEW_THRESHOLD;
        let target_nodes = vec![enriched.original_event.resource.clone()];

        let plan_id = Uuid::new_v4();
        let justification = format!(
            "selected '{}' (success_rate={:.2}) for intent {:?}; risk_score={:.2}",
            playbook.name,
            playbook.outcomes.success_rate(),
            enriched.intent,
            risk_score
        );

        safe_publish(
            &self.mesh,
            Event::new(
                "plan.proposed",
                "planner",
                enriched.signer_identity.clone(),
                target_nodes.join(","),
                "plan",
                std::collections::BTreeMap::from([(
                    "playbook_id".to_string(),
                    serde_json::Value::String(playbook.playbook_id.clone()),
                )]),
            ),
        )
        .await;

        let decision = self
            .governance
            .check(
                &enriched.signer_identity,
                "execute_playbook",
                &target_nodes.join(","),
                ActionContext {
                    risk_level: Some(if requires_approval {
                        "high".to_string()
                    } else {
                        "low".to_string()
                    }),
                    payload: serde_json::json!({"playbook_id": playbook.playbook_id}),
                    committee: "operations".to_string(),
                    ..ActionContext::default()
                },
            )
            .await;

        let status = match decision.decision {
            Decision::Allow => PlanStatus::Approved,
            Decision::Deny | Decision::Review => PlanStatus::Proposed,
        };

        self.log
            .append(AppendRequest {
                actor: enriched.signer_identity.clone(),
                action: "plan.created".into(),
                resource: target_nodes.join(","),
                subsystem: "planner".into(),
                payload: serde_json::json!({
                    "plan_id": plan_id,
                    "playbook_id": playbook.playbook_id,
                    "risk_score": risk_score,
                    "status": status,
                }),
                result: LogResult::Started,
            })
            .await?;

        Ok(RecoveryPlan {
            plan_id,
            playbook,
            target_nodes,
            parameters: serde_json::Value::Object(enriched.original_event.payload.clone().into_iter().collect()),
            risk_score,
            justification,
            status,
            created_at: Utc::now(),
            completed_at: None,
            outcome: None,
            parliament_session_id: decision.parliament_session_id,
        })
    }

    pub fn registry(&self) -> Arc<PlaybookRegistry> {
        self.registry.clone()
    }
}

fn context_from_enriched(enriched: &EnrichedEvent) -> PlanContext {
    let kpis = enriched
        .original_event
        .payload
        .iter()
        .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
        .collect();

    let node_status = enriched
        .context
        .get("node_status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    PlanContext {
        event_type: enriched.original_event.event_type.clone(),
        kpis,
        node_status,
    }
}
