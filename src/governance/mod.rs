//! key: governance-gate
//! Policy evaluation: allow / deny / review. `review` outcomes open a
//! Parliament session; every decision is logged.

mod policy;

pub use policy::{Policy, PolicyAction, PolicyCondition, PolicyStore, InMemoryPolicyStore};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::log::{AppendRequest, ImmutableLog, LogResult};
use crate::parliament::{CreateSessionRequest, Parliament};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(clippy::enum_variant_names)]
pub enum Decision {
    Allow,
    Deny,
    Review,
}

/// Unified decision shape: earlier designs conflated `{decision}` /
/// `{approved}` / `{requires_approval}`; every governance call site in
/// this crate normalises to this one struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceDecision {
    pub decision: Decision,
    pub reason: String,
    pub parliament_session_id: Option<String>,
    pub audit_id: Uuid,
}

pub struct GovernanceGate {
    policies: Arc<dyn PolicyStore>,
    log: Arc<ImmutableLog>,
    parliament: Arc<Parliament>,
}

/// Risk-bearing context the caller supplies alongside action/resource; gate
/// logic consults `risk_level` and free-form `payload` without knowing the
/// concrete action schema of the caller's domain. `committee`/`quorum_*`
/// seed the Parliament session opened when the decision is `review`.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub risk_level: Option<String>,
    pub payload: Value,
    pub committee: String,
    pub quorum_required: u64,
    pub approval_threshold: f64,
    pub decide_on_weighted_totals: bool,
    pub expires_in: chrono::Duration,
}

impl Default for ActionContext {
    fn default() -> Self {
        Self {
            risk_level: None,
            payload: Value::Null,
            committee: "default".to_string(),
            quorum_required: 3,
            approval_threshold: 0.5,
            decide_on_weighted_totals: false,
            expires_in: chrono::Duration::hours(1),
        }
    }
}

impl GovernanceGate {
    pub fn new(policies: Arc<dyn PolicyStore>, log: Arc<ImmutableLog>, parliament: Arc<Parliament>) -> Self {
        Self {
            policies,
            log,
            parliament,
        }
    }

    /// `check(actor, action, resource, payload|context) -> Decision`.
    pub async fn check(
        &self,
        actor: &str,
        action: &str,
        resource: &str,
        context: ActionContext,
    ) -> GovernanceDecision {
        let audit_id = Uuid::new_v4();
        let mut policies = self.policies.list().await;
        policies.sort_by(|a, b| b.severity.cmp(&a.severity));

        for policy in &policies {
            if policy.condition.matches(action, resource, &context.payload) {
                match policy.action {
                    PolicyAction::Deny => {
                        return self
                            .finish(
                                audit_id,
                                actor,
                                action,
                                resource,
                                &context,
                                Decision::Deny,
                                format!("policy '{}' denied", policy.name),
                            )
                            .await
                    }
                    PolicyAction::Review => {
                        return self
                            .finish(
                                audit_id,
                                actor,
                                action,
                                resource,
                                &context,
                                Decision::Review,
                                format!("policy '{}' requires review", policy.name),
                            )
                            .await
                    }
                    PolicyAction::Allow => {}
                }
            }
        }

        // Step 2: risk level.
        let risk_level = context
            .risk_level
            .clone()
            .unwrap_or_else(|| derive_risk_from_action(action));
        if risk_level == "high" || risk_level == "critical" {
            return self
                .finish(
                    audit_id,
                    actor,
                    action,
                    resource,
                    &context,
                    Decision::Review,
                    format!("risk level '{risk_level}' requires review"),
                )
                .await;
        }

        // Step 3: schema-like sensitivities.
        let lowered_action = action.to_ascii_lowercase();
        let lowered_resource = resource.to_ascii_lowercase();
        if lowered_action.contains("schema")
            || (lowered_action.contains("delete") && lowered_resource.contains("primary"))
        {
            return self
                .finish(
                    audit_id,
                    actor,
                    action,
                    resource,
                    &context,
                    Decision::Review,
                    "sensitive schema/delete action requires review".to_string(),
                )
                .await;
        }

        self.finish(
            audit_id,
            actor,
            action,
            resource,
            &context,
            Decision::Allow,
            "no policy matched".to_string(),
        )
        .await
    }

    /// Logs the decision and, for `review`, opens the Parliament session
    /// the caller awaits (`RequiresReview` semantics): the returned
    /// `GovernanceDecision` always carries `parliament_session_id` in that
    /// case.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        audit_id: Uuid,
        actor: &str,
        action: &str,
        resource: &str,
        context: &ActionContext,
        decision: Decision,
        reason: String,
    ) -> GovernanceDecision {
        let parliament_session_id = if decision == Decision::Review {
            let session = self
                .parliament
                .create_session(CreateSessionRequest {
                    policy_name: "governance_review".into(),
                    action_type: action.to_string(),
                    action_payload: context.payload.clone(),
                    actor: actor.to_string(),
                    resource: resource.to_string(),
                    committee: context.committee.clone(),
                    quorum_required: context.quorum_required,
                    approval_threshold: context.approval_threshold,
                    decide_on_weighted_totals: context.decide_on_weighted_totals,
                    expires_in: context.expires_in,
                    attached_alerts: vec![],
                    risk_level: context.risk_level.clone().unwrap_or_else(|| "medium".into()),
                })
                .await;
            Some(session.session_id.to_string())
        } else {
            None
        };

        let result = match decision {
            Decision::Allow => LogResult::Decided,
            Decision::Deny => LogResult::Denied,
            Decision::Review => LogResult::Queued,
        };
        let _ = self
            .log
            .append(AppendRequest {
                actor: actor.to_string(),
                action: action.to_string(),
                resource: resource.to_string(),
                subsystem: "governance".into(),
                payload: serde_json::json!({
                    "reason": reason,
                    "audit_id": audit_id,
                    "parliament_session_id": parliament_session_id,
                }),
                result,
            })
            .await;

        GovernanceDecision {
            decision,
            reason,
            parliament_session_id,
            audit_id,
        }
    }
}

fn derive_risk_from_action(action: &str) -> String {
    let lowered = action.to_ascii_lowercase();
    if lowered.contains("delete") || lowered.contains("shutdown") || lowered.contains("rollback") {
        "critical".to_string()
    } else if lowered.contains("execute") || lowered.contains("scale") {
        "medium".to_string()
    } else {
        "low".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signer;
    use crate::log::InMemoryLogStore;

    fn gate_with_policies(policies: Vec<Policy>) -> GovernanceGate {
        let store = Arc::new(InMemoryPolicyStore::new(policies));
        let log = Arc::new(ImmutableLog::new(
            Arc::new(InMemoryLogStore::new()),
            Arc::new(Ed25519Signer::generate("governance")),
        ));
        let parliament = Arc::new(crate::parliament::Parliament::new(
            Arc::new(crate::parliament::InMemorySessionStore::new()),
            Arc::new(crate::parliament::InMemoryMemberStore::new(vec![])),
            log.clone(),
            Arc::new(Ed25519Signer::generate("parliament-votes")),
        ));
        GovernanceGate::new(store, log, parliament)
    }

    #[tokio::test]
    async fn empty_policy_set_allows() {
        let gate = gate_with_policies(vec![]);
        let decision = gate
            .check("actor", "read", "svc-a", ActionContext::default())
            .await;
        assert_eq!(decision.decision, Decision::Allow);
    }

    #[tokio::test]
    async fn keyword_policy_triggers_review() {
        let gate = gate_with_policies(vec![Policy {
            name: "dangerous-ops".into(),
            condition: PolicyCondition {
                action: Some("execute".into()),
                keywords: vec!["dangerous".into()],
                forbidden_paths: vec![],
            },
            action: PolicyAction::Review,
            severity: 10,
        }]);
        let decision = gate
            .check(
                "actor",
                "execute",
                "svc-a",
                ActionContext {
                    risk_level: None,
                    payload: serde_json::json!({"command": "dangerous op"}),
                    ..ActionContext::default()
                },
            )
            .await;
        assert_eq!(decision.decision, Decision::Review);
        assert!(decision.parliament_session_id.is_some());
    }

    #[tokio::test]
    async fn deny_wins_over_review() {
        let gate = gate_with_policies(vec![
            Policy {
                name: "review-all".into(),
                condition: PolicyCondition {
                    action: Some("execute".into()),
                    keywords: vec![],
                    forbidden_paths: vec![],
                },
                action: PolicyAction::Review,
                severity: 1,
            },
            Policy {
                name: "deny-prod".into(),
                condition: PolicyCondition {
                    action: Some("execute".into()),
                    keywords: vec![],
                    forbidden_paths: vec!["prod".into()],
                },
                action: PolicyAction::Deny,
                severity: 5,
            },
        ]);
        let decision = gate
            .check("actor", "execute", "prod-db", ActionContext::default())
            .await;
        assert_eq!(decision.decision, Decision::Deny);
    }

    #[tokio::test]
    async fn high_risk_payload_requires_review() {
        let gate = gate_with_policies(vec![]);
        let decision = gate
            .check(
                "actor",
                "adjust_capacity",
                "svc-a",
                ActionContext {
                    risk_level: Some("high".into()),
                    payload: Value::Null,
                    ..ActionContext::default()
                },
            )
            .await;
        assert_eq!(decision.decision, Decision::Review);
    }
}
