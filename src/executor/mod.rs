//! key: playbook-executor
//! Runs a `RecoveryPlan`'s steps against the external action adapter,
//! verifies, rolls back on failure, and signs the terminal outcome.

mod adapter;

pub use adapter::{AdapterOutcome, ExternalActionAdapter};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::crypto::Signer;
use crate::error::{GraceError, GraceResult};
use crate::health::HealthGraph;
use crate::log::{AppendRequest, ImmutableLog, LogResult};
use crate::mesh::{safe_publish, Event, EventMesh};
use crate::planner::{predicate_holds, ActionRecord, PlanContext, PlanOutcome, PlanStatus, RecoveryPlan};

const MAX_ADAPTER_RETRIES: u32 = 3;

/// Serialises overlapping `target_nodes` across concurrently executing
/// plans: the second plan targeting an already-locked node is held queued.
#[derive(Default)]
pub struct LockTable {
    locks: Mutex<HashMap<String, uuid::Uuid>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_acquire(&self, plan_id: uuid::Uuid, targets: &[String]) -> bool {
        let mut locks = self.locks.lock().await;
        if targets.iter().any(|t| locks.contains_key(t)) {
            return false;
        }
        for target in targets {
            locks.insert(target.clone(), plan_id);
        }
        true
    }

    async fn release(&self, targets: &[String]) {
        let mut locks = self.locks.lock().await;
        for target in targets {
            locks.remove(target);
        }
    }
}

pub struct PlaybookExecutor {
    adapter: Arc<dyn ExternalActionAdapter>,
    log: Arc<ImmutableLog>,
    mesh: Arc<EventMesh>,
    signer: Arc<dyn Signer>,
    locks: Arc<LockTable>,
    health: Arc<HealthGraph>,
}

impl PlaybookExecutor {
    pub fn new(
        adapter: Arc<dyn ExternalActionAdapter>,
        log: Arc<ImmutableLog>,
        mesh: Arc<EventMesh>,
        signer: Arc<dyn Signer>,
        locks: Arc<LockTable>,
        health: Arc<HealthGraph>,
    ) -> Self {
        Self {
            adapter,
            log,
            mesh,
            signer,
            locks,
            health,
        }
    }

    /// Drives one plan through `approved -> executing -> (completed |
    /// failed | rolled_back)`. Returns the plan with its terminal status
    /// and signed outcome populated.
    pub async fn execute(&self, mut plan: RecoveryPlan) -> GraceResult<RecoveryPlan> {
        if plan.status != PlanStatus::Approved {
            return Err(GraceError::Conflict(format!(
                "plan {} is not approved (status={:?})",
                plan.plan_id, plan.status
            )));
        }

        if !self.locks.try_acquire(plan.plan_id, &plan.target_nodes).await {
            return Err(GraceError::Conflict(format!(
                "plan {} overlaps an in-flight plan on {:?}",
                plan.plan_id, plan.target_nodes
            )));
        }

        plan.status = PlanStatus::Executing;
        let start = Instant::now();
        let mut executed_steps: Vec<ActionRecord> = Vec::new();
        let mut verification_passed = true;
        let mut failure_reason: Option<String> = None;

        for step in plan.playbook.steps.clone() {
            self.log_step(&plan, "step_started", &step).await;

            match self.run_step(&step).await {
                Ok(()) => {
                    executed_steps.push(step.clone());
                    if let Some(failed_check) = self.failing_verification(&plan) {
                        verification_passed = false;
                        failure_reason = Some(format!("verification failed: {failed_check:?}"));
                        self.log_step(&plan, "verification_failed", &step).await;
                        break;
                    }
                }
                Err(err) => {
                    failure_reason = Some(err.to_string());
                    self.log_step(&plan, "step_failed", &step).await;
                    break;
                }
            }
        }

        let outcome = if failure_reason.is_none() {
            plan.status = PlanStatus::Completed;
            PlanOutcome {
                result: "completed".into(),
                duration_ms: start.elapsed().as_millis() as u64,
                verification_passed: true,
                trust_decision: "trusted".into(),
                rationale: "all steps executed and verified".into(),
                learned_insights: vec![],
            }
        } else {
            let rollback_ok = self.rollback(&plan, &executed_steps).await;
            plan.status = if rollback_ok {
                PlanStatus::RolledBack
            } else {
                PlanStatus::Failed
            };
            if !rollback_ok {
                safe_publish(
                    &self.mesh,
                    Event::new(
                        "plan.rollback_failed",
                        "executor",
                        "executor",
                        plan.target_nodes.join(","),
                        "executor",
                        Default::default(),
                    ),
                )
                .await;
                warn!(plan_id = %plan.plan_id, "rollback failed, human escalation required");
            }
            PlanOutcome {
                result: failure_reason.clone().unwrap_or_default(),
                duration_ms: start.elapsed().as_millis() as u64,
                verification_passed,
                trust_decision: "not_trusted".into(),
                rationale: failure_reason.unwrap_or_default(),
                learned_insights: vec![],
            }
        };

        plan.completed_at = Some(Utc::now());
        plan.outcome = Some(outcome.clone());

        self.locks.release(&plan.target_nodes).await;

        safe_publish(
            &self.mesh,
            Event::new(
                "plan.executed",
                "executor",
                "executor",
                plan.target_nodes.join(","),
                "executor",
                Default::default(),
            ),
        )
        .await;

        let signing_material = format!("{}|{}|{:?}", plan.plan_id, outcome.result, plan.status);
        let signature = self.signer.sign(signing_material.as_bytes());
        self.log
            .append(AppendRequest {
                actor: "executor".into(),
                action: "executor.signed_outcome".into(),
                resource: plan.target_nodes.join(","),
                subsystem: "executor".into(),
                payload: serde_json::json!({
                    "plan_id": plan.plan_id,
                    "playbook_id": plan.playbook.playbook_id,
                    "result": outcome.result,
                    "duration_ms": outcome.duration_ms,
                    "verification_passed": outcome.verification_passed,
                    "trust_decision": outcome.trust_decision,
                    "rationale": outcome.rationale,
                    "learned_insights": outcome.learned_insights,
                    "signature": signature.0,
                    "status": plan.status,
                }),
                result: LogResult::Decided,
            })
            .await?;

        info!(plan_id = %plan.plan_id, status = ?plan.status, "plan reached terminal state");
        Ok(plan)
    }

    async fn run_step(&self, step: &ActionRecord) -> GraceResult<()> {
        let mut attempt = 0;
        loop {
            match self.adapter.execute(step).await {
                AdapterOutcome::Ok(_) => return Ok(()),
                AdapterOutcome::Err { error, retryable } if retryable && attempt < MAX_ADAPTER_RETRIES => {
                    attempt += 1;
                    warn!(step = step.action_type, attempt, %error, "adapter call failed, retrying");
                    sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt))).await;
                }
                AdapterOutcome::Err { error, retryable } => {
                    return Err(GraceError::AdapterError { message: error, retryable });
                }
            }
        }
    }

    fn failing_verification(&self, plan: &RecoveryPlan) -> Option<&crate::planner::Predicate> {
        let ctx = self.verification_context(plan);
        plan.playbook
            .verifications
            .iter()
            .find(|predicate| !predicate_holds(predicate, &ctx))
    }

    /// Builds the context verifications run against from real state: current
    /// `HealthGraph` readings for the plan's target nodes, overlaid on the
    /// triggering event's own KPI snapshot (`plan.parameters`, populated by
    /// the Planner) for any KPI the graph doesn't track for that node.
    fn verification_context(&self, plan: &RecoveryPlan) -> PlanContext {
        let mut kpis: HashMap<String, f64> = plan
            .parameters
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                    .collect()
            })
            .unwrap_or_default();

        let mut node_status = "unknown".to_string();
        for target in &plan.target_nodes {
            if let Some(node) = self.health.get(target) {
                kpis.extend(node.kpis.clone());
                node_status = serde_json::to_value(node.status)
                    .ok()
                    .and_then(|v| v.as_str().map(|s| s.to_string()))
                    .unwrap_or(node_status);
            }
        }

        PlanContext {
            event_type: String::new(),
            kpis,
            node_status,
        }
    }

    /// Executes rollback steps in reverse order, best-effort. Returns
    /// whether every rollback step succeeded.
    async fn rollback(&self, plan: &RecoveryPlan, _executed: &[ActionRecord]) -> bool {
        let mut all_ok = true;
        for step in plan.playbook.rollback_steps.iter().rev() {
            match self.adapter.execute(step).await {
                AdapterOutcome::Ok(_) => {}
                AdapterOutcome::Err { error, .. } => {
                    warn!(%error, step = step.action_type, "rollback step failed");
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    async fn log_step(&self, plan: &RecoveryPlan, action: &str, step: &ActionRecord) {
        crate::log::safe_log(
            &self.log,
            AppendRequest {
                actor: "executor".into(),
                action: action.to_string(),
                resource: plan.target_nodes.join(","),
                subsystem: "executor".into(),
                payload: serde_json::json!({
                    "plan_id": plan.plan_id,
                    "step": step.action_type,
                }),
                result: LogResult::Started,
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signer;
    use crate::log::InMemoryLogStore;
    use crate::planner::{Playbook, PlanStatus, Predicate, RiskLevel, SuccessStats};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysOkAdapter;
    #[async_trait]
    impl ExternalActionAdapter for AlwaysOkAdapter {
        async fn execute(&self, _action: &ActionRecord) -> AdapterOutcome {
            AdapterOutcome::Ok(serde_json::Value::Null)
        }
    }

    struct FailNTimesAdapter(AtomicUsize, usize);
    #[async_trait]
    impl ExternalActionAdapter for FailNTimesAdapter {
        async fn execute(&self, _action: &ActionRecord) -> AdapterOutcome {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n < self.1 {
                AdapterOutcome::Err {
                    error: "unreachable".into(),
                    retryable: true,
                }
            } else {
                AdapterOutcome::Ok(serde_json::Value::Null)
            }
        }
    }

    fn plan_with(playbook: Playbook) -> RecoveryPlan {
        RecoveryPlan {
            plan_id: uuid::Uuid::new_v4(),
            playbook,
            target_nodes: vec!["svc-a".into()],
            parameters: serde_json::Value::Null,
            risk_score: 0.2,
            justification: "test".into(),
            status: PlanStatus::Approved,
            created_at: Utc::now(),
            completed_at: None,
            outcome: None,
            parliament_session_id: None,
        }
    }

    fn simple_playbook() -> Playbook {
        Playbook {
            playbook_id: "noop".into(),
            name: "noop".into(),
            preconditions: vec![],
            steps: vec![ActionRecord {
                action_type: "noop".into(),
                target: "svc-a".into(),
                parameters: serde_json::Value::Null,
            }],
            verifications: vec![],
            rollback_steps: vec![],
            risk_level: RiskLevel::Low,
            requires_approval: false,
            outcomes: SuccessStats::default(),
        }
    }

    fn executor(adapter: Arc<dyn ExternalActionAdapter>) -> PlaybookExecutor {
        let log = Arc::new(ImmutableLog::new(
            Arc::new(InMemoryLogStore::new()),
            Arc::new(Ed25519Signer::generate("executor-log")),
        ));
        PlaybookExecutor::new(
            adapter,
            log,
            EventMesh::spawn(None),
            Arc::new(Ed25519Signer::generate("executor")),
            Arc::new(LockTable::new()),
            Arc::new(HealthGraph::new()),
        )
    }

    #[tokio::test]
    async fn successful_plan_completes() {
        let executor = executor(Arc::new(AlwaysOkAdapter));
        let plan = executor.execute(plan_with(simple_playbook())).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Completed);
        assert!(plan.outcome.unwrap().verification_passed);
    }

    #[tokio::test]
    async fn failing_verification_triggers_rollback() {
        let mut playbook = simple_playbook();
        playbook.verifications = vec![Predicate::NodeStatusIs {
            status: "healthy".into(),
        }];
        let executor = executor(Arc::new(AlwaysOkAdapter));
        let plan = executor.execute(plan_with(playbook)).await.unwrap();
        assert_eq!(plan.status, PlanStatus::RolledBack);
    }

    #[tokio::test]
    async fn transient_adapter_failure_is_retried() {
        let adapter = Arc::new(FailNTimesAdapter(AtomicUsize::new(0), 2));
        let executor = executor(adapter);
        let plan = executor.execute(plan_with(simple_playbook())).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Completed);
    }

    #[tokio::test]
    async fn verification_reads_live_health_graph_state() {
        let mut playbook = simple_playbook();
        playbook.verifications = vec![Predicate::KpiBelow {
            kpi: "cpu_utilization".into(),
            threshold: 85.0,
        }];
        let health = Arc::new(HealthGraph::new());
        health.register_node(crate::health::HealthNode::new("svc-a", "service", "svc-a", 1));
        health
            .update_health(
                "svc-a",
                crate::health::NodeStatus::Healthy,
                HashMap::from([("cpu_utilization".to_string(), 40.0)]),
            )
            .unwrap();

        let log = Arc::new(ImmutableLog::new(
            Arc::new(InMemoryLogStore::new()),
            Arc::new(Ed25519Signer::generate("executor-log")),
        ));
        let executor = PlaybookExecutor::new(
            Arc::new(AlwaysOkAdapter),
            log,
            EventMesh::spawn(None),
            Arc::new(Ed25519Signer::generate("executor")),
            Arc::new(LockTable::new()),
            health,
        );

        let plan = executor.execute(plan_with(playbook)).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Completed);
        assert!(plan.outcome.unwrap().verification_passed);
    }

    #[tokio::test]
    async fn non_approved_plan_is_rejected() {
        let executor = executor(Arc::new(AlwaysOkAdapter));
        let mut plan = plan_with(simple_playbook());
        plan.status = PlanStatus::Proposed;
        let result = executor.execute(plan).await;
        assert!(matches!(result, Err(GraceError::Conflict(_))));
    }
}
