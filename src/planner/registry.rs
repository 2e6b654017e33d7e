use std::collections::HashMap;

use dashmap::DashMap;

use super::models::{ActionRecord, Playbook, Predicate, RiskLevel, SuccessStats};

/// Context a playbook's preconditions/verifications are evaluated against.
pub struct PlanContext {
    pub event_type: String,
    pub kpis: HashMap<String, f64>,
    pub node_status: String,
}

pub fn predicate_holds(predicate: &Predicate, ctx: &PlanContext) -> bool {
    match predicate {
        Predicate::EventTypePrefix { prefix } => ctx.event_type.starts_with(prefix.as_str()),
        Predicate::KpiAbove { kpi, threshold } => {
            ctx.kpis.get(kpi).map(|v| v > threshold).unwrap_or(false)
        }
        Predicate::KpiBelow { kpi, threshold } => {
            ctx.kpis.get(kpi).map(|v| v < threshold).unwrap_or(false)
        }
        Predicate::NodeStatusIs { status } => ctx.node_status == *status,
    }
}

/// In-memory playbook library, seeded at construction. Single writer for
/// outcome bookkeeping (success/failure counters feeding the Bayesian
/// success-rate estimate), read freely by the Planner otherwise.
#[derive(Default)]
pub struct PlaybookRegistry {
    playbooks: DashMap<String, Playbook>,
}

impl PlaybookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default library grounded on a `scale_up`-class remediation and a
    /// generic restart-class remediation, matching the seed auto-remediation
    /// scenario (`health.degraded` with high `cpu_utilization`).
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Playbook {
            playbook_id: "scale_up_on_cpu_pressure".into(),
            name: "Scale up on CPU pressure".into(),
            preconditions: vec![Predicate::KpiAbove {
                kpi: "cpu_utilization".into(),
                threshold: 85.0,
            }],
            steps: vec![ActionRecord {
                action_type: "scale".into(),
                target: "{{target}}".into(),
                parameters: serde_json::json!({"direction": "up", "step": 1}),
            }],
            verifications: vec![Predicate::KpiBelow {
                kpi: "cpu_utilization".into(),
                threshold: 85.0,
            }],
            rollback_steps: vec![ActionRecord {
                action_type: "scale".into(),
                target: "{{target}}".into(),
                parameters: serde_json::json!({"direction": "down", "step": 1}),
            }],
            risk_level: RiskLevel::Low,
            requires_approval: false,
            outcomes: SuccessStats::default(),
        });
        registry.register(Playbook {
            playbook_id: "restart_degraded_service".into(),
            name: "Restart degraded service".into(),
            preconditions: vec![Predicate::NodeStatusIs {
                status: "degraded".into(),
            }],
            steps: vec![ActionRecord {
                action_type: "restart".into(),
                target: "{{target}}".into(),
                parameters: serde_json::json!({}),
            }],
            verifications: vec![Predicate::NodeStatusIs {
                status: "healthy".into(),
            }],
            rollback_steps: vec![],
            risk_level: RiskLevel::Medium,
            requires_approval: false,
            outcomes: SuccessStats::default(),
        });
        registry
    }

    pub fn register(&self, playbook: Playbook) {
        self.playbooks.insert(playbook.playbook_id.clone(), playbook);
    }

    pub fn get(&self, playbook_id: &str) -> Option<Playbook> {
        self.playbooks.get(playbook_id).map(|p| p.clone())
    }

    pub fn list(&self) -> Vec<Playbook> {
        self.playbooks.iter().map(|p| p.clone()).collect()
    }

    pub fn matching(&self, ctx: &PlanContext) -> Vec<Playbook> {
        self.playbooks
            .iter()
            .filter(|p| p.preconditions.iter().all(|pred| predicate_holds(pred, ctx)))
            .map(|p| p.clone())
            .collect()
    }

    pub fn record_outcome(&self, playbook_id: &str, success: bool) {
        if let Some(mut playbook) = self.playbooks.get_mut(playbook_id) {
            if success {
                playbook.outcomes.successes += 1;
            } else {
                playbook.outcomes.failures += 1;
            }
        }
    }
}
