use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_type: String,
    pub target: String,
    pub parameters: Value,
}

/// Closed predicate set evaluated against a `PlanContext`. Data, never code,
/// matching the Governance policy-condition pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Predicate {
    EventTypePrefix { prefix: String },
    KpiAbove { kpi: String, threshold: f64 },
    KpiBelow { kpi: String, threshold: f64 },
    NodeStatusIs { status: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_score(self) -> f64 {
        match self {
            RiskLevel::Low => 0.2,
            RiskLevel::Medium => 0.4,
            RiskLevel::High => 0.7,
            RiskLevel::Critical => 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub playbook_id: String,
    pub name: String,
    pub preconditions: Vec<Predicate>,
    pub steps: Vec<ActionRecord>,
    pub verifications: Vec<Predicate>,
    pub rollback_steps: Vec<ActionRecord>,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    #[serde(skip)]
    pub outcomes: SuccessStats,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SuccessStats {
    pub successes: u64,
    pub failures: u64,
}

impl SuccessStats {
    /// Beta(1,1)-smoothed success rate.
    pub fn success_rate(self) -> f64 {
        let alpha = 1.0;
        let beta = 1.0;
        (self.successes as f64 + alpha) / (self.successes as f64 + self.failures as f64 + alpha + beta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Proposed,
    Approved,
    Executing,
    Completed,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub result: String,
    pub duration_ms: u64,
    pub verification_passed: bool,
    pub trust_decision: String,
    pub rationale: String,
    pub learned_insights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub plan_id: Uuid,
    pub playbook: Playbook,
    pub target_nodes: Vec<String>,
    pub parameters: Value,
    pub risk_score: f64,
    pub justification: String,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<PlanOutcome>,
    pub parliament_session_id: Option<String>,
}
