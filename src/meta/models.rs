use serde::{Deserialize, Serialize};

use crate::enrichment::Guardrail;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusArea {
    ErrorSpike,
    TrustViolations,
    LatencyDrift,
    CapacityStrain,
    DependencyHealth,
    Routine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleFocus {
    pub cycle_id: u64,
    pub focus_area: FocusArea,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(skip, default = "default_guardrail")]
    pub guardrail: Guardrail,
    pub extra_probes: Vec<String>,
    pub playbook_priorities: Vec<String>,
    pub time_budget_secs: u64,
}

fn default_guardrail() -> Guardrail {
    Guardrail::Maintain
}

/// Pre-aggregated signal the coordinator reasons over each cycle; computed
/// from the last `T` minutes of the Immutable Log plus the Health Graph.
#[derive(Debug, Clone, Default)]
pub struct CycleInputs {
    pub error_count: u64,
    pub blocked_count: u64,
    pub trust_violation_count: u64,
    pub latency_drift: f64,
    pub capacity_strain: f64,
    pub degraded_dependency_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Advice {
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub root_causes: Vec<String>,
    pub playbook_rankings: Vec<String>,
}
