//! key: meta-coordinator
//! Supervisory cycle loop: picks a focus area, adjusts the guardrail,
//! fans out to advisors under a deadline, and publishes a directive.

mod advisors;
mod models;

pub use advisors::{AnomalyScorer, Advisor, PlaybookRanker, RootCauseAdvisor};
pub use models::{Advice, CycleFocus, CycleInputs, FocusArea};

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::warn;

use crate::config::ADVISOR_DEADLINE;
use crate::crypto::Signer;
use crate::enrichment::Guardrail;
use crate::error::GraceResult;
use crate::log::{AppendRequest, ImmutableLog, LogResult};
use crate::mesh::{Event, EventMesh};

const ERROR_SPIKE_THRESHOLD: u64 = 5;
const LATENCY_DRIFT_THRESHOLD: f64 = 0.2;
const CAPACITY_STRAIN_THRESHOLD: f64 = 0.2;
const OUTCOME_HISTORY_LEN: usize = 10;
const TIGHTEN_BELOW: f64 = 0.5;
const LOOSEN_ABOVE: f64 = 0.85;

pub struct MetaCoordinator {
    log: Arc<ImmutableLog>,
    mesh: Arc<EventMesh>,
    signer: Arc<dyn Signer>,
    advisors: Vec<Arc<dyn Advisor>>,
    cycle_counter: AtomicU64,
    outcome_history: Mutex<VecDeque<bool>>,
}

impl MetaCoordinator {
    pub fn new(
        log: Arc<ImmutableLog>,
        mesh: Arc<EventMesh>,
        signer: Arc<dyn Signer>,
        advisors: Vec<Arc<dyn Advisor>>,
    ) -> Self {
        Self {
            log,
            mesh,
            signer,
            advisors,
            cycle_counter: AtomicU64::new(0),
            outcome_history: Mutex::new(VecDeque::with_capacity(OUTCOME_HISTORY_LEN)),
        }
    }

    /// Feeds a terminal plan outcome into the rolling window that decides
    /// the next cycle's guardrail.
    pub async fn record_outcome(&self, success: bool) {
        let mut history = self.outcome_history.lock().await;
        if history.len() == OUTCOME_HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(success);
    }

    async fn recent_success_rate(&self) -> f64 {
        let history = self.outcome_history.lock().await;
        if history.is_empty() {
            return 1.0;
        }
        history.iter().filter(|s| **s).count() as f64 / history.len() as f64
    }

    pub async fn run_cycle(&self, inputs: CycleInputs) -> GraceResult<CycleFocus> {
        let cycle_id = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let (focus_area, reasoning) = choose_focus(&inputs);
        let success_rate = self.recent_success_rate().await;
        let guardrail = if success_rate < TIGHTEN_BELOW {
            Guardrail::Tighten
        } else if success_rate > LOOSEN_ABOVE {
            Guardrail::Loosen
        } else {
            Guardrail::Maintain
        };

        let advice = self.consult_advisors(focus_area, &inputs).await;
        let (recommendations, root_causes, playbook_priorities, confidence) = aggregate(&advice);

        let cycle = CycleFocus {
            cycle_id,
            focus_area,
            reasoning,
            confidence,
            guardrail,
            extra_probes: recommendations,
            playbook_priorities,
            time_budget_secs: crate::config::META_CYCLE_PERIOD.as_secs(),
        };

        let signing_material = format!("{}|{:?}|{:?}", cycle.cycle_id, cycle.focus_area, cycle.guardrail);
        let signature = self.signer.sign(signing_material.as_bytes());

        let mut payload = std::collections::BTreeMap::new();
        payload.insert(
            "focus_area".to_string(),
            serde_json::to_value(cycle.focus_area).unwrap_or_default(),
        );
        payload.insert(
            "guardrail".to_string(),
            serde_json::json!(format!("{:?}", cycle.guardrail)),
        );
        payload.insert(
            "playbook_priorities".to_string(),
            serde_json::to_value(&cycle.playbook_priorities).unwrap_or_default(),
        );
        payload.insert("root_causes".to_string(), serde_json::to_value(&root_causes).unwrap_or_default());
        payload.insert("signature".to_string(), serde_json::json!(signature.0));

        crate::mesh::safe_publish(
            &self.mesh,
            Event::new("meta_loop.directive", "meta_coordinator", "meta_coordinator", "mesh", "meta", payload),
        )
        .await;

        self.log
            .append(AppendRequest {
                actor: "meta_coordinator".into(),
                action: "cycle_focus_decided".into(),
                resource: "mesh".into(),
                subsystem: "meta".into(),
                payload: serde_json::json!({
                    "cycle_id": cycle.cycle_id,
                    "focus_area": cycle.focus_area,
                    "guardrail": format!("{:?}", cycle.guardrail),
                    "reasoning": cycle.reasoning,
                }),
                result: LogResult::Decided,
            })
            .await?;

        Ok(cycle)
    }

    async fn consult_advisors(&self, focus: FocusArea, inputs: &CycleInputs) -> Vec<Advice> {
        let mut results = Vec::new();
        for advisor in &self.advisors {
            match timeout(*ADVISOR_DEADLINE, advisor.advise(focus, inputs)).await {
                Ok(advice) => results.push(advice),
                Err(_) => warn!(advisor = advisor.name(), "advisor missed its deadline, ignoring"),
            }
        }
        results
    }
}

fn choose_focus(inputs: &CycleInputs) -> (FocusArea, String) {
    if inputs.error_count > ERROR_SPIKE_THRESHOLD {
        return (
            FocusArea::ErrorSpike,
            format!("error_count {} exceeds threshold {}", inputs.error_count, ERROR_SPIKE_THRESHOLD),
        );
    }
    if inputs.trust_violation_count > 0 {
        return (
            FocusArea::TrustViolations,
            format!("{} trust violations observed", inputs.trust_violation_count),
        );
    }
    if inputs.latency_drift > LATENCY_DRIFT_THRESHOLD {
        return (
            FocusArea::LatencyDrift,
            format!("latency drift {:.2} exceeds threshold", inputs.latency_drift),
        );
    }
    if inputs.capacity_strain > CAPACITY_STRAIN_THRESHOLD {
        return (
            FocusArea::CapacityStrain,
            format!("capacity strain {:.2} exceeds threshold", inputs.capacity_strain),
        );
    }
    if inputs.degraded_dependency_count > 0 {
        return (
            FocusArea::DependencyHealth,
            format!("{} degraded dependencies", inputs.degraded_dependency_count),
        );
    }
    (FocusArea::Routine, "no anomalies observed".to_string())
}

fn aggregate(advice: &[Advice]) -> (Vec<String>, Vec<String>, Vec<String>, f64) {
    let mut recommendations = ordered_union(advice.iter().map(|a| a.recommendations.clone()));
    let root_causes = ordered_union(advice.iter().map(|a| a.root_causes.clone()));
    let playbook_priorities = ordered_union(advice.iter().map(|a| a.playbook_rankings.clone()));
    recommendations.sort();

    let confidence = if advice.is_empty() {
        0.0
    } else {
        advice.iter().map(|a| a.confidence).sum::<f64>() / advice.len() as f64
    };

    (recommendations, root_causes, playbook_priorities, confidence)
}

fn ordered_union(lists: impl Iterator<Item = Vec<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for list in lists {
        for item in list {
            if seen.insert(item.clone()) {
                out.push(item);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signer;
    use crate::log::InMemoryLogStore;

    fn coordinator() -> MetaCoordinator {
        let log = Arc::new(ImmutableLog::new(
            Arc::new(InMemoryLogStore::new()),
            Arc::new(Ed25519Signer::generate("meta-log")),
        ));
        MetaCoordinator::new(log, EventMesh::spawn(None), Arc::new(Ed25519Signer::generate("meta")), vec![])
    }

    #[tokio::test]
    async fn error_spike_outranks_everything() {
        let coordinator = coordinator();
        let cycle = coordinator
            .run_cycle(CycleInputs {
                error_count: 10,
                trust_violation_count: 1,
                latency_drift: 0.9,
                ..CycleInputs::default()
            })
            .await
            .unwrap();
        assert_eq!(cycle.focus_area, FocusArea::ErrorSpike);
    }

    #[tokio::test]
    async fn cycle_sequence_matches_seed_scenario() {
        let coordinator = coordinator();
        let c1 = coordinator
            .run_cycle(CycleInputs {
                error_count: 10,
                ..CycleInputs::default()
            })
            .await
            .unwrap();
        let c2 = coordinator
            .run_cycle(CycleInputs {
                latency_drift: 0.5,
                ..CycleInputs::default()
            })
            .await
            .unwrap();
        let c3 = coordinator.run_cycle(CycleInputs::default()).await.unwrap();

        assert_eq!(c1.focus_area, FocusArea::ErrorSpike);
        assert_eq!(c2.focus_area, FocusArea::LatencyDrift);
        assert_eq!(c3.focus_area, FocusArea::Routine);
        assert!(c1.cycle_id < c2.cycle_id && c2.cycle_id < c3.cycle_id);
    }

    #[tokio::test]
    async fn guardrail_tightens_after_poor_outcomes() {
        let coordinator = coordinator();
        for _ in 0..8 {
            coordinator.record_outcome(false).await;
        }
        let cycle = coordinator.run_cycle(CycleInputs::default()).await.unwrap();
        assert_eq!(cycle.guardrail, Guardrail::Tighten);
    }
}
