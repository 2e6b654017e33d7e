use std::sync::Arc;

use async_trait::async_trait;

use crate::health::{Direction, HealthGraph, NodeStatus};
use crate::planner::PlaybookRegistry;

use super::models::{Advice, CycleInputs, FocusArea};

/// Capability interface: any implementation (rules, statistical model,
/// external service) satisfying `advise(focus) -> Advice` composes with
/// the Meta Coordinator.
#[async_trait]
pub trait Advisor: Send + Sync {
    fn name(&self) -> &str;
    async fn advise(&self, focus: FocusArea, inputs: &CycleInputs) -> Advice;
}

/// Frequency z-score style anomaly scorer, grounded on the original
/// `incident_predictor.py` heuristic: flags a focus area whose count is far
/// above a fixed baseline.
pub struct AnomalyScorer {
    baseline_error_count: f64,
}

impl AnomalyScorer {
    pub fn new(baseline_error_count: f64) -> Self {
        Self { baseline_error_count }
    }
}

#[async_trait]
impl Advisor for AnomalyScorer {
    fn name(&self) -> &str {
        "anomaly_scorer"
    }

    async fn advise(&self, _focus: FocusArea, inputs: &CycleInputs) -> Advice {
        let deviation = if self.baseline_error_count > 0.0 {
            (inputs.error_count as f64 - self.baseline_error_count) / self.baseline_error_count
        } else {
            inputs.error_count as f64
        };
        let confidence = deviation.clamp(0.0, 1.0);
        Advice {
            recommendations: if confidence > 0.5 {
                vec!["investigate error spike".to_string()]
            } else {
                vec![]
            },
            confidence,
            ..Advice::default()
        }
    }
}

/// Walks the Health Graph's dependency chain from degraded nodes outward,
/// grounded on `hunter.py`'s root-cause walk.
pub struct RootCauseAdvisor {
    health: Arc<HealthGraph>,
}

impl RootCauseAdvisor {
    pub fn new(health: Arc<HealthGraph>) -> Self {
        Self { health }
    }
}

#[async_trait]
impl Advisor for RootCauseAdvisor {
    fn name(&self) -> &str {
        "root_cause_advisor"
    }

    async fn advise(&self, _focus: FocusArea, _inputs: &CycleInputs) -> Advice {
        let mut root_causes = Vec::new();
        for node_id in self.health.all_node_ids() {
            if let Some(node) = self.health.get(&node_id) {
                if node.status == NodeStatus::Critical || node.status == NodeStatus::Degraded {
                    let upstream = self.health.neighbors(&node_id, Direction::Dependencies);
                    if upstream.is_empty() {
                        root_causes.push(node_id);
                    }
                }
            }
        }
        Advice {
            confidence: if root_causes.is_empty() { 0.0 } else { 0.7 },
            root_causes,
            ..Advice::default()
        }
    }
}

/// Ranks registered playbooks by historical success rate, grounded on
/// `hunter.py`'s playbook-ranking pass.
pub struct PlaybookRanker {
    registry: Arc<PlaybookRegistry>,
}

impl PlaybookRanker {
    pub fn new(registry: Arc<PlaybookRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Advisor for PlaybookRanker {
    fn name(&self) -> &str {
        "playbook_ranker"
    }

    async fn advise(&self, _focus: FocusArea, _inputs: &CycleInputs) -> Advice {
        let mut playbooks = self.registry.list();
        playbooks.sort_by(|a, b| {
            b.outcomes
                .success_rate()
                .partial_cmp(&a.outcomes.success_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let playbook_rankings = playbooks.into_iter().map(|p| p.playbook_id).collect();
        Advice {
            confidence: 0.5,
            playbook_rankings,
            ..Advice::default()
        }
    }
}
