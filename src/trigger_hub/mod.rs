//! key: trigger-hub
//! Normalises advisor/log-pattern signals into `self_heal.prediction`
//! events with a uniform shape, and keeps a bounded ring buffer of recent
//! predictions for on-demand stats.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::TRIGGER_HISTORY_CAPACITY;
use crate::mesh::{safe_publish, Event, EventMesh, Handler};

/// `{code, title, likelihood, impact, suggested_playbooks, reasons,
/// source, metadata}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfHealPrediction {
    pub code: String,
    pub title: String,
    pub likelihood: f64,
    pub impact: String,
    pub suggested_playbooks: Vec<String>,
    pub reasons: Vec<String>,
    pub source: String,
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriggerStats {
    pub total: u64,
    pub counts_by_code: HashMap<String, u64>,
    pub rolling_mean_likelihood: f64,
}

pub struct TriggerHub {
    mesh: Arc<EventMesh>,
    history: Mutex<VecDeque<SelfHealPrediction>>,
    capacity: usize,
}

impl TriggerHub {
    pub fn new(mesh: Arc<EventMesh>) -> Arc<Self> {
        Self::with_capacity(mesh, *TRIGGER_HISTORY_CAPACITY)
    }

    pub fn with_capacity(mesh: Arc<EventMesh>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            mesh,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        })
    }

    /// Subscribes to every known signal source. Returns once all
    /// subscriptions are active; the hub itself is `Handler`.
    pub async fn subscribe_all(self: &Arc<Self>) {
        for pattern in [
            "proactive.*",
            "meta_loop.*",
            "immutable_log.pattern_detected",
            "immutable_log.anomaly_sequence",
            "cross_domain.alert",
        ] {
            self.mesh.subscribe(pattern, self.clone() as Arc<dyn Handler>).await;
        }
    }

    async fn ingest(&self, event: &Event) {
        let prediction = normalise(event);

        {
            let mut history = self.history.lock().await;
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(prediction.clone());
        }

        let mut payload = std::collections::BTreeMap::new();
        payload.insert("code".to_string(), serde_json::json!(prediction.code));
        payload.insert("title".to_string(), serde_json::json!(prediction.title));
        payload.insert("likelihood".to_string(), serde_json::json!(prediction.likelihood));
        payload.insert("impact".to_string(), serde_json::json!(prediction.impact));
        payload.insert(
            "suggested_playbooks".to_string(),
            serde_json::json!(prediction.suggested_playbooks),
        );
        payload.insert("reasons".to_string(), serde_json::json!(prediction.reasons));
        payload.insert("source".to_string(), serde_json::json!(prediction.source));

        safe_publish(
            &self.mesh,
            Event::new(
                "self_heal.prediction",
                "trigger_hub",
                "trigger_hub",
                &event.resource,
                "trigger_hub",
                payload,
            ),
        )
        .await;
    }

    pub async fn stats(&self) -> TriggerStats {
        let history = self.history.lock().await;
        let mut counts_by_code: HashMap<String, u64> = HashMap::new();
        let mut sum = 0.0;
        for prediction in history.iter() {
            *counts_by_code.entry(prediction.code.clone()).or_insert(0) += 1;
            sum += prediction.likelihood;
        }
        TriggerStats {
            total: history.len() as u64,
            rolling_mean_likelihood: if history.is_empty() { 0.0 } else { sum / history.len() as f64 },
            counts_by_code,
        }
    }

    pub async fn recent(&self, limit: usize) -> Vec<SelfHealPrediction> {
        let history = self.history.lock().await;
        history.iter().rev().take(limit).cloned().collect()
    }
}

#[async_trait]
impl Handler for TriggerHub {
    async fn handle(&self, event: &Event) {
        self.ingest(event).await;
    }
}

fn normalise(event: &Event) -> SelfHealPrediction {
    let likelihood = event
        .payload_value("confidence")
        .or_else(|| event.payload_value("likelihood"))
        .and_then(Value::as_f64)
        .unwrap_or(0.5);

    let impact = event
        .payload_value("impact")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let suggested_playbooks = event
        .payload_value("playbook_priorities")
        .or_else(|| event.payload_value("suggested_playbooks"))
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let reasons = event
        .payload_value("reasons")
        .or_else(|| event.payload_value("root_causes"))
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_else(|| vec![event.event_type.clone()]);

    SelfHealPrediction {
        code: event.event_type.replace('.', "_"),
        title: format!("signal from {}", event.event_type),
        likelihood,
        impact,
        suggested_playbooks,
        reasons,
        source: event.source.clone(),
        metadata: event.payload.clone().into_iter().collect(),
    }
}
