//! key: collaborator-contracts
//! Capability traits for the external collaborators the core depends on
//! but never implements a concrete cloud/vault/chat backend for. Test
//! doubles live alongside each trait for in-process tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::{GraceError, GraceResult};
use crate::mesh::{safe_publish, Event, EventMesh};

/// `get(name) -> value`, `store(name, value, owner, ttl?)`. Used at startup
/// for signing keys and at execution time for adapter credentials.
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    async fn get(&self, name: &str) -> GraceResult<String>;
    async fn store(&self, name: &str, value: &str, owner: &str, ttl: Option<Duration>);
    async fn revoke(&self, name: &str, owner: &str);
}

struct StoredSecret {
    value: String,
    owner: String,
}

/// In-process secrets vault for tests and local runs. Revocation publishes
/// `secret.revoked` on the mesh per the collaborator contract.
pub struct InMemorySecretsProvider {
    secrets: DashMap<String, StoredSecret>,
    mesh: Arc<EventMesh>,
}

impl InMemorySecretsProvider {
    pub fn new(mesh: Arc<EventMesh>) -> Self {
        Self {
            secrets: DashMap::new(),
            mesh,
        }
    }
}

#[async_trait]
impl SecretsProvider for InMemorySecretsProvider {
    async fn get(&self, name: &str) -> GraceResult<String> {
        self.secrets
            .get(name)
            .map(|s| s.value.clone())
            .ok_or_else(|| GraceError::NotFound(format!("secret {name}")))
    }

    async fn store(&self, name: &str, value: &str, owner: &str, _ttl: Option<Duration>) {
        self.secrets.insert(
            name.to_string(),
            StoredSecret {
                value: value.to_string(),
                owner: owner.to_string(),
            },
        );
    }

    async fn revoke(&self, name: &str, owner: &str) {
        self.secrets.remove(name);
        let mut payload = std::collections::BTreeMap::new();
        payload.insert("name".to_string(), serde_json::json!(name));
        payload.insert("owner".to_string(), serde_json::json!(owner));
        safe_publish(
            &self.mesh,
            Event::new("secret.revoked", "secrets_provider", owner, name, "secrets", payload),
        )
        .await;
    }
}

/// `notify(channel, message)`, fire-and-forget.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, channel: &str, message: &str);
}

/// Test double that records every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotificationSink {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, channel: &str, message: &str) {
        self.sent.lock().await.push((channel.to_string(), message.to_string()));
    }
}

/// `publish(domain, name, value, labels)`.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish(&self, domain: &str, name: &str, value: f64, labels: HashMap<String, String>);
}

/// In-memory counting double: sums published values per `(domain, name)`,
/// used by tests asserting a metric fired at least once.
#[derive(Default)]
pub struct CountingMetricsSink {
    totals: DashMap<(String, String), f64>,
    counts: DashMap<(String, String), u64>,
}

impl CountingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self, domain: &str, name: &str) -> f64 {
        self.totals.get(&(domain.to_string(), name.to_string())).map(|v| *v).unwrap_or(0.0)
    }

    pub fn count(&self, domain: &str, name: &str) -> u64 {
        self.counts.get(&(domain.to_string(), name.to_string())).map(|v| *v).unwrap_or(0)
    }
}

#[async_trait]
impl MetricsSink for CountingMetricsSink {
    async fn publish(&self, domain: &str, name: &str, value: f64, _labels: HashMap<String, String>) {
        let key = (domain.to_string(), name.to_string());
        *self.totals.entry(key.clone()).or_insert(0.0) += value;
        *self.counts.entry(key).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn secrets_round_trip_then_revoke() {
        let mesh = EventMesh::spawn(None);
        let secrets = InMemorySecretsProvider::new(mesh);
        secrets.store("signing-key", "abc123", "log_writer", None).await;
        assert_eq!(secrets.get("signing-key").await.unwrap(), "abc123");
        secrets.revoke("signing-key", "log_writer").await;
        assert!(secrets.get("signing-key").await.is_err());
    }

    #[tokio::test]
    async fn notification_sink_records_messages() {
        let sink = RecordingNotificationSink::new();
        sink.notify("ops", "playbook completed").await;
        assert_eq!(sink.sent().await, vec![("ops".to_string(), "playbook completed".to_string())]);
    }

    #[tokio::test]
    async fn metrics_sink_accumulates() {
        let sink = CountingMetricsSink::new();
        sink.publish("executor", "plan_duration_ms", 120.0, HashMap::new()).await;
        sink.publish("executor", "plan_duration_ms", 80.0, HashMap::new()).await;
        assert_eq!(sink.count("executor", "plan_duration_ms"), 2);
        assert_eq!(sink.total("executor", "plan_duration_ms"), 200.0);
    }
}
