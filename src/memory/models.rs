use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Episodic,
    Semantic,
    Procedural,
    Working,
}

impl Default for MemoryType {
    fn default() -> Self {
        MemoryType::Episodic
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub max_age_hours: Option<i64>,
    pub sensitive: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// `{entry_id, memory_type, domain, content, tags, timestamp, access_count,
/// relevance_score, signature, metadata}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub entry_id: Uuid,
    pub memory_type: MemoryType,
    pub domain: String,
    pub content: Value,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub access_count: u64,
    pub relevance_score: f64,
    pub signature: String,
    pub metadata: MemoryMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(clippy::enum_variant_names)]
pub enum AccessLevel {
    Full,
    CrossDomain,
    Restricted,
    Denied,
}

#[derive(Debug, Clone)]
pub struct StoreMemoryRequest {
    pub domain: String,
    pub memory_type: MemoryType,
    pub content: Value,
    pub tags: Vec<String>,
    pub actor: String,
    pub metadata: MemoryMetadata,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRequest {
    pub domain: String,
    pub memory_type: MemoryType,
    pub query_tags: Vec<String>,
    pub query_context: HashMap<String, Value>,
    pub include_cross_domain: bool,
    pub limit: usize,
    pub requesting_trust: f64,
    pub actor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResponse {
    pub memories: Vec<MemoryEntry>,
    pub access_level: AccessLevel,
    pub filtered_count: usize,
    pub total_count: usize,
    pub explanation: String,
    pub applied_policies: Vec<String>,
    pub signature: String,
}

/// Per-`(domain, memory_type)` pattern record the Meta Coordinator reads to
/// pre-warm candidates.
#[derive(Debug, Clone, Default)]
pub struct PatternRecord {
    pub request_count: u64,
    pub total_results_returned: u64,
}

impl PatternRecord {
    pub fn average_result_count(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.total_results_returned as f64 / self.request_count as f64
        }
    }
}
