//! key: agentic-memory-broker
//! Governed, domain-isolated retrieval and storage of episodic/semantic/
//! procedural/working memory. No domain reads storage directly; every
//! access goes through quota check, governance authorization, ranking,
//! and filtering.

mod models;
mod store;

pub use models::{
    AccessLevel, MemoryEntry, MemoryMetadata, MemoryRequest, MemoryResponse, MemoryType,
    PatternRecord, StoreMemoryRequest,
};
pub use store::{InMemoryMemoryStore, MemoryStore};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::config::{CROSS_DOMAIN_TRUST_THRESHOLD, MEMORY_QUOTA_LIMIT, MEMORY_QUOTA_WINDOW};
use crate::crypto::Signer;
use crate::governance::{ActionContext, Decision, GovernanceGate};
use crate::log::{AppendRequest, ImmutableLog, LogResult};

struct QuotaTracker {
    hits: DashMap<String, VecDeque<Instant>>,
}

impl QuotaTracker {
    fn new() -> Self {
        Self { hits: DashMap::new() }
    }

    fn check_and_record(&self, domain: &str) -> bool {
        let mut entry = self.hits.entry(domain.to_string()).or_insert_with(VecDeque::new);
        let now = Instant::now();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) > *MEMORY_QUOTA_WINDOW {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() as u64 >= *MEMORY_QUOTA_LIMIT {
            return false;
        }
        entry.push_back(now);
        true
    }
}

pub struct AgenticMemoryBroker {
    store: Arc<dyn MemoryStore>,
    governance: Arc<GovernanceGate>,
    log: Arc<ImmutableLog>,
    signer: Arc<dyn Signer>,
    quota: QuotaTracker,
    patterns: DashMap<(String, MemoryType), PatternRecord>,
}

impl AgenticMemoryBroker {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        governance: Arc<GovernanceGate>,
        log: Arc<ImmutableLog>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            store,
            governance,
            log,
            signer,
            quota: QuotaTracker::new(),
            patterns: DashMap::new(),
        }
    }

    pub async fn store_memory(&self, request: StoreMemoryRequest) -> Uuid {
        let entry_id = Uuid::new_v4();
        let signing_material = format!(
            "{}|{}|{:?}|{}",
            entry_id, request.domain, request.memory_type, request.content
        );
        let signature = self.signer.sign(signing_material.as_bytes());

        let entry = MemoryEntry {
            entry_id,
            memory_type: request.memory_type,
            domain: request.domain.clone(),
            content: request.content,
            tags: request.tags,
            timestamp: Utc::now(),
            access_count: 0,
            relevance_score: 0.0,
            signature: signature.0,
            metadata: request.metadata,
        };
        self.store.insert(entry).await;

        let _ = self
            .log
            .append(AppendRequest {
                actor: request.actor,
                action: "memory.stored".into(),
                resource: request.domain,
                subsystem: "memory".into(),
                payload: serde_json::json!({"entry_id": entry_id}),
                result: LogResult::Success,
            })
            .await;

        entry_id
    }

    pub async fn request_memory(&self, request: MemoryRequest) -> MemoryResponse {
        if !self.quota.check_and_record(&request.domain) {
            return MemoryResponse {
                memories: vec![],
                access_level: AccessLevel::Denied,
                filtered_count: 0,
                total_count: 0,
                explanation: "Rate limit exceeded".into(),
                applied_policies: vec!["memory_quota".into()],
                signature: String::new(),
            };
        }

        let governance_decision = self
            .governance
            .check(
                &request.actor,
                "memory_access",
                &request.domain,
                ActionContext {
                    risk_level: None,
                    payload: serde_json::json!({"domain": request.domain}),
                    ..ActionContext::default()
                },
            )
            .await;

        let access_level = match governance_decision.decision {
            Decision::Deny => AccessLevel::Denied,
            Decision::Review => AccessLevel::Restricted,
            Decision::Allow => {
                if request.include_cross_domain && request.requesting_trust >= *CROSS_DOMAIN_TRUST_THRESHOLD {
                    AccessLevel::CrossDomain
                } else if request.include_cross_domain {
                    AccessLevel::Restricted
                } else {
                    AccessLevel::Full
                }
            }
        };

        let response = if access_level == AccessLevel::Denied {
            MemoryResponse {
                memories: vec![],
                access_level,
                filtered_count: 0,
                total_count: 0,
                explanation: format!("governance denied: {}", governance_decision.reason),
                applied_policies: vec!["governance_denied".into()],
                signature: String::new(),
            }
        } else {
            self.retrieve(&request, access_level).await
        };

        let mut pattern = self
            .patterns
            .entry((request.domain.clone(), request.memory_type))
            .or_default();
        pattern.request_count += 1;
        pattern.total_results_returned += response.memories.len() as u64;
        drop(pattern);

        let _ = self
            .log
            .append(AppendRequest {
                actor: request.actor.clone(),
                action: "memory.access".into(),
                resource: request.domain.clone(),
                subsystem: "memory".into(),
                payload: serde_json::json!({
                    "access_level": response.access_level,
                    "returned": response.memories.len(),
                }),
                result: LogResult::Success,
            })
            .await;

        let signing_material = format!(
            "{}|{:?}|{}",
            request.domain,
            response.access_level,
            response.memories.len()
        );
        let signature = self.signer.sign(signing_material.as_bytes());

        for entry in &response.memories {
            self.store.bump_access(entry.entry_id).await;
        }

        MemoryResponse {
            signature: signature.0,
            ..response
        }
    }

    async fn retrieve(&self, request: &MemoryRequest, access_level: AccessLevel) -> MemoryResponse {
        let mut candidates = self.store.in_domain(&request.domain).await;
        if access_level == AccessLevel::CrossDomain {
            candidates.extend(self.store.outside_domain(&request.domain).await);
        }
        candidates.retain(|e| e.memory_type == request.memory_type);
        let total_count = candidates.len();

        let mut applied_policies = vec!["domain_isolation".to_string()];
        let now = Utc::now();

        let mut sensitivity_filtered = false;
        let mut age_filtered = false;

        let passed: Vec<MemoryEntry> = candidates
            .into_iter()
            .filter(|entry| {
                if access_level == AccessLevel::Restricted && entry.metadata.sensitive {
                    sensitivity_filtered = true;
                    return false;
                }
                if let Some(max_age) = entry.metadata.max_age_hours {
                    let age_hours = (now - entry.timestamp).num_hours();
                    if age_hours > max_age {
                        age_filtered = true;
                        return false;
                    }
                }
                true
            })
            .collect();

        if sensitivity_filtered {
            applied_policies.push("sensitive_content_filter".to_string());
        }
        if age_filtered {
            applied_policies.push("age_filter".to_string());
        }

        let mut scored: Vec<(f64, MemoryEntry)> = passed
            .into_iter()
            .map(|entry| (score(&entry, request, now), entry))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let filtered_count = total_count - scored.len();
        let memories: Vec<MemoryEntry> = scored
            .into_iter()
            .take(request.limit)
            .map(|(_, e)| e)
            .collect();

        MemoryResponse {
            memories,
            access_level,
            filtered_count,
            total_count,
            explanation: format!("{total_count} candidates, access_level={access_level:?}"),
            applied_policies,
            signature: String::new(),
        }
    }

    pub fn pattern_for(&self, domain: &str, memory_type: MemoryType) -> Option<PatternRecord> {
        self.patterns
            .get(&(domain.to_string(), memory_type))
            .map(|r| r.clone())
    }
}

impl Clone for PatternRecord {
    fn clone(&self) -> Self {
        Self {
            request_count: self.request_count,
            total_results_returned: self.total_results_returned,
        }
    }
}

/// `0.3*recency + 0.2*frequency + 0.3*tag_match + 0.2*context_alignment`.
fn score(entry: &MemoryEntry, request: &MemoryRequest, now: chrono::DateTime<Utc>) -> f64 {
    let age_hours = (now - entry.timestamp).num_hours().max(0) as f64;
    let recency = (1.0 - age_hours / (24.0 * 7.0)).clamp(0.0, 1.0);
    let frequency = (entry.access_count as f64 / 100.0).min(1.0);
    let tag_match = jaccard(&request.query_tags, &entry.tags);
    let context_alignment = context_alignment(&request.query_context, entry);

    0.3 * recency + 0.2 * frequency + 0.3 * tag_match + 0.2 * context_alignment
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let set_a: std::collections::HashSet<&String> = a.iter().collect();
    let set_b: std::collections::HashSet<&String> = b.iter().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn context_alignment(context: &HashMap<String, serde_json::Value>, entry: &MemoryEntry) -> f64 {
    if context.is_empty() {
        return 0.0;
    }
    let matches = context
        .iter()
        .filter(|(k, v)| entry.metadata.extra.get(*k) == Some(*v))
        .count();
    matches as f64 / context.len() as f64
}
