use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

/// `{name, condition, action, severity}`. Conditions are data, not code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub condition: PolicyCondition,
    pub action: PolicyAction,
    pub severity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Deny,
    Review,
}

/// `condition = {action?, keywords?, forbidden_paths?}`. Keyword matching is
/// case-insensitive over a canonical JSON of the payload; path matching is
/// substring on `resource`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyCondition {
    pub action: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub forbidden_paths: Vec<String>,
}

impl PolicyCondition {
    pub fn matches(&self, action: &str, resource: &str, payload: &Value) -> bool {
        if let Some(expected) = &self.action {
            if expected != action {
                return false;
            }
        }

        if !self.keywords.is_empty() {
            let canonical = crate::log::canonicalize(payload).to_ascii_lowercase();
            let keyword_hit = self
                .keywords
                .iter()
                .any(|kw| canonical.contains(&kw.to_ascii_lowercase()));
            if !keyword_hit {
                return false;
            }
        }

        if !self.forbidden_paths.is_empty() {
            let path_hit = self
                .forbidden_paths
                .iter()
                .any(|p| resource.contains(p.as_str()));
            if !path_hit {
                return false;
            }
        }

        self.action.is_some() || !self.keywords.is_empty() || !self.forbidden_paths.is_empty()
    }
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn list(&self) -> Vec<Policy>;
    async fn upsert(&self, policy: Policy);
    async fn remove(&self, name: &str);
}

pub struct InMemoryPolicyStore {
    policies: RwLock<Vec<Policy>>,
}

impl InMemoryPolicyStore {
    pub fn new(policies: Vec<Policy>) -> Self {
        Self {
            policies: RwLock::new(policies),
        }
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn list(&self) -> Vec<Policy> {
        self.policies.read().await.clone()
    }

    async fn upsert(&self, policy: Policy) {
        let mut policies = self.policies.write().await;
        if let Some(existing) = policies.iter_mut().find(|p| p.name == policy.name) {
            *existing = policy;
        } else {
            policies.push(policy);
        }
    }

    async fn remove(&self, name: &str) {
        self.policies.write().await.retain(|p| p.name != name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn condition_requires_at_least_one_clause_to_match() {
        let empty = PolicyCondition::default();
        assert!(!empty.matches("anything", "anywhere", &Value::Null));
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let cond = PolicyCondition {
            action: None,
            keywords: vec!["DANGEROUS".into()],
            forbidden_paths: vec![],
        };
        assert!(cond.matches("execute", "res", &json!({"command": "dangerous op"})));
    }
}
