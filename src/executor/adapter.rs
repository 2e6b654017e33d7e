use async_trait::async_trait;
use serde_json::Value;

use crate::planner::ActionRecord;

/// `{ok, data | error, retryable}` returned by the external action adapter
/// contract. The concrete cloud/chat/source-control adapters are out of
/// scope; this crate only depends on the trait boundary.
#[derive(Debug, Clone)]
pub enum AdapterOutcome {
    Ok(Value),
    Err { error: String, retryable: bool },
}

#[async_trait]
pub trait ExternalActionAdapter: Send + Sync {
    async fn execute(&self, action: &ActionRecord) -> AdapterOutcome;
}
