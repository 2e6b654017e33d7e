use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::Signature;

/// Closed set of terminal/transitional results an entry may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogResult {
    Published,
    Success,
    Failed,
    Error,
    Blocked,
    Denied,
    Queued,
    Started,
    Stopped,
    Decided,
}

/// `{seq, timestamp, actor, action, resource, subsystem, payload_hash,
/// payload, result, signature, prev_seq_hash}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub subsystem: String,
    pub payload_hash: String,
    /// Canonical-form JSON text, already key-sorted (see `canonical`).
    pub payload: String,
    pub result: LogResult,
    pub signature: Signature,
    pub prev_seq_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub from_seq: Option<u64>,
    pub to_seq: Option<u64>,
    pub actor: Option<String>,
    pub action: Option<String>,
    pub subsystem: Option<String>,
    pub resource: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}
