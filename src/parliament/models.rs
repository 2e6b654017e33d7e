use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::crypto::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Voting,
    Approved,
    Rejected,
    Expired,
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Approve,
    Reject,
    Abstain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberType {
    Human,
    Agent,
    Reflection,
}

/// `{member_id, type, role, committees, weight, active, suspended,
/// tally_counters}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub member_id: String,
    pub member_type: MemberType,
    pub role: String,
    pub committees: Vec<String>,
    pub weight: f64,
    pub active: bool,
    pub suspended: bool,
    pub tally_counters: HashMap<String, u64>,
}

/// `{session_id, member_id, vote, weight, reason, automated, confidence,
/// signature}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub session_id: Uuid,
    pub member_id: String,
    pub vote: VoteChoice,
    pub weight: f64,
    pub reason: String,
    pub automated: bool,
    pub confidence: Option<f64>,
    pub signature: Signature,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tallies {
    pub approve: u64,
    pub reject: u64,
    pub abstain: u64,
    pub weighted_approve: f64,
    pub weighted_reject: f64,
    pub weighted_abstain: f64,
}

/// `{session_id, policy_name, action_type, action_payload, actor, resource,
/// committee, quorum_required, approval_threshold, status, tallies,
/// risk_level, created_at, expires_at, decided_at, decision_reason,
/// attached_alerts}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingSession {
    pub session_id: Uuid,
    pub policy_name: String,
    pub action_type: String,
    pub action_payload: Value,
    pub actor: String,
    pub resource: String,
    pub committee: String,
    pub quorum_required: u64,
    pub approval_threshold: f64,
    /// When true, `approval_threshold` is evaluated against weighted
    /// totals rather than raw counts (committee choice at session
    /// creation, not a global setting).
    pub decide_on_weighted_totals: bool,
    pub status: SessionStatus,
    pub tallies: Tallies,
    pub risk_level: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_reason: Option<String>,
    pub attached_alerts: Vec<String>,
}

impl VotingSession {
    pub fn is_decided(&self) -> bool {
        self.decided_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub policy_name: String,
    pub action_type: String,
    pub action_payload: Value,
    pub actor: String,
    pub resource: String,
    pub committee: String,
    pub quorum_required: u64,
    pub approval_threshold: f64,
    pub decide_on_weighted_totals: bool,
    pub expires_in: chrono::Duration,
    pub attached_alerts: Vec<String>,
    pub risk_level: String,
}

#[derive(Debug, Clone)]
pub struct CastVoteRequest {
    pub session_id: Uuid,
    pub member_id: String,
    pub vote: VoteChoice,
    pub reason: String,
    pub automated: bool,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub session: VotingSession,
    pub vote_accepted: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParliamentStatistics {
    pub total_sessions: u64,
    pub approved: u64,
    pub rejected: u64,
    pub expired: u64,
    pub tied: u64,
    pub approval_rate_by_committee: HashMap<String, f64>,
    pub mean_decision_latency_secs: f64,
}
