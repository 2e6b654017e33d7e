use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::crypto::Signer;
use crate::error::{GraceError, GraceResult};
use crate::log::{AppendRequest, ImmutableLog, LogResult};

use super::models::{
    CastVoteRequest, CreateSessionRequest, Member, ParliamentStatistics, SessionStatus, Tallies,
    Vote, VoteOutcome, VotingSession,
};
use super::store::{MemberStore, SessionStore};

/// key: parliament-voting
/// Multi-voter decision with quorum and threshold.
pub struct Parliament {
    sessions: Arc<dyn SessionStore>,
    members: Arc<dyn MemberStore>,
    log: Arc<ImmutableLog>,
    signer: Arc<dyn Signer>,
}

impl Parliament {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        members: Arc<dyn MemberStore>,
        log: Arc<ImmutableLog>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            sessions,
            members,
            log,
            signer,
        }
    }

    pub async fn create_session(&self, request: CreateSessionRequest) -> VotingSession {
        let now = Utc::now();
        let session = VotingSession {
            session_id: Uuid::new_v4(),
            policy_name: request.policy_name,
            action_type: request.action_type,
            action_payload: request.action_payload,
            actor: request.actor,
            resource: request.resource,
            committee: request.committee,
            quorum_required: request.quorum_required,
            approval_threshold: request.approval_threshold,
            decide_on_weighted_totals: request.decide_on_weighted_totals,
            status: SessionStatus::Voting,
            tallies: Tallies::default(),
            risk_level: request.risk_level,
            created_at: now,
            expires_at: now + request.expires_in,
            decided_at: None,
            decision_reason: None,
            attached_alerts: request.attached_alerts,
        };
        self.sessions.insert(session.clone()).await;

        let _ = self
            .log
            .append(AppendRequest {
                actor: session.actor.clone(),
                action: "parliament.session_created".into(),
                resource: session.resource.clone(),
                subsystem: "parliament".into(),
                payload: serde_json::json!({"session_id": session.session_id}),
                result: LogResult::Started,
            })
            .await;

        session
    }

    /// Casts a vote and returns the (possibly just-decided) session.
    /// Rejects with `Conflict` if the member already voted, or if the
    /// session is already decided.
    pub async fn cast_vote(&self, request: CastVoteRequest) -> GraceResult<VoteOutcome> {
        let mut session = self
            .sessions
            .get(request.session_id)
            .await
            .ok_or_else(|| GraceError::NotFound(format!("session {}", request.session_id)))?;

        if let Some(expired) = self.expire_if_due(&mut session).await {
            self.sessions.update(session.clone()).await;
            return Err(GraceError::Conflict(expired));
        }

        if session.is_decided() {
            return Err(GraceError::Conflict("SessionClosed".into()));
        }

        let member = self
            .members
            .get(&request.member_id)
            .await
            .ok_or_else(|| GraceError::NotFound(format!("member {}", request.member_id)))?;

        if !member.active || member.suspended {
            return Err(GraceError::Unauthorized(format!(
                "member {} is not active",
                member.member_id
            )));
        }

        let signing_material = format!(
            "{}|{}|{:?}|{}",
            session.session_id, member.member_id, request.vote, request.reason
        );
        let signature = self.signer.sign(signing_material.as_bytes());

        let vote = Vote {
            session_id: session.session_id,
            member_id: member.member_id.clone(),
            vote: request.vote,
            weight: member.weight,
            reason: request.reason,
            automated: request.automated,
            confidence: request.confidence,
            signature,
            created_at: Utc::now(),
        };

        let accepted = self.sessions.insert_vote(vote.clone()).await;
        if !accepted {
            return Err(GraceError::Conflict(format!(
                "member {} already voted in session {}",
                member.member_id, session.session_id
            )));
        }
        self.members.bump_tally(&member.member_id, "votes_cast").await;

        let votes = self.sessions.votes_for(session.session_id).await;
        session.tallies = tally(&votes);

        self.apply_decision_rule(&mut session);
        self.sessions.update(session.clone()).await;

        if session.is_decided() {
            let _ = self
                .log
                .append(AppendRequest {
                    actor: session.actor.clone(),
                    action: "parliament.decided".into(),
                    resource: session.resource.clone(),
                    subsystem: "parliament".into(),
                    payload: serde_json::json!({
                        "session_id": session.session_id,
                        "status": session.status,
                        "reason": session.decision_reason,
                    }),
                    result: LogResult::Decided,
                })
                .await;
        }

        Ok(VoteOutcome {
            session,
            vote_accepted: true,
        })
    }

    pub async fn get_session(&self, session_id: Uuid) -> Option<VotingSession> {
        let mut session = self.sessions.get(session_id).await?;
        if self.expire_if_due(&mut session).await.is_some() {
            self.sessions.update(session.clone()).await;
        }
        Some(session)
    }

    pub async fn list_sessions(&self) -> Vec<VotingSession> {
        let mut sessions = self.sessions.list().await;
        for session in sessions.iter_mut() {
            if self.expire_if_due(session).await.is_some() {
                self.sessions.update(session.clone()).await;
            }
        }
        sessions
    }

    pub async fn list_members(&self) -> Vec<Member> {
        self.members.list().await
    }

    pub async fn get_statistics(&self) -> ParliamentStatistics {
        let sessions = self.sessions.list().await;
        let mut stats = ParliamentStatistics::default();
        let mut committee_totals: std::collections::HashMap<String, (u64, u64)> =
            std::collections::HashMap::new();
        let mut latencies = Vec::new();

        for session in &sessions {
            stats.total_sessions += 1;
            match session.status {
                SessionStatus::Approved => stats.approved += 1,
                SessionStatus::Rejected => stats.rejected += 1,
                SessionStatus::Expired => stats.expired += 1,
                SessionStatus::Tie => stats.tied += 1,
                _ => {}
            }
            let entry = committee_totals.entry(session.committee.clone()).or_insert((0, 0));
            if matches!(session.status, SessionStatus::Approved | SessionStatus::Rejected) {
                entry.1 += 1;
                if session.status == SessionStatus::Approved {
                    entry.0 += 1;
                }
            }
            if let Some(decided_at) = session.decided_at {
                latencies.push((decided_at - session.created_at).num_milliseconds() as f64 / 1000.0);
            }
        }

        stats.approval_rate_by_committee = committee_totals
            .into_iter()
            .map(|(committee, (approved, total))| {
                let rate = if total == 0 { 0.0 } else { approved as f64 / total as f64 };
                (committee, rate)
            })
            .collect();

        stats.mean_decision_latency_secs = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };

        stats
    }

    /// Any operation on a voting session whose `now > expires_at`
    /// terminally transitions it to `expired`. Returns `Some(reason)` when
    /// the session was (already, or just now) closed by expiry.
    async fn expire_if_due(&self, session: &mut VotingSession) -> Option<String> {
        if session.is_decided() {
            return if session.status == SessionStatus::Expired {
                Some("SessionClosed".into())
            } else {
                None
            };
        }
        if Utc::now() > session.expires_at {
            session.status = SessionStatus::Expired;
            session.decided_at = Some(Utc::now());
            session.decision_reason = Some("Session expired without reaching quorum".into());
            return Some("SessionClosed".into());
        }
        None
    }

    /// `A, R, X` approve/reject/abstain counts, `T = A+R+X`, `D = A+R`.
    fn apply_decision_rule(&self, session: &mut VotingSession) {
        if session.is_decided() {
            return;
        }

        let now = Utc::now();
        if now > session.expires_at {
            session.status = SessionStatus::Expired;
            session.decided_at = Some(now);
            session.decision_reason = Some("Session expired without reaching quorum".into());
            return;
        }

        let t = session.tallies.approve + session.tallies.reject + session.tallies.abstain;
        let d = session.tallies.approve + session.tallies.reject;

        if t < session.quorum_required {
            return;
        }

        if d == 0 {
            session.status = SessionStatus::Tie;
            session.decided_at = Some(now);
            session.decision_reason = Some("No decisive votes cast before quorum".into());
            return;
        }

        let approval_ratio = if session.decide_on_weighted_totals {
            let weighted_decisive = session.tallies.weighted_approve + session.tallies.weighted_reject;
            if weighted_decisive == 0.0 {
                0.0
            } else {
                session.tallies.weighted_approve / weighted_decisive
            }
        } else {
            session.tallies.approve as f64 / d as f64
        };

        if approval_ratio >= session.approval_threshold {
            session.status = SessionStatus::Approved;
            session.decision_reason = Some(format!("approval ratio {approval_ratio:.2} met threshold"));
        } else {
            session.status = SessionStatus::Rejected;
            session.decision_reason = Some(format!("approval ratio {approval_ratio:.2} below threshold"));
        }
        session.decided_at = Some(now);
    }
}

fn tally(votes: &[Vote]) -> Tallies {
    let mut tallies = Tallies::default();
    for vote in votes {
        match vote.vote {
            super::models::VoteChoice::Approve => {
                tallies.approve += 1;
                tallies.weighted_approve += vote.weight;
            }
            super::models::VoteChoice::Reject => {
                tallies.reject += 1;
                tallies.weighted_reject += vote.weight;
            }
            super::models::VoteChoice::Abstain => {
                tallies.abstain += 1;
                tallies.weighted_abstain += vote.weight;
            }
        }
    }
    tallies
}
