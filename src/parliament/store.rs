use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{Member, Vote, VotingSession};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: VotingSession);
    async fn get(&self, session_id: Uuid) -> Option<VotingSession>;
    async fn update(&self, session: VotingSession);
    async fn list(&self) -> Vec<VotingSession>;
    async fn insert_vote(&self, vote: Vote) -> bool;
    async fn votes_for(&self, session_id: Uuid) -> Vec<Vote>;
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn list(&self) -> Vec<Member>;
    async fn get(&self, member_id: &str) -> Option<Member>;
    async fn upsert(&self, member: Member);
    async fn bump_tally(&self, member_id: &str, counter: &str);
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, VotingSession>>,
    votes: RwLock<HashMap<Uuid, Vec<Vote>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: VotingSession) {
        self.sessions.write().await.insert(session.session_id, session);
    }

    async fn get(&self, session_id: Uuid) -> Option<VotingSession> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    async fn update(&self, session: VotingSession) {
        self.sessions.write().await.insert(session.session_id, session);
    }

    async fn list(&self) -> Vec<VotingSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Returns `false` (unique-constraint violation) if `member_id` already
    /// voted in `session_id`.
    async fn insert_vote(&self, vote: Vote) -> bool {
        let mut votes = self.votes.write().await;
        let entry = votes.entry(vote.session_id).or_default();
        if entry.iter().any(|v| v.member_id == vote.member_id) {
            return false;
        }
        entry.push(vote);
        true
    }

    async fn votes_for(&self, session_id: Uuid) -> Vec<Vote> {
        self.votes.read().await.get(&session_id).cloned().unwrap_or_default()
    }
}

#[derive(Default)]
pub struct InMemoryMemberStore {
    members: RwLock<HashMap<String, Member>>,
}

impl InMemoryMemberStore {
    pub fn new(members: Vec<Member>) -> Self {
        Self {
            members: RwLock::new(members.into_iter().map(|m| (m.member_id.clone(), m)).collect()),
        }
    }
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn list(&self) -> Vec<Member> {
        self.members.read().await.values().cloned().collect()
    }

    async fn get(&self, member_id: &str) -> Option<Member> {
        self.members.read().await.get(member_id).cloned()
    }

    async fn upsert(&self, member: Member) {
        self.members.write().await.insert(member.member_id.clone(), member);
    }

    async fn bump_tally(&self, member_id: &str, counter: &str) {
        let mut members = self.members.write().await;
        if let Some(member) = members.get_mut(member_id) {
            *member.tally_counters.entry(counter.to_string()).or_insert(0) += 1;
        }
    }
}
