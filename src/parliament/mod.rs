//! key: parliament
//! Voting sessions, quorum, threshold, weighted tallies, expiry.

mod engine;
mod models;
mod store;

pub use engine::Parliament;
pub use models::{
    CastVoteRequest, CreateSessionRequest, Member, MemberType, ParliamentStatistics,
    SessionStatus, Tallies, Vote, VoteChoice, VoteOutcome, VotingSession,
};
pub use store::{InMemoryMemberStore, InMemorySessionStore, MemberStore, SessionStore};
