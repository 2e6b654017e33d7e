//! End-to-end coverage of the seed scenarios: auto-remediation, the review
//! escalation path, quorum expiry, memory domain isolation, ledger tamper
//! detection, and meta-coordinator signal propagation into the trigger hub.
//! Each test wires the real components together rather than mocking across
//! a component boundary.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;

use grace_core::crypto::Ed25519Signer;
use grace_core::enrichment::{Enrichment, EnrichmentOutcome, Guardrail};
use grace_core::executor::{AdapterOutcome, ExternalActionAdapter, LockTable, PlaybookExecutor};
use grace_core::governance::{ActionContext, Decision, GovernanceGate, InMemoryPolicyStore};
use grace_core::health::{HealthGraph, HealthNode, NodeStatus};
use grace_core::log::{ImmutableLog, InMemoryLogStore, LogEntry, LogFilter, LogStore};
use grace_core::memory::{
    AgenticMemoryBroker, AccessLevel, InMemoryMemoryStore, MemoryMetadata, MemoryRequest,
    MemoryType, StoreMemoryRequest,
};
use grace_core::mesh::{Event, EventMesh};
use grace_core::parliament::{
    CastVoteRequest, InMemoryMemberStore, InMemorySessionStore, Member, MemberType, Parliament,
    SessionStatus, VoteChoice,
};
use grace_core::planner::{PlanStatus, Planner, PlaybookRegistry};
use grace_core::trigger_hub::TriggerHub;

struct AlwaysOkAdapter;

#[async_trait]
impl ExternalActionAdapter for AlwaysOkAdapter {
    async fn execute(&self, _action: &grace_core::planner::ActionRecord) -> AdapterOutcome {
        AdapterOutcome::Ok(serde_json::Value::Null)
    }
}

struct Stack {
    log: Arc<ImmutableLog>,
    parliament: Arc<Parliament>,
    governance: Arc<GovernanceGate>,
    health: Arc<HealthGraph>,
    memory: Arc<AgenticMemoryBroker>,
    enrichment: Enrichment,
    planner: Planner,
    executor: PlaybookExecutor,
    mesh: Arc<EventMesh>,
}

fn build_stack(members: Vec<Member>) -> Stack {
    let log = Arc::new(ImmutableLog::new(
        Arc::new(InMemoryLogStore::new()),
        Arc::new(Ed25519Signer::generate("seed-log")),
    ));
    let parliament = Arc::new(Parliament::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryMemberStore::new(members)),
        log.clone(),
        Arc::new(Ed25519Signer::generate("seed-parliament")),
    ));
    let governance = Arc::new(GovernanceGate::new(
        Arc::new(InMemoryPolicyStore::new(vec![])),
        log.clone(),
        parliament.clone(),
    ));
    let health = Arc::new(HealthGraph::new());
    let mesh = EventMesh::spawn(None);
    let memory = Arc::new(AgenticMemoryBroker::new(
        Arc::new(InMemoryMemoryStore::new()),
        governance.clone(),
        log.clone(),
        Arc::new(Ed25519Signer::generate("seed-memory")),
    ));
    let enrichment = Enrichment::new(health.clone(), memory.clone());
    let planner = Planner::new(
        Arc::new(PlaybookRegistry::with_defaults()),
        governance.clone(),
        mesh.clone(),
        log.clone(),
    );
    let executor = PlaybookExecutor::new(
        Arc::new(AlwaysOkAdapter),
        log.clone(),
        mesh.clone(),
        Arc::new(Ed25519Signer::generate("seed-executor")),
        Arc::new(LockTable::new()),
        health.clone(),
    );
    Stack {
        log,
        parliament,
        governance,
        health,
        memory,
        enrichment,
        planner,
        executor,
        mesh,
    }
}

fn member(id: &str, weight: f64) -> Member {
    Member {
        member_id: id.into(),
        member_type: MemberType::Human,
        role: "reviewer".into(),
        committees: vec!["operations".into()],
        weight,
        active: true,
        suspended: false,
        tally_counters: std::collections::HashMap::new(),
    }
}

#[tokio::test]
async fn auto_remediation_scales_up_without_human_review() {
    let stack = build_stack(vec![]);

    stack.health.register_node(HealthNode::new("svc-a", "service", "Service A", 2));
    stack
        .health
        .update_health(
            "svc-a",
            NodeStatus::Degraded,
            std::collections::HashMap::from([("cpu_utilization".to_string(), 100.0)]),
        )
        .unwrap();

    let event = Event::new(
        "health.degraded",
        "monitor",
        "monitor",
        "svc-a",
        "health",
        BTreeMap::from([("cpu_utilization".to_string(), serde_json::json!(95.0))]),
    );

    let enriched = match stack.enrichment.enrich(event, Guardrail::Maintain).await {
        EnrichmentOutcome::Enriched(e) => e,
        EnrichmentOutcome::DroppedLowConfidence { confidence, .. } => {
            panic!("expected the event to clear the confidence floor, got {confidence}")
        }
    };

    let blast_radius = stack.health.blast_radius("svc-a");
    let plan = stack
        .planner
        .plan(&enriched, Guardrail::Maintain, blast_radius)
        .await
        .unwrap();

    assert_eq!(plan.playbook.playbook_id, "scale_up_on_cpu_pressure");
    assert_eq!(plan.status, PlanStatus::Approved);
    assert!(plan.parliament_session_id.is_none());

    // By the time the executor verifies the outcome, the monitor has
    // observed the scale-up clearing the CPU pressure.
    stack
        .health
        .update_health(
            "svc-a",
            NodeStatus::Healthy,
            std::collections::HashMap::from([("cpu_utilization".to_string(), -60.0)]),
        )
        .unwrap();

    let executed = stack.executor.execute(plan).await.unwrap();
    assert_eq!(executed.status, PlanStatus::Completed);
    assert!(executed.outcome.unwrap().verification_passed);
}

#[tokio::test]
async fn high_risk_plan_escalates_to_parliament_then_executes_on_approval() {
    let stack = build_stack(vec![member("m1", 1.0), member("m2", 1.0), member("m3", 1.0)]);

    stack.health.register_node(HealthNode::new("svc-core", "service", "Core", 9));
    stack
        .health
        .update_health(
            "svc-core",
            NodeStatus::Critical,
            std::collections::HashMap::from([("cpu_utilization".to_string(), 150.0)]),
        )
        .unwrap();

    let event = Event::new(
        "incident.critical_failure",
        "monitor",
        "monitor",
        "svc-core",
        "health",
        BTreeMap::from([("cpu_utilization".to_string(), serde_json::json!(95.0))]),
    );

    let enriched = match stack.enrichment.enrich(event, Guardrail::Maintain).await {
        EnrichmentOutcome::Enriched(e) => e,
        EnrichmentOutcome::DroppedLowConfidence { confidence, .. } => {
            panic!("expected high kpi deviation to clear confidence floor, got {confidence}")
        }
    };

    // A blast radius of 10 combined with the node's critical status and high
    // base weight pushes the composite risk score past the review threshold.
    let plan = stack.planner.plan(&enriched, Guardrail::Maintain, 10).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Proposed);
    let session_id = plan
        .parliament_session_id
        .clone()
        .expect("high risk plan must open a parliament session")
        .parse()
        .unwrap();

    for (member_id, vote) in [
        ("m1", VoteChoice::Approve),
        ("m2", VoteChoice::Approve),
        ("m3", VoteChoice::Approve),
    ] {
        stack
            .parliament
            .cast_vote(CastVoteRequest {
                session_id,
                member_id: member_id.into(),
                vote,
                reason: "looks safe".into(),
                automated: false,
                confidence: None,
            })
            .await
            .unwrap();
    }

    let session = stack.parliament.get_session(session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Approved);

    // Parliament approval authorizes the plan; the orchestrator re-drives it
    // to `approved` before handing it to the executor.
    let mut approved_plan = plan;
    approved_plan.status = PlanStatus::Approved;

    // By the time the executor verifies the outcome, the monitor has
    // observed the scale-up clearing the CPU pressure.
    stack
        .health
        .update_health(
            "svc-core",
            NodeStatus::Healthy,
            std::collections::HashMap::from([("cpu_utilization".to_string(), -100.0)]),
        )
        .unwrap();

    let executed = stack.executor.execute(approved_plan).await.unwrap();
    assert_eq!(executed.status, PlanStatus::Completed);
}

#[tokio::test]
async fn review_session_expires_without_quorum() {
    let stack = build_stack(vec![member("m1", 1.0)]);

    let decision = stack
        .governance
        .check(
            "planner",
            "execute_playbook",
            "svc-a",
            ActionContext {
                risk_level: Some("high".into()),
                payload: serde_json::Value::Null,
                committee: "operations".into(),
                quorum_required: 3,
                approval_threshold: 0.5,
                decide_on_weighted_totals: false,
                expires_in: ChronoDuration::milliseconds(50),
            },
        )
        .await;

    assert_eq!(decision.decision, Decision::Review);
    let session_id = decision.parliament_session_id.unwrap().parse().unwrap();

    stack
        .parliament
        .cast_vote(CastVoteRequest {
            session_id,
            member_id: "m1".into(),
            vote: VoteChoice::Approve,
            reason: "partial quorum".into(),
            automated: false,
            confidence: None,
        })
        .await
        .unwrap();

    tokio::time::sleep(StdDuration::from_millis(100)).await;

    let session = stack.parliament.get_session(session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Expired);
}

#[tokio::test]
async fn memory_broker_isolates_domains_and_filters_sensitive_entries_cross_domain() {
    let stack = build_stack(vec![]);

    stack
        .memory
        .store_memory(StoreMemoryRequest {
            domain: "billing".into(),
            memory_type: MemoryType::Episodic,
            content: serde_json::json!({"note": "invoice spike"}),
            tags: vec!["spike".into()],
            actor: "billing-agent".into(),
            metadata: MemoryMetadata {
                sensitive: true,
                ..Default::default()
            },
        })
        .await;

    let own_domain = stack
        .memory
        .request_memory(MemoryRequest {
            domain: "billing".into(),
            memory_type: MemoryType::Episodic,
            query_tags: vec!["spike".into()],
            query_context: Default::default(),
            include_cross_domain: false,
            limit: 10,
            requesting_trust: 1.0,
            actor: "billing-agent".into(),
        })
        .await;
    assert_eq!(own_domain.access_level, AccessLevel::Full);
    assert_eq!(own_domain.memories.len(), 1);

    let cross_domain_low_trust = stack
        .memory
        .request_memory(MemoryRequest {
            domain: "support".into(),
            memory_type: MemoryType::Episodic,
            query_tags: vec!["spike".into()],
            query_context: Default::default(),
            include_cross_domain: true,
            limit: 10,
            requesting_trust: 0.2,
            actor: "support-agent".into(),
        })
        .await;
    assert_eq!(cross_domain_low_trust.access_level, AccessLevel::Restricted);
    assert!(cross_domain_low_trust.memories.is_empty());
    assert!(cross_domain_low_trust
        .applied_policies
        .contains(&"sensitive_content_filter".to_string()));
}

/// Wraps a real store but forges one stored entry's payload on read,
/// standing in for storage-level tampering that happens after the writer
/// has already signed and chained the original entry.
struct TamperOnRead {
    inner: InMemoryLogStore,
    tamper_seq: u64,
    forged_payload: String,
}

#[async_trait]
impl LogStore for TamperOnRead {
    async fn append(&self, entry: LogEntry) -> anyhow::Result<()> {
        self.inner.append(entry).await
    }

    async fn last_entry(&self) -> anyhow::Result<Option<LogEntry>> {
        self.inner.last_entry().await
    }

    async fn read(&self, filter: LogFilter) -> anyhow::Result<Vec<LogEntry>> {
        let mut entries = self.inner.read(filter).await?;
        for entry in entries.iter_mut() {
            if entry.seq == self.tamper_seq {
                entry.payload = self.forged_payload.clone();
            }
        }
        Ok(entries)
    }
}

#[tokio::test]
async fn tampered_ledger_entry_breaks_chain_verification() {
    let store = Arc::new(TamperOnRead {
        inner: InMemoryLogStore::new(),
        tamper_seq: 2,
        forged_payload: "{\"i\":\"forged\"}".to_string(),
    });
    let log = ImmutableLog::new(store.clone(), Arc::new(Ed25519Signer::generate("tamper-log")));

    for i in 0..4 {
        log.append(grace_core::log::AppendRequest {
            actor: "tester".into(),
            action: format!("governance.decided.{i}"),
            resource: "svc-a".into(),
            subsystem: "governance".into(),
            payload: serde_json::json!({"i": i}),
            result: grace_core::log::LogResult::Decided,
        })
        .await
        .unwrap();
    }

    let result = log.verify(1..=4).await;
    assert!(matches!(result, Err(grace_core::GraceError::ChainBroken(2))));

    let entries = log.read(LogFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 4);
}

#[tokio::test]
async fn meta_directive_propagates_into_trigger_hub_as_a_prediction() {
    let log = Arc::new(ImmutableLog::new(
        Arc::new(InMemoryLogStore::new()),
        Arc::new(Ed25519Signer::generate("meta-seed-log")),
    ));
    let mesh = EventMesh::spawn(None);
    let meta = grace_core::meta::MetaCoordinator::new(
        log,
        mesh.clone(),
        Arc::new(Ed25519Signer::generate("meta-seed")),
        vec![Arc::new(grace_core::meta::AnomalyScorer::new(5.0))],
    );

    let hub = TriggerHub::with_capacity(mesh, 10);
    hub.subscribe_all().await;

    let cycle = meta
        .run_cycle(grace_core::meta::CycleInputs {
            error_count: 12,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(cycle.focus_area, grace_core::meta::FocusArea::ErrorSpike);

    tokio::time::sleep(StdDuration::from_millis(50)).await;

    let recent = hub.recent(1).await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].code, "meta_loop_directive");
}
