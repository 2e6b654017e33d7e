//! key: immutable-log
//! Append-only, signed ledger. Single writer, many readers. No updates, no
//! deletes; entries form a hash chain anchored at `seq = 1`.

mod canonical;
mod entry;
mod store;

pub use canonical::canonicalize;
pub use entry::{LogEntry, LogFilter, LogResult};
pub use store::{InMemoryLogStore, LogStore};

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, warn};

use crate::config::SAFE_HELPER_TIMEOUT;
use crate::crypto::Signer;
use crate::error::{GraceError, GraceResult};
use crate::mesh::{Event, EventSink};

/// Fields the caller supplies; `seq`, `timestamp`, `payload_hash`,
/// `prev_seq_hash`, and `signature` are computed by the writer.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub subsystem: String,
    pub payload: Value,
    pub result: LogResult,
}

/// The single writer for the ledger. Owns serialization of appends; reads
/// and `verify` may run concurrently with appends (they only ever observe a
/// prefix of already-committed entries).
pub struct ImmutableLog {
    store: Arc<dyn LogStore>,
    signer: Arc<dyn Signer>,
    write_lock: Mutex<()>,
}

impl ImmutableLog {
    pub fn new(store: Arc<dyn LogStore>, signer: Arc<dyn Signer>) -> Self {
        Self {
            store,
            signer,
            write_lock: Mutex::new(()),
        }
    }

    /// Writes one entry, computing hash and signature, enforcing chain
    /// continuity. Blocks up to a bounded time then fails with
    /// `LogUnavailable` if the store cannot accept the write; callers MUST
    /// treat that as a hard failure for security-relevant actions.
    pub async fn append(&self, request: AppendRequest) -> GraceResult<u64> {
        let _guard = self.write_lock.lock().await;

        let prev = self.store.last_entry().await.map_err(|e| {
            GraceError::LogUnavailable(format!("failed to read tail for chain continuity: {e}"))
        })?;
        let seq = prev.as_ref().map(|e| e.seq + 1).unwrap_or(1);
        let prev_seq_hash = match &prev {
            Some(entry) => hash_entry(entry),
            None => String::new(),
        };

        let canonical_payload = canonical::canonicalize(&request.payload);
        let payload_hash = hex::encode(Sha256::digest(canonical_payload.as_bytes()));
        let timestamp = Utc::now();

        let signing_material = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            seq, timestamp, request.actor, request.action, request.resource, payload_hash, prev_seq_hash
        );
        let signature = self.signer.sign(signing_material.as_bytes());

        let entry = LogEntry {
            seq,
            timestamp,
            actor: request.actor,
            action: request.action,
            resource: request.resource,
            subsystem: request.subsystem,
            payload_hash,
            payload: canonical_payload,
            result: request.result,
            signature,
            prev_seq_hash,
        };

        timeout(*SAFE_HELPER_TIMEOUT, self.store.append(entry.clone()))
            .await
            .map_err(|_| GraceError::LogUnavailable("append timed out".into()))?
            .map_err(|e| GraceError::LogUnavailable(e.to_string()))?;

        Ok(seq)
    }

    /// Ordered by `seq` ascending.
    pub async fn read(&self, filter: LogFilter) -> GraceResult<Vec<LogEntry>> {
        self.store
            .read(filter)
            .await
            .map_err(|e| GraceError::LogUnavailable(e.to_string()))
    }

    /// Recomputes the hash chain over `range` (inclusive, 1-based), failing
    /// with `ChainBroken(seq)` on the first mismatch.
    pub async fn verify(&self, range: std::ops::RangeInclusive<u64>) -> GraceResult<()> {
        let entries = self
            .store
            .read(LogFilter {
                from_seq: Some(*range.start()),
                to_seq: Some(*range.end()),
                ..Default::default()
            })
            .await
            .map_err(|e| GraceError::LogUnavailable(e.to_string()))?;

        let mut prev: Option<LogEntry> = if *range.start() > 1 {
            self.store
                .read(LogFilter {
                    from_seq: Some(range.start() - 1),
                    to_seq: Some(range.start() - 1),
                    ..Default::default()
                })
                .await
                .map_err(|e| GraceError::LogUnavailable(e.to_string()))?
                .into_iter()
                .next()
        } else {
            None
        };

        for entry in entries {
            let expected_prev_hash = match &prev {
                Some(p) => hash_entry(p),
                None => String::new(),
            };
            if entry.prev_seq_hash != expected_prev_hash {
                return Err(GraceError::ChainBroken(entry.seq));
            }
            let recomputed_payload_hash = hex::encode(Sha256::digest(entry.payload.as_bytes()));
            if recomputed_payload_hash != entry.payload_hash {
                return Err(GraceError::ChainBroken(entry.seq));
            }
            let material = format!(
                "{}|{}|{}|{}|{}|{}|{}",
                entry.seq,
                entry.timestamp,
                entry.actor,
                entry.action,
                entry.resource,
                entry.payload_hash,
                entry.prev_seq_hash
            );
            if !self.signer.verify(material.as_bytes(), &entry.signature) {
                return Err(GraceError::ChainBroken(entry.seq));
            }
            prev = Some(entry);
        }
        Ok(())
    }
}

fn hash_entry(entry: &LogEntry) -> String {
    let material = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        entry.seq,
        entry.timestamp,
        entry.actor,
        entry.action,
        entry.resource,
        entry.payload_hash,
        entry.prev_seq_hash
    );
    hex::encode(Sha256::digest(material.as_bytes()))
}

/// Adapts the log as the Event Mesh's best-effort `EventSink`: every
/// published event is appended with `result = "published"`. Failures of
/// this fan-out never block mesh delivery.
pub struct MeshLogSink(pub Arc<ImmutableLog>);

#[async_trait::async_trait]
impl EventSink for MeshLogSink {
    async fn record_published(&self, event: &Event) {
        let payload = serde_json::to_value(event).unwrap_or(Value::Null);
        let request = AppendRequest {
            actor: event.actor.clone(),
            action: event.event_type.clone(),
            resource: event.resource.clone(),
            subsystem: event.subsystem.clone(),
            payload,
            result: LogResult::Published,
        };
        if let Err(err) = self.0.append(request).await {
            warn!(?err, event_id = %event.event_id, "mesh fan-out to immutable log failed");
        }
    }
}

/// Best-effort log write for telemetry-grade records: recovers locally on
/// failure instead of propagating. Never used for security-critical writes
/// (execution, voting, governance decisions).
pub async fn safe_log(log: &ImmutableLog, request: AppendRequest) {
    match timeout(*SAFE_HELPER_TIMEOUT, log.append(request)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => warn!(?err, "safe_log: append failed"),
        Err(_) => error!("safe_log: timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signer;
    use serde_json::json;

    fn fresh_log() -> ImmutableLog {
        ImmutableLog::new(
            Arc::new(InMemoryLogStore::new()),
            Arc::new(Ed25519Signer::generate("log-writer")),
        )
    }

    fn req(action: &str) -> AppendRequest {
        AppendRequest {
            actor: "tester".into(),
            action: action.into(),
            resource: "svc-a".into(),
            subsystem: "health".into(),
            payload: json!({"k": "v"}),
            result: LogResult::Success,
        }
    }

    #[tokio::test]
    async fn appends_form_a_valid_chain() {
        let log = fresh_log();
        for i in 0..5 {
            let seq = log.append(req(&format!("action-{i}"))).await.unwrap();
            assert_eq!(seq, i + 1);
        }
        log.verify(1..=5).await.unwrap();
    }

    #[tokio::test]
    async fn read_filters_by_action() {
        let log = fresh_log();
        log.append(req("scale_up")).await.unwrap();
        log.append(req("scale_down")).await.unwrap();
        let entries = log
            .read(LogFilter {
                action: Some("scale_up".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "scale_up");
    }

    #[tokio::test]
    async fn tampering_breaks_the_chain() {
        let store = Arc::new(InMemoryLogStore::new());
        let log = ImmutableLog::new(store.clone(), Arc::new(Ed25519Signer::generate("log-writer")));
        for i in 0..5 {
            log.append(req(&format!("action-{i}"))).await.unwrap();
        }
        store.test_tamper_payload(3, "{\"tampered\":true}".into()).await;
        let result = log.verify(1..=5).await;
        assert!(matches!(result, Err(GraceError::ChainBroken(3))));
    }

    #[tokio::test]
    async fn canonical_payload_hash_is_reproducible() {
        let a = canonicalize(&json!({"b": 1, "a": 2}));
        let b = canonicalize(&json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
    }
}
