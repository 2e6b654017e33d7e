use async_trait::async_trait;
use tokio::sync::RwLock;

use super::entry::{LogEntry, LogFilter};

/// Storage capability the Immutable Log writer is built on. The core ships
/// an in-process implementation; this trait is the contract any future
/// persistent store must satisfy (see DESIGN.md).
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append(&self, entry: LogEntry) -> anyhow::Result<()>;
    async fn last_entry(&self) -> anyhow::Result<Option<LogEntry>>;
    async fn read(&self, filter: LogFilter) -> anyhow::Result<Vec<LogEntry>>;
}

#[derive(Default)]
pub struct InMemoryLogStore {
    entries: RwLock<Vec<LogEntry>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn append(&self, entry: LogEntry) -> anyhow::Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn last_entry(&self) -> anyhow::Result<Option<LogEntry>> {
        Ok(self.entries.read().await.last().cloned())
    }

    async fn read(&self, filter: LogFilter) -> anyhow::Result<Vec<LogEntry>> {
        let entries = self.entries.read().await;
        let mut out: Vec<LogEntry> = entries
            .iter()
            .filter(|e| filter.from_seq.map(|from| e.seq >= from).unwrap_or(true))
            .filter(|e| filter.to_seq.map(|to| e.seq <= to).unwrap_or(true))
            .filter(|e| {
                filter
                    .actor
                    .as_ref()
                    .map(|a| &e.actor == a)
                    .unwrap_or(true)
            })
            .filter(|e| {
                filter
                    .action
                    .as_ref()
                    .map(|a| &e.action == a)
                    .unwrap_or(true)
            })
            .filter(|e| {
                filter
                    .subsystem
                    .as_ref()
                    .map(|s| &e.subsystem == s)
                    .unwrap_or(true)
            })
            .filter(|e| {
                filter
                    .resource
                    .as_ref()
                    .map(|r| &e.resource == r)
                    .unwrap_or(true)
            })
            .filter(|e| filter.since.map(|s| e.timestamp >= s).unwrap_or(true))
            .filter(|e| filter.until.map(|u| e.timestamp <= u).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.seq);
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

/// Rewrites a stored entry's payload in place, bypassing the writer. Exists
/// only to exercise the tamper-detection path in tests; production code
/// never calls this (the log otherwise exposes no update/delete surface).
#[cfg(test)]
impl InMemoryLogStore {
    pub async fn test_tamper_payload(&self, seq: u64, new_payload: String) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.seq == seq) {
            entry.payload = new_payload;
        }
    }
}
