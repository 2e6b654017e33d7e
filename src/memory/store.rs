use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::models::MemoryEntry;

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn insert(&self, entry: MemoryEntry);
    async fn in_domain(&self, domain: &str) -> Vec<MemoryEntry>;
    async fn outside_domain(&self, domain: &str) -> Vec<MemoryEntry>;
    async fn bump_access(&self, entry_id: Uuid);
}

#[derive(Default)]
pub struct InMemoryMemoryStore {
    entries: DashMap<Uuid, MemoryEntry>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn insert(&self, entry: MemoryEntry) {
        self.entries.insert(entry.entry_id, entry);
    }

    async fn in_domain(&self, domain: &str) -> Vec<MemoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.domain == domain)
            .map(|e| e.clone())
            .collect()
    }

    async fn outside_domain(&self, domain: &str) -> Vec<MemoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.domain != domain)
            .map(|e| e.clone())
            .collect()
    }

    async fn bump_access(&self, entry_id: Uuid) {
        if let Some(mut entry) = self.entries.get_mut(&entry_id) {
            entry.access_count += 1;
        }
    }
}
