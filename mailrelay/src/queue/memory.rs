//! In-memory queue store for tests and development.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{claim_order, mark_processing, QueueStore};
use super::types::{EntryState, QueueEntry};
use super::QueueError;

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<Uuid, QueueEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert(&self, entry: QueueEntry) -> Result<(), QueueError> {
        self.entries.lock().await.insert(entry.id, entry);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        Ok(self.entries.lock().await.get(&id).cloned())
    }

    async fn update(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&entry.id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(QueueError::NotFound(entry.id)),
        }
    }

    async fn claim(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        let mut entries = self.entries.lock().await;
        Ok(entries
            .get_mut(&id)
            .filter(|e| e.state == EntryState::Pending)
            .map(|entry| {
                mark_processing(entry);
                entry.clone()
            }))
    }

    async fn claim_pending(&self, limit: usize) -> Result<Vec<QueueEntry>, QueueError> {
        let mut entries = self.entries.lock().await;

        let mut pending: Vec<QueueEntry> = entries
            .values()
            .filter(|e| e.state == EntryState::Pending)
            .cloned()
            .collect();
        claim_order(&mut pending);
        pending.truncate(limit);

        for claimed in &mut pending {
            mark_processing(claimed);
            entries.insert(claimed.id, claimed.clone());
        }
        Ok(pending)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, QueueError> {
        Ok(self.entries.lock().await.remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self.entries.lock().await.values().cloned().collect())
    }

    async fn count(&self) -> Result<usize, QueueError> {
        Ok(self.entries.lock().await.len())
    }
}
