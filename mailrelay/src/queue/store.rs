//! Persistence boundary for queue entries.

use async_trait::async_trait;
use uuid::Uuid;

use super::types::{EntryState, Priority, QueueEntry};
use super::QueueError;

/// Storage for queue entries.
///
/// State transitions out of `pending` go through [`claim`](Self::claim) and
/// [`claim_pending`](Self::claim_pending), which must be atomic with respect
/// to each other: an entry is handed out at most once.
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    async fn insert(&self, entry: QueueEntry) -> Result<(), QueueError>;

    async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError>;

    /// Overwrite an existing entry.
    async fn update(&self, entry: &QueueEntry) -> Result<(), QueueError>;

    /// Move one entry from pending to processing. `None` when it does not
    /// exist or is not pending.
    async fn claim(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError>;

    /// Move up to `limit` pending entries to processing, immediate ones
    /// first, then oldest first.
    async fn claim_pending(&self, limit: usize) -> Result<Vec<QueueEntry>, QueueError>;

    /// Returns whether the entry existed.
    async fn delete(&self, id: Uuid) -> Result<bool, QueueError>;

    async fn list(&self) -> Result<Vec<QueueEntry>, QueueError>;

    async fn count(&self) -> Result<usize, QueueError> {
        Ok(self.list().await?.len())
    }
}

/// Order in which pending entries are claimed.
pub(crate) fn claim_order(entries: &mut [QueueEntry]) {
    entries.sort_by_key(|e| (e.priority != Priority::Immediate, e.created_at));
}

/// Mark an entry as claimed.
pub(crate) fn mark_processing(entry: &mut QueueEntry) {
    entry.state = EntryState::Processing;
}
