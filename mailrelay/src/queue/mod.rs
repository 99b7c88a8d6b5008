//! Durable delivery queue.
//!
//! ```text
//! enqueue → pending ──claim──▶ processing ──send──▶ sent | failed ──retention──▶ deleted
//!                                                       failed ──reset──▶ pending
//! ```
//!
//! Each entry gets exactly one adapter attempt per claim. Attachment bytes
//! are moved to [`AttachmentStore`] on enqueue and collected by age.

pub mod attachments;
pub mod file;
pub mod memory;
pub mod store;
pub mod types;

pub use attachments::AttachmentStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::QueueStore;
pub use types::{EntryState, Priority, QueueEntry, QueueStats};

use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::mailer::{Dispatcher, SendReport};
use crate::message::Message;

/// Errors raised by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("queue entry not found: {0}")]
    NotFound(Uuid),

    #[error("queue entry {id} is {state}, expected {expected}")]
    InvalidState {
        id: Uuid,
        state: &'static str,
        expected: &'static str,
    },
}

/// Tunables for one queue.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Entries claimed per processing run.
    pub batch_size: usize,
    /// How long sent and failed entries are kept.
    pub retention: Duration,
    /// How long stored attachment files are kept.
    pub attachment_retention: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retention: Duration::days(90),
            attachment_retention: Duration::days(30),
        }
    }
}

impl QueueOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.queue_batch_size.max(1),
            retention: Duration::days(config.queue_retention_days as i64),
            attachment_retention: Duration::days(config.attachment_retention_days as i64),
        }
    }
}

/// Outcome of one processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Outcome of one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub entries_deleted: usize,
    pub attachments_deleted: usize,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.entries_deleted == 0 && self.attachments_deleted == 0
    }
}

/// The delivery queue: a store, attachment storage and the dispatcher used
/// to send claimed entries.
#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn QueueStore>,
    attachments: AttachmentStore,
    dispatcher: Dispatcher,
    options: QueueOptions,
}

impl Queue {
    pub fn new(
        store: Arc<dyn QueueStore>,
        attachments: AttachmentStore,
        dispatcher: Dispatcher,
        options: QueueOptions,
    ) -> Self {
        Self {
            store,
            attachments,
            dispatcher,
            options,
        }
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn attachments(&self) -> &AttachmentStore {
        &self.attachments
    }

    /// Persist a pending entry and return its id. In-memory attachment
    /// bytes are written to attachment storage first.
    pub async fn enqueue(&self, message: &Message, priority: Priority) -> Result<Uuid, QueueError> {
        let mut message = message.clone();
        let mut entry = QueueEntry::new(&message, priority)?;

        let stored = self.attachments.store(entry.id, &mut message).await?;
        if stored > 0 {
            entry.snapshot = serde_json::to_value(&message)?;
        }

        let id = entry.id;
        if let Err(e) = self.store.insert(entry).await {
            let _ = self.attachments.remove_entry(id).await;
            return Err(e);
        }

        info!(
            entry_id = %id,
            priority = ?priority,
            attachments = message.attachments.len(),
            "email_enqueued"
        );
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        self.store.get(id).await
    }

    pub async fn count(&self) -> Result<usize, QueueError> {
        self.store.count().await
    }

    /// Claim up to one batch of pending entries and send each once.
    pub async fn process(&self) -> Result<ProcessReport, QueueError> {
        let claimed = self.store.claim_pending(self.options.batch_size).await?;
        let mut report = ProcessReport {
            claimed: claimed.len(),
            ..Default::default()
        };

        if claimed.is_empty() {
            debug!("queue_process_idle");
            return Ok(report);
        }

        info!(claimed = claimed.len(), "queue_process_started");

        for entry in claimed {
            let id = entry.id;
            match self.deliver(entry).await {
                Ok(entry) if entry.state == EntryState::Sent => report.sent += 1,
                Ok(_) => report.failed += 1,
                Err(e) => {
                    error!(entry_id = %id, error = %e, "queue_entry_update_failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            claimed = report.claimed,
            sent = report.sent,
            failed = report.failed,
            "queue_process_complete"
        );
        Ok(report)
    }

    /// Claim and send one entry. `None` when it does not exist or was
    /// already claimed by someone else.
    pub async fn send_email(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        let Some(entry) = self.store.claim(id).await? else {
            debug!(entry_id = %id, "queue_send_skipped");
            return Ok(None);
        };
        self.deliver(entry).await.map(Some)
    }

    /// Send a claimed entry and record the outcome.
    async fn deliver(&self, mut entry: QueueEntry) -> Result<QueueEntry, QueueError> {
        let outcome = match entry.message() {
            Ok(message) => self.dispatcher.send(&message).await,
            Err(e) => {
                warn!(entry_id = %entry.id, error = %e, "queue_snapshot_corrupt");
                SendReport {
                    mailer: self.dispatcher.active_mailer().to_string(),
                    sent: false,
                    message_id: None,
                    error: Some(format!("corrupt message snapshot: {}", e)),
                    debug: String::new(),
                }
            }
        };

        entry.state = if outcome.sent {
            EntryState::Sent
        } else {
            EntryState::Failed
        };
        entry.processed_at = Some(Utc::now());
        entry.attempt_count += 1;
        entry.last_error = outcome.error;
        entry.message_id = outcome.message_id;
        entry.mailer = Some(outcome.mailer);

        self.store.update(&entry).await?;

        info!(
            entry_id = %entry.id,
            state = entry.state.as_str(),
            attempt = entry.attempt_count,
            "queue_entry_processed"
        );
        Ok(entry)
    }

    /// Delete expired entries with their attachments, then attachment
    /// files past their own retention.
    pub async fn cleanup(&self) -> Result<CleanupReport, QueueError> {
        self.cleanup_at(Utc::now()).await
    }

    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> Result<CleanupReport, QueueError> {
        let cutoff = now - self.options.retention;
        let mut report = CleanupReport::default();

        for entry in self.store.list().await? {
            if entry.state.is_final() && entry.finished_at() < cutoff {
                if self.store.delete(entry.id).await? {
                    report.entries_deleted += 1;
                }
                self.attachments.remove_entry(entry.id).await?;
            }
        }

        let attachment_cutoff: SystemTime = (now - self.options.attachment_retention).into();
        report.attachments_deleted = self.attachments.sweep(attachment_cutoff).await?;

        info!(
            entries_deleted = report.entries_deleted,
            attachments_deleted = report.attachments_deleted,
            "queue_cleanup_complete"
        );
        Ok(report)
    }

    /// Delete attachment files older than `threshold`, regardless of the
    /// configured retention.
    pub async fn sweep_attachments(&self, threshold: Duration) -> Result<usize, QueueError> {
        let cutoff: SystemTime = (Utc::now() - threshold).into();
        self.attachments.sweep(cutoff).await
    }

    /// Put a failed entry back to pending for another attempt.
    pub async fn reset(&self, id: Uuid) -> Result<QueueEntry, QueueError> {
        let mut entry = self.store.get(id).await?.ok_or(QueueError::NotFound(id))?;
        if entry.state != EntryState::Failed {
            return Err(QueueError::InvalidState {
                id,
                state: entry.state.as_str(),
                expected: EntryState::Failed.as_str(),
            });
        }

        entry.state = EntryState::Pending;
        entry.last_error = None;
        self.store.update(&entry).await?;

        info!(entry_id = %id, attempts = entry.attempt_count, "queue_entry_reset");
        Ok(entry)
    }

    /// Entry counts per state for entries created at or after `since`.
    pub async fn stats(&self, since: DateTime<Utc>) -> Result<QueueStats, QueueError> {
        let mut stats = QueueStats::default();
        for entry in self.store.list().await? {
            if entry.created_at >= since {
                stats.record(entry.state);
            }
        }
        Ok(stats)
    }
}
