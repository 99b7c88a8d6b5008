//! Queue entry types.
//!
//! An entry stores the message as a JSON snapshot rather than a typed
//! [`Message`]: a snapshot that no longer decodes must still be loadable so
//! that processing can mark it failed and move on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::message::Message;

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a processing run.
    Processing,
    Sent,
    Failed,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Sent and failed entries are never picked up again.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// How soon an enqueued message should go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Picked up by the next processing run.
    #[default]
    Normal,
    /// Sent by a dedicated one-shot task right away, and claimed first by
    /// processing runs.
    Immediate,
}

/// One persisted email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    /// Serialized [`Message`].
    pub snapshot: Value,
    pub state: EntryState,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Provider-assigned id after a successful send.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Slug of the mailer used for the last attempt.
    #[serde(default)]
    pub mailer: Option<String>,
}

impl QueueEntry {
    pub fn new(message: &Message, priority: Priority) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            snapshot: serde_json::to_value(message)?,
            state: EntryState::Pending,
            priority,
            created_at: Utc::now(),
            processed_at: None,
            attempt_count: 0,
            last_error: None,
            message_id: None,
            mailer: None,
        })
    }

    /// Rebuild the message from its snapshot.
    pub fn message(&self) -> Result<Message, serde_json::Error> {
        Message::deserialize(&self.snapshot)
    }

    /// Timestamp the retention window counts from.
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.processed_at.unwrap_or(self.created_at)
    }
}

/// Entry counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub sent: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.sent + self.failed
    }

    pub fn record(&mut self, state: EntryState) {
        match state {
            EntryState::Pending => self.pending += 1,
            EntryState::Processing => self.processing += 1,
            EntryState::Sent => self.sent += 1,
            EntryState::Failed => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serialization() {
        let message = Message::builder()
            .from("app@example.com", "App")
            .to("user@example.com", "")
            .subject("Hi")
            .build();
        let entry = QueueEntry::new(&message, Priority::Immediate).unwrap();

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"state\":\"pending\""));
        assert!(json.contains("\"priority\":\"immediate\""));

        let parsed: QueueEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, entry.id);
        assert_eq!(parsed.message().unwrap(), message);
    }

    #[test]
    fn test_corrupt_snapshot_fails_to_decode() {
        let mut entry = QueueEntry::new(&Message::new(), Priority::Normal).unwrap();
        entry.snapshot = serde_json::json!({ "recipients": "not a list" });
        assert!(entry.message().is_err());
    }

    #[test]
    fn test_stats_total() {
        let mut stats = QueueStats::default();
        stats.record(EntryState::Sent);
        stats.record(EntryState::Sent);
        stats.record(EntryState::Failed);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.sent, 2);
        assert!(EntryState::Failed.is_final());
        assert!(!EntryState::Processing.is_final());
    }
}
