use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::AppContext;

use super::{ScheduledTask, Task, TaskError, TaskScheduler};

/// Sends one queue entry as soon as possible, outside the regular batch.
pub struct SendEnqueuedEmailTask;

impl SendEnqueuedEmailTask {
    pub const ACTION: &'static str = "mailrelay_send_enqueued_email";

    /// Schedule an immediate send of `entry_id`.
    pub fn schedule(scheduler: &TaskScheduler, entry_id: Uuid) -> u64 {
        Task::builder(Self::ACTION)
            .one_shot()
            .params(json!({ "entry_id": entry_id }))
            .register(scheduler)
    }
}

#[async_trait]
impl ScheduledTask for SendEnqueuedEmailTask {
    fn action(&self) -> &'static str {
        Self::ACTION
    }

    /// Scheduled on demand by [`AppContext::deliver`].
    async fn init(&self, _ctx: &AppContext) -> Result<(), TaskError> {
        Ok(())
    }

    async fn process(&self, ctx: &AppContext, params: Value) -> Result<(), TaskError> {
        let entry_id = params
            .get("entry_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| TaskError::Handler(format!("missing or invalid entry_id in {}", params)))?;

        match ctx.queue().send_email(entry_id).await? {
            Some(entry) => debug!(entry_id = %entry_id, state = entry.state.as_str(), "enqueued_email_sent"),
            None => warn!(entry_id = %entry_id, "enqueued_email_not_claimable"),
        }
        Ok(())
    }
}
