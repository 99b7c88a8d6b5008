use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::info;

use crate::context::AppContext;

use super::{ScheduledTask, Task, TaskError};

/// Age threshold of the last attachment sweep after the queue is turned off.
const FINAL_SWEEP_THRESHOLD_HOURS: i64 = 1;

/// Deletes expired queue entries and stored attachments once a day.
///
/// Keeps running after the queue is disabled until every entry is gone,
/// then sweeps leftover attachment files and cancels itself.
pub struct CleanupQueueTask;

impl CleanupQueueTask {
    pub const ACTION: &'static str = "mailrelay_cleanup_queue";
}

#[async_trait]
impl ScheduledTask for CleanupQueueTask {
    fn action(&self) -> &'static str {
        Self::ACTION
    }

    async fn init(&self, ctx: &AppContext) -> Result<(), TaskError> {
        if !ctx.is_queue_enabled() && ctx.queue().count().await? == 0 {
            ctx.scheduler().cancel(Self::ACTION);
            return Ok(());
        }

        Task::builder(Self::ACTION)
            .recurring(Utc::now(), Duration::days(1))
            .unique()
            .register(ctx.scheduler());
        Ok(())
    }

    async fn process(&self, ctx: &AppContext, _params: Value) -> Result<(), TaskError> {
        let queue = ctx.queue();

        if !ctx.is_queue_enabled() && queue.count().await? == 0 {
            let deleted = queue
                .sweep_attachments(Duration::hours(FINAL_SWEEP_THRESHOLD_HOURS))
                .await?;
            info!(attachments_deleted = deleted, "queue_final_sweep_complete");
            ctx.scheduler().cancel(Self::ACTION);
            return Ok(());
        }

        queue.cleanup().await?;
        Ok(())
    }
}
