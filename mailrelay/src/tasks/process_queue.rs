use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::info;

use crate::context::AppContext;

use super::{ScheduledTask, Task, TaskError};

/// Drains pending queue entries on a fixed interval.
pub struct ProcessQueueTask;

impl ProcessQueueTask {
    pub const ACTION: &'static str = "mailrelay_process_queue";
}

#[async_trait]
impl ScheduledTask for ProcessQueueTask {
    fn action(&self) -> &'static str {
        Self::ACTION
    }

    async fn init(&self, ctx: &AppContext) -> Result<(), TaskError> {
        if !ctx.is_queue_enabled() {
            ctx.scheduler().cancel(Self::ACTION);
            return Ok(());
        }

        let interval = Duration::seconds(ctx.config().process_interval_secs.max(1) as i64);
        Task::builder(Self::ACTION)
            .recurring(Utc::now(), interval)
            .unique()
            .register(ctx.scheduler());
        Ok(())
    }

    async fn process(&self, ctx: &AppContext, _params: Value) -> Result<(), TaskError> {
        if !ctx.is_queue_enabled() {
            info!(action = Self::ACTION, "queue_disabled_task_canceled");
            ctx.scheduler().cancel(Self::ACTION);
            return Ok(());
        }

        ctx.queue().process().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::queue::{EntryState, Priority};
    use crate::tasks::test_support::test_context;
    use crate::tasks::TaskRunner;

    #[tokio::test]
    async fn test_processes_pending_entries() {
        let t = test_context(true);
        let message = Message::builder()
            .to("user@example.com", "")
            .subject("Hi")
            .text("Hello")
            .build();
        let id = t.ctx.queue().enqueue(&message, Priority::Normal).await.unwrap();

        let mut runner = TaskRunner::new();
        runner.register(ProcessQueueTask);
        runner.init_all(&t.ctx).await;
        assert!(t.ctx.scheduler().is_scheduled(ProcessQueueTask::ACTION));

        assert_eq!(runner.run_due(&t.ctx, Utc::now()).await, 1);
        let entry = t.ctx.queue().get(id).await.unwrap().unwrap();
        assert_eq!(entry.state, EntryState::Sent);
        assert_eq!(t.transport.request_count(), 1);

        // Still recurring.
        assert!(t.ctx.scheduler().is_scheduled(ProcessQueueTask::ACTION));
    }

    #[tokio::test]
    async fn test_init_is_unique() {
        let t = test_context(true);
        ProcessQueueTask.init(&t.ctx).await.unwrap();
        ProcessQueueTask.init(&t.ctx).await.unwrap();
        assert_eq!(t.ctx.scheduler().pending(ProcessQueueTask::ACTION).len(), 1);
    }

    #[tokio::test]
    async fn test_cancels_itself_when_queue_disabled() {
        let t = test_context(true);
        ProcessQueueTask.init(&t.ctx).await.unwrap();

        t.ctx.set_queue_enabled(false);
        ProcessQueueTask.process(&t.ctx, Value::Null).await.unwrap();
        assert!(!t.ctx.scheduler().is_scheduled(ProcessQueueTask::ACTION));

        ProcessQueueTask.init(&t.ctx).await.unwrap();
        assert!(!t.ctx.scheduler().is_scheduled(ProcessQueueTask::ACTION));
    }
}
