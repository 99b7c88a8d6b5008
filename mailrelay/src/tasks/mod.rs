//! Scheduled background tasks.
//!
//! A [`TaskRunner`] maps action names to [`ScheduledTask`] handlers and fires
//! whatever the [`TaskScheduler`] reports as due. Every task re-checks its
//! preconditions on `init` and again each time it fires, cancelling itself
//! when they no longer hold.

pub mod cleanup_queue;
pub mod process_queue;
pub mod scheduler;
pub mod send_enqueued;
pub mod summary;

pub use cleanup_queue::CleanupQueueTask;
pub use process_queue::ProcessQueueTask;
pub use scheduler::{ActionStatus, Firing, Schedule, ScheduledAction, Task, TaskBuilder, TaskMetaStore, TaskScheduler};
pub use send_enqueued::SendEnqueuedEmailTask;
pub use summary::SummaryEmailTask;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::context::AppContext;
use crate::queue::QueueError;

/// Errors raised while running a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("no handler registered for action {0}")]
    UnknownAction(String),

    #[error("task failed: {0}")]
    Handler(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// A named background job.
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    /// Action name; unique across tasks.
    fn action(&self) -> &'static str;

    /// Register (or cancel) the task according to the current configuration.
    async fn init(&self, ctx: &AppContext) -> Result<(), TaskError>;

    /// Run one firing with the action's parameters.
    async fn process(&self, ctx: &AppContext, params: Value) -> Result<(), TaskError>;
}

/// Dispatches due actions to their handlers.
#[derive(Default, Clone)]
pub struct TaskRunner {
    handlers: HashMap<&'static str, Arc<dyn ScheduledTask>>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner with every built-in task.
    pub fn with_defaults() -> Self {
        let mut runner = Self::new();
        runner.register(ProcessQueueTask);
        runner.register(CleanupQueueTask);
        runner.register(SendEnqueuedEmailTask);
        runner.register(SummaryEmailTask);
        runner
    }

    /// Runner that only sends immediate queue entries. Used by processes
    /// that accept messages but leave batch processing to the worker.
    pub fn immediate_sends() -> Self {
        let mut runner = Self::new();
        runner.register(SendEnqueuedEmailTask);
        runner
    }

    pub fn register(&mut self, task: impl ScheduledTask) {
        self.handlers.insert(task.action(), Arc::new(task));
    }

    /// Run every task's `init`. Failures are logged and do not stop the
    /// remaining tasks.
    pub async fn init_all(&self, ctx: &AppContext) {
        for (action, task) in &self.handlers {
            if let Err(e) = task.init(ctx).await {
                error!(action = %action, error = %e, "task_init_failed");
            }
        }
    }

    /// Fire every action due at `now`. Returns how many handlers ran
    /// successfully.
    pub async fn run_due(&self, ctx: &AppContext, now: DateTime<Utc>) -> usize {
        let mut succeeded = 0;

        for firing in ctx.scheduler().take_due(now) {
            let result = match self.handlers.get(firing.action.as_str()) {
                Some(task) => task.process(ctx, firing.params.clone()).await,
                None => Err(TaskError::UnknownAction(firing.action.clone())),
            };

            if firing.one_shot {
                if let Some(meta_id) = firing.meta_id {
                    ctx.scheduler().meta().delete(meta_id);
                }
            }

            match result {
                Ok(()) => {
                    info!(action = %firing.action, action_id = firing.action_id, "task_completed");
                    succeeded += 1;
                }
                Err(e) => {
                    error!(
                        action = %firing.action,
                        action_id = firing.action_id,
                        error = %e,
                        "task_failed"
                    );
                }
            }
        }

        succeeded
    }

    /// Fire due actions every `tick` on a background task until the handle
    /// is aborted.
    pub fn spawn(self, ctx: Arc<AppContext>, tick: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let ran = self.run_due(&ctx, Utc::now()).await;
                if ran > 0 {
                    debug!(tasks_run = ran, "task_runner_tick");
                }
            }
        })
    }
}
