//! Shared application state handed to tasks, the worker and the web server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::mailer::{Dispatcher, MailerRegistry, ReqwestTransport, SendReport, SenderDefaults};
use crate::message::Message;
use crate::queue::{AttachmentStore, FileStore, Priority, Queue, QueueOptions};
use crate::tasks::{SendEnqueuedEmailTask, TaskScheduler};

/// What happened to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    Queued { entry_id: Uuid },
    Sent(SendReport),
    Failed(SendReport),
}

pub struct AppContext {
    config: Config,
    dispatcher: Dispatcher,
    queue: Queue,
    scheduler: Arc<TaskScheduler>,
    queue_enabled: AtomicBool,
}

impl AppContext {
    pub fn new(config: Config, dispatcher: Dispatcher, queue: Queue, scheduler: Arc<TaskScheduler>) -> Self {
        let queue_enabled = AtomicBool::new(config.queue_enabled);
        Self {
            config,
            dispatcher,
            queue,
            scheduler,
            queue_enabled,
        }
    }

    /// Wire the production stack: reqwest transport, file-backed queue and
    /// attachment storage under the configured directories.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(Duration::from_millis(config.http_timeout_ms))
            .context("failed to build HTTP client")?;
        let registry = MailerRegistry::new(config.provider_settings(), Arc::new(transport));
        let dispatcher = Dispatcher::new(registry, config.mailer.clone(), SenderDefaults::from_config(&config));

        let store = FileStore::open(&config.queue_dir)
            .await
            .with_context(|| format!("failed to open queue directory {}", config.queue_dir.display()))?;
        let queue = Queue::new(
            Arc::new(store),
            AttachmentStore::new(&config.attachments_dir),
            dispatcher.clone(),
            QueueOptions::from_config(&config),
        );

        info!(
            mailer = %config.mailer,
            queue_enabled = config.queue_enabled,
            queue_dir = %config.queue_dir.display(),
            "app_context_ready"
        );

        Ok(Self::new(config, dispatcher, queue, Arc::new(TaskScheduler::new())))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn is_queue_enabled(&self) -> bool {
        self.queue_enabled.load(Ordering::Relaxed)
    }

    pub fn set_queue_enabled(&self, enabled: bool) {
        self.queue_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Queue `message` when the queue is enabled, otherwise send it now.
    ///
    /// Immediate entries also get a one-shot send task. A message that
    /// cannot be queued is sent directly instead of being dropped.
    pub async fn deliver(&self, message: &Message, priority: Priority) -> Delivery {
        if self.is_queue_enabled() {
            match self.queue.enqueue(message, priority).await {
                Ok(entry_id) => {
                    if priority == Priority::Immediate {
                        SendEnqueuedEmailTask::schedule(&self.scheduler, entry_id);
                    }
                    return Delivery::Queued { entry_id };
                }
                Err(e) => warn!(error = %e, "enqueue_failed_sending_directly"),
            }
        }

        let report = self.dispatcher.send(message).await;
        if report.sent {
            Delivery::Sent(report)
        } else {
            Delivery::Failed(report)
        }
    }
}
