//! Mailrelay - transactional email relay.
//!
//! Outgoing messages are handed to one of several provider adapters
//! (SMTP, local sendmail or an HTTP API), either directly or through a
//! durable queue drained by scheduled tasks.
//!
//! ## Architecture
//!
//! ```text
//! Message → AppContext::deliver ─┬─▶ Dispatcher → Mailer → provider
//!                                └─▶ Queue ──(ProcessQueueTask)──▶ Dispatcher
//! ```
//!
//! Three binaries share this library:
//! - `mailrelay-worker`: runs scheduled tasks (queue processing, cleanup, reports)
//! - `mailrelay-web`: HTTP API for submitting messages
//! - `mailrelay-send`: sends one message from the command line

pub mod config;
pub mod context;
pub mod mailer;
pub mod message;
#[cfg(test)]
pub mod mocks;
pub mod queue;
pub mod tasks;
pub mod web;

// Re-export commonly used types
pub use config::{Config, MailerSettings, ProviderSettings};
pub use context::{AppContext, Delivery};
pub use mailer::{Dispatcher, Mailer, MailerRegistry, SendReport};
pub use message::{Address, Attachment, Message};
pub use queue::{Priority, Queue, QueueEntry, QueueError};
pub use tasks::{TaskRunner, TaskScheduler};
pub use web::AppState;
