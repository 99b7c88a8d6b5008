//! Synchronous delivery through the active mailer.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::message::{Address, Message};

use super::registry::MailerRegistry;
use super::{load_message, Mailer};

/// Sender options applied to every outgoing message.
#[derive(Debug, Clone, Default)]
pub struct SenderDefaults {
    pub from_email: String,
    pub from_name: String,
    pub force_from_email: bool,
    pub force_from_name: bool,
    /// Use the sender address as envelope return path.
    pub return_path: bool,
}

impl SenderDefaults {
    pub fn from_config(config: &Config) -> Self {
        Self {
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            force_from_email: config.force_from_email,
            force_from_name: config.force_from_name,
            return_path: config.return_path,
        }
    }

    /// Fill in or force the sender. The configured address replaces the
    /// message's when forced or when the message has none.
    pub fn apply(&self, message: &mut Message) {
        let current = message.from.take();

        let email = match &current {
            Some(from) if !self.force_from_email || self.from_email.is_empty() => from.email.clone(),
            _ => self.from_email.clone(),
        };
        let name = match current.as_ref().and_then(|f| f.name.clone()) {
            Some(name) if !self.force_from_name => name,
            _ => self.from_name.clone(),
        };

        message.from = Address::with_name(&email, &name).or(current);

        if self.return_path && message.return_path.is_none() {
            if let Some(from) = &message.from {
                message.return_path = Some(from.email.clone());
            }
        }
    }
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SendReport {
    pub mailer: String,
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub debug: String,
}

impl SendReport {
    fn failed(mailer: &str, error: impl Into<String>) -> Self {
        Self {
            mailer: mailer.to_string(),
            sent: false,
            message_id: None,
            error: Some(error.into()),
            debug: String::new(),
        }
    }

    fn from_mailer(mailer: &dyn Mailer) -> Self {
        Self {
            mailer: mailer.slug().to_string(),
            sent: mailer.is_email_sent(),
            message_id: mailer.message_id().map(str::to_string),
            error: mailer.get_response_error(),
            debug: mailer.get_debug_info(),
        }
    }
}

/// Sends messages through the mailer selected by configuration.
#[derive(Clone)]
pub struct Dispatcher {
    registry: MailerRegistry,
    active: String,
    defaults: SenderDefaults,
}

impl Dispatcher {
    pub fn new(registry: MailerRegistry, active: impl Into<String>, defaults: SenderDefaults) -> Self {
        Self {
            registry,
            active: active.into(),
            defaults,
        }
    }

    pub fn active_mailer(&self) -> &str {
        &self.active
    }

    pub fn registry(&self) -> &MailerRegistry {
        &self.registry
    }

    /// Build a fresh adapter for the active mailer, load `message` and send.
    pub async fn send(&self, message: &Message) -> SendReport {
        let Some(mut mailer) = self.registry.create(&self.active) else {
            return SendReport::failed(&self.active, format!("unknown mailer: {}", self.active));
        };

        let mut message = message.clone();
        self.defaults.apply(&mut message);
        load_message(mailer.as_mut(), &message);

        let sent = mailer.send().await;
        let report = SendReport::from_mailer(mailer.as_ref());

        if sent {
            info!(
                mailer = %report.mailer,
                message_id = report.message_id.as_deref().unwrap_or_default(),
                "email_sent"
            );
        } else {
            warn!(
                mailer = %report.mailer,
                error = report.error.as_deref().unwrap_or_default(),
                "email_send_failed"
            );
        }

        report
    }
}
