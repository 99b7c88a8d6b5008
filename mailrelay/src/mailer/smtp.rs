//! SMTP and local sendmail delivery through lettre.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSendmailTransport, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{info, warn};

use crate::config::MailerSettings;

use super::draft::Draft;
use super::mime::{build_message, BuiltMessage};
use super::transport::TransportError;
use super::Mailer;

pub const SMTP_SETTINGS: &[&str] = &[
    "host",
    "port",
    "encryption",
    "autotls",
    "auth",
    "user",
    "pass",
    "timeout",
];

pub const SENDMAIL_SETTINGS: &[&str] = &["sendmail_path"];

const DEFAULT_PORT: u16 = 587;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Smtp,
    Sendmail,
}

/// Mailer for the `smtp` and `mail` slugs.
pub struct SmtpMailer {
    route: Route,
    settings: MailerSettings,
    draft: Draft,
    attempted: bool,
    sent: bool,
    reply: Option<String>,
    error: Option<TransportError>,
    message_id: Option<String>,
    outgoing_headers: Vec<(String, String)>,
}

impl SmtpMailer {
    /// Deliver through an SMTP relay.
    pub fn smtp(settings: MailerSettings) -> Self {
        Self::with_route(Route::Smtp, settings)
    }

    /// Deliver through the local sendmail binary.
    pub fn sendmail(settings: MailerSettings) -> Self {
        Self::with_route(Route::Sendmail, settings)
    }

    fn with_route(route: Route, settings: MailerSettings) -> Self {
        Self {
            route,
            settings,
            draft: Draft::default(),
            attempted: false,
            sent: false,
            reply: None,
            error: None,
            message_id: None,
            outgoing_headers: Vec::new(),
        }
    }

    fn required(&self) -> Vec<&'static str> {
        match self.route {
            Route::Sendmail => Vec::new(),
            Route::Smtp if self.settings.flag("auth") => vec!["host", "user", "pass"],
            Route::Smtp => vec!["host"],
        }
    }

    fn port(&self) -> u16 {
        self.settings
            .get("port")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    fn timeout(&self) -> Duration {
        let secs = self
            .settings
            .get("timeout")
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    fn smtp_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let host = self.settings.get_or("host", "");
        let tls_params = || {
            TlsParameters::new(host.to_string()).map_err(|e| TransportError::Smtp(e.to_string()))
        };

        let tls = match self.settings.get_or("encryption", "none").to_lowercase().as_str() {
            "ssl" => Tls::Wrapper(tls_params()?),
            "tls" => Tls::Required(tls_params()?),
            _ if self.settings.flag("autotls") => Tls::Opportunistic(tls_params()?),
            _ => Tls::None,
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(self.port())
            .tls(tls)
            .timeout(Some(self.timeout()));

        if self.settings.flag("auth") {
            builder = builder.credentials(Credentials::new(
                self.settings.get_or("user", "").to_string(),
                self.settings.get_or("pass", "").to_string(),
            ));
        }

        Ok(builder.build())
    }

    async fn deliver(&self, built: &BuiltMessage) -> Result<String, TransportError> {
        let raw = built.formatted();

        match self.route {
            Route::Smtp => {
                let transport = self.smtp_transport()?;
                let response = transport
                    .send_raw(&built.envelope, &raw)
                    .await
                    .map_err(|e| TransportError::Smtp(e.to_string()))?;
                Ok(format!(
                    "{} {}",
                    response.code(),
                    response.message().collect::<Vec<_>>().join(" ")
                ))
            }
            Route::Sendmail => {
                let transport = match self.settings.get("sendmail_path") {
                    Some(path) => AsyncSendmailTransport::<Tokio1Executor>::new_with_command(path),
                    None => AsyncSendmailTransport::<Tokio1Executor>::new(),
                };
                transport
                    .send_raw(&built.envelope, &raw)
                    .await
                    .map_err(|e| TransportError::Smtp(e.to_string()))?;
                Ok("sendmail accepted".to_string())
            }
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn slug(&self) -> &'static str {
        match self.route {
            Route::Smtp => "smtp",
            Route::Sendmail => "mail",
        }
    }

    fn title(&self) -> &'static str {
        match self.route {
            Route::Smtp => "Other SMTP",
            Route::Sendmail => "Default (sendmail)",
        }
    }

    fn draft(&self) -> &Draft {
        &self.draft
    }

    fn draft_mut(&mut self) -> &mut Draft {
        &mut self.draft
    }

    async fn send(&mut self) -> bool {
        if self.attempted {
            warn!(mailer = self.slug(), "mailer_reused");
            return self.sent;
        }
        self.attempted = true;

        let missing = self.settings.missing(&self.required());
        if !missing.is_empty() {
            warn!(mailer = self.slug(), missing = ?missing, "mailer_not_configured");
            self.error = Some(TransportError::NotConfigured(missing.join(", ")));
            return false;
        }

        let built = match build_message(&self.draft) {
            Ok(built) => built,
            Err(e) => {
                warn!(mailer = self.slug(), error = %e, "mailer_build_failed");
                self.error = Some(e);
                return false;
            }
        };

        self.outgoing_headers = self.draft.headers.clone();
        let message_id = built
            .message
            .headers()
            .get_raw("Message-ID")
            .map(|id| id.trim_matches(|c| c == '<' || c == '>').to_string());

        match self.deliver(&built).await {
            Ok(reply) => {
                self.sent = true;
                if let Some(id) = &message_id {
                    self.outgoing_headers.push(("X-Msg-ID".to_string(), id.clone()));
                }
                self.message_id = message_id;
                info!(mailer = self.slug(), reply = %reply, "mailer_send_accepted");
                self.reply = Some(reply);
            }
            Err(e) => {
                warn!(mailer = self.slug(), error = %e, "mailer_transport_failed");
                self.error = Some(e);
            }
        }

        self.sent
    }

    fn is_email_sent(&self) -> bool {
        self.sent
    }

    fn is_mailer_complete(&self) -> bool {
        self.settings.has_all(&self.required())
    }

    fn get_response_error(&self) -> Option<String> {
        if self.sent {
            return None;
        }
        self.error.as_ref().map(ToString::to_string)
    }

    fn get_debug_info(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Mailer: {} ({})", self.title(), self.slug());

        if self.route == Route::Smtp {
            let _ = writeln!(
                out,
                "Server: {}:{} encryption={} auth={}",
                self.settings.get_or("host", "-"),
                self.port(),
                self.settings.get_or("encryption", "none"),
                self.settings.flag("auth")
            );
        }

        match (&self.reply, &self.error) {
            (Some(reply), _) => {
                let _ = writeln!(out, "Reply: {}", reply);
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "Error: {}", error);
            }
            (None, None) => {
                let _ = writeln!(out, "Not sent");
            }
        }
        out
    }

    fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    fn outgoing_headers(&self) -> &[(String, String)] {
        &self.outgoing_headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::load_message;
    use crate::mailer::test_support::sample_message;

    #[test]
    fn test_required_settings_follow_auth_flag() {
        let plain = SmtpMailer::smtp(MailerSettings::from_pairs("smtp", [("host", "mx.example.com")]));
        assert!(plain.is_mailer_complete());

        let auth = SmtpMailer::smtp(MailerSettings::from_pairs(
            "smtp",
            [("host", "mx.example.com"), ("auth", "true"), ("user", "me")],
        ));
        assert!(!auth.is_mailer_complete());

        assert!(SmtpMailer::sendmail(MailerSettings::new("mail")).is_mailer_complete());
    }

    #[tokio::test]
    async fn test_missing_host_is_reported() {
        let mut mailer = SmtpMailer::smtp(MailerSettings::new("smtp"));
        load_message(&mut mailer, &sample_message());

        assert!(!mailer.send().await);
        assert!(mailer.get_response_error().unwrap().contains("host"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_captured() {
        let mut mailer = SmtpMailer::smtp(MailerSettings::from_pairs(
            "smtp",
            [("host", "127.0.0.1"), ("port", "1"), ("timeout", "2")],
        ));
        load_message(&mut mailer, &sample_message());

        assert!(!mailer.send().await);
        assert!(!mailer.is_email_sent());
        assert!(mailer.get_response_error().is_some());
        assert!(mailer.get_debug_info().contains("127.0.0.1:1"));
    }

    #[test]
    fn test_slugs() {
        assert_eq!(SmtpMailer::smtp(MailerSettings::new("smtp")).slug(), "smtp");
        assert_eq!(SmtpMailer::sendmail(MailerSettings::new("mail")).slug(), "mail");
    }
}
