//! Generic adapter for HTTP transactional email APIs.
//!
//! An [`ApiProvider`] describes one provider: how to turn a [`Draft`] into a
//! request and how to read the response. [`HttpMailer`] supplies everything
//! else: the setters, the send lifecycle, error and debug reporting.

use std::fmt::Write as _;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::MailerSettings;

use super::draft::Draft;
use super::template;
use super::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use super::Mailer;

/// Provider-specific half of an HTTP adapter.
pub trait ApiProvider: Send + Sync + 'static {
    const SLUG: &'static str;
    const TITLE: &'static str;

    /// Status code that means "accepted".
    const SUCCESS_CODE: u16 = 200;

    /// Settings that must be non-empty before anything is sent.
    const REQUIRED: &'static [&'static str];

    /// Every setting the adapter reads, including optional ones.
    const SETTINGS: &'static [&'static str];

    /// Finalize step: assemble the request from whatever was set.
    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError>;

    /// Whether the response confirms delivery. Defaults to the status code
    /// alone; providers with a success marker override this.
    fn is_sent(response: &HttpResponse) -> bool {
        template::status_matches(response, Self::SUCCESS_CODE)
    }

    /// Provider-assigned message id, if the response carries one.
    fn message_id(response: &HttpResponse) -> Option<String> {
        response
            .header("X-Message-Id")
            .map(str::to_string)
            .filter(|id| !id.is_empty())
    }

    /// Error text in the provider's own shape. `None` falls back to the
    /// generic formatter.
    fn error_message(_response: &HttpResponse) -> Option<String> {
        None
    }
}

/// A single-use [`Mailer`] speaking to one HTTP provider.
pub struct HttpMailer<P: ApiProvider> {
    settings: MailerSettings,
    transport: Arc<dyn HttpTransport>,
    draft: Draft,
    attempted: bool,
    sent: bool,
    request: Option<HttpRequest>,
    response: Option<HttpResponse>,
    error: Option<TransportError>,
    message_id: Option<String>,
    outgoing_headers: Vec<(String, String)>,
    _provider: PhantomData<P>,
}

impl<P: ApiProvider> HttpMailer<P> {
    pub fn new(settings: MailerSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
            draft: Draft::default(),
            attempted: false,
            sent: false,
            request: None,
            response: None,
            error: None,
            message_id: None,
            outgoing_headers: Vec::new(),
            _provider: PhantomData,
        }
    }

    pub fn settings(&self) -> &MailerSettings {
        &self.settings
    }

    /// The last request handed to the transport.
    pub fn last_request(&self) -> Option<&HttpRequest> {
        self.request.as_ref()
    }

    pub fn last_response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    fn record_response(&mut self, response: HttpResponse) {
        self.sent = P::is_sent(&response);

        if self.sent {
            self.message_id = P::message_id(&response);
            if let Some(id) = &self.message_id {
                self.outgoing_headers.push(("X-Msg-ID".to_string(), id.clone()));
            }
            info!(
                mailer = P::SLUG,
                status_code = response.status,
                message_id = self.message_id.as_deref().unwrap_or_default(),
                "mailer_send_accepted"
            );
        } else {
            warn!(
                mailer = P::SLUG,
                status_code = response.status,
                "mailer_send_rejected"
            );
        }

        self.response = Some(response);
    }
}

#[async_trait]
impl<P: ApiProvider> Mailer for HttpMailer<P> {
    fn slug(&self) -> &'static str {
        P::SLUG
    }

    fn title(&self) -> &'static str {
        P::TITLE
    }

    fn draft(&self) -> &Draft {
        &self.draft
    }

    fn draft_mut(&mut self) -> &mut Draft {
        &mut self.draft
    }

    async fn send(&mut self) -> bool {
        if self.attempted {
            warn!(mailer = P::SLUG, "mailer_reused");
            return self.sent;
        }
        self.attempted = true;

        let missing = self.settings.missing(P::REQUIRED);
        if !missing.is_empty() {
            warn!(mailer = P::SLUG, missing = ?missing, "mailer_not_configured");
            self.error = Some(TransportError::NotConfigured(missing.join(", ")));
            return false;
        }

        let request = match P::build_request(&self.settings, &self.draft) {
            Ok(request) => request,
            Err(e) => {
                warn!(mailer = P::SLUG, error = %e, "mailer_build_failed");
                self.error = Some(e);
                return false;
            }
        };

        self.outgoing_headers = self.draft.headers.clone();
        self.request = Some(request.clone());

        match self.transport.execute(request).await {
            Ok(response) => self.record_response(response),
            Err(e) => {
                warn!(mailer = P::SLUG, error = %e, "mailer_transport_failed");
                self.error = Some(e);
            }
        }

        self.sent
    }

    fn is_email_sent(&self) -> bool {
        self.sent
    }

    fn is_mailer_complete(&self) -> bool {
        self.settings.has_all(P::REQUIRED)
    }

    fn get_response_error(&self) -> Option<String> {
        if self.sent || !self.attempted {
            return None;
        }
        if let Some(error) = &self.error {
            return Some(error.to_string());
        }
        let response = self.response.as_ref()?;
        Some(
            P::error_message(response)
                .filter(|m| !m.is_empty())
                .map(|m| template::with_status(response, &m))
                .unwrap_or_else(|| template::generic_error(response)),
        )
    }

    fn get_debug_info(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Mailer: {} ({})", P::TITLE, P::SLUG);

        if let Some(request) = &self.request {
            let _ = writeln!(out, "Request: {} {}", request.method, request.url);
            for (name, value) in template::redact_headers(&request.headers) {
                let _ = writeln!(out, "  {}: {}", name, value);
            }
        }

        match (&self.response, &self.error) {
            (Some(response), _) => {
                let _ = writeln!(out, "Response: {} {}", response.status, response.reason());
                let _ = writeln!(out, "  {}", template::excerpt(response.body.trim()));
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
