//! Mailer abstraction and provider adapters.
//!
//! Every delivery path, from raw SMTP to HTTP transactional APIs, is driven
//! through the same [`Mailer`] trait:
//!
//! 1. the setters fill an owned [`Draft`] (in any order),
//! 2. [`Mailer::send`] assembles the provider payload in one finalize step
//!    and performs a single outbound call,
//! 3. the inspection methods explain what happened.
//!
//! Adapters are single-use: build a fresh one per message, usually through
//! the [`MailerRegistry`].

pub mod dispatch;
pub mod draft;
pub mod http;
pub mod mime;
pub mod providers;
pub mod registry;
pub mod sigv4;
pub mod smtp;
pub mod template;
pub mod transport;

pub use dispatch::{Dispatcher, SendReport, SenderDefaults};
pub use draft::Draft;
pub use http::{ApiProvider, HttpMailer};
pub use registry::{MailerEntry, MailerRegistry};
pub use smtp::SmtpMailer;
pub use template::LoadedAttachment;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};

use async_trait::async_trait;

use crate::message::{is_valid_email, Address, Attachment, Content, Message, Recipient};

/// Uniform interface over every delivery provider.
#[async_trait]
pub trait Mailer: Send {
    /// Registry slug, e.g. `sendgrid`.
    fn slug(&self) -> &'static str;

    /// Human readable provider name.
    fn title(&self) -> &'static str;

    fn draft(&self) -> &Draft;

    fn draft_mut(&mut self) -> &mut Draft;

    fn set_from(&mut self, email: &str, name: &str) {
        if let Some(address) = Address::with_name(email, name) {
            self.draft_mut().from = Some(address);
        }
    }

    /// Replace the recipient list. Addresses are validated again; invalid
    /// ones never reach the payload.
    fn set_recipients(&mut self, recipients: &[Recipient]) {
        let draft = self.draft_mut();
        draft.recipients = recipients
            .iter()
            .filter(|r| is_valid_email(&r.address.email))
            .cloned()
            .collect();
    }

    fn set_subject(&mut self, subject: &str) {
        self.draft_mut().subject = subject.replace(['\r', '\n'], " ");
    }

    fn set_content(&mut self, content: Content) {
        self.draft_mut().content = content;
    }

    /// Load attachment bytes. Unreadable files are skipped.
    fn set_attachments(&mut self, attachments: &[Attachment]) {
        self.draft_mut().attachments = template::load_attachments(attachments);
    }

    fn set_reply_to(&mut self, addresses: &[Address]) {
        self.draft_mut().reply_to = addresses
            .iter()
            .filter(|a| is_valid_email(&a.email))
            .cloned()
            .collect();
    }

    fn set_return_path(&mut self, email: &str) {
        let email = email.trim();
        if is_valid_email(email) {
            self.draft_mut().return_path = Some(email.to_string());
        }
    }

    /// Custom headers, minus the ones the adapter derives itself.
    fn set_headers(&mut self, headers: &[(String, String)]) {
        self.draft_mut().headers = template::sanitize_headers(headers);
    }

    /// Assemble the payload and perform the outbound call. Failures are
    /// recorded on the adapter; nothing escapes.
    async fn send(&mut self) -> bool;

    fn is_email_sent(&self) -> bool;

    /// Whether every required setting is present.
    fn is_mailer_complete(&self) -> bool;

    /// Why the last send failed, if it did.
    fn get_response_error(&self) -> Option<String>;

    /// Request and response details with credentials masked.
    fn get_debug_info(&self) -> String;

    /// Provider-assigned id of the sent message.
    fn message_id(&self) -> Option<&str>;

    /// Headers recorded for the outgoing message, including `X-Msg-ID`
    /// once a provider id is known.
    fn outgoing_headers(&self) -> &[(String, String)];
}

/// Feed a message through every setter, attachments last.
pub fn load_message(mailer: &mut dyn Mailer, message: &Message) {
    if let Some(from) = &message.from {
        mailer.set_from(&from.email, from.name.as_deref().unwrap_or_default());
    }
    mailer.set_recipients(&message.recipients);
    mailer.set_reply_to(&message.reply_to);
    mailer.set_subject(&message.subject);
    mailer.set_content(message.content());
    if let Some(return_path) = &message.return_path {
        mailer.set_return_path(return_path);
    }
    mailer.set_headers(&message.headers);
    mailer.set_attachments(&message.attachments);
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the adapter tests.

    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::MailerSettings;
    use crate::message::{Address, Attachment, Message, Recipient, RecipientKind};
    use crate::mocks::MockTransport;

    use super::transport::RequestBody;
    use super::{load_message, ApiProvider, Draft, HttpMailer, HttpRequest, HttpResponse, Mailer};

    /// A message with valid and invalid recipients of every kind, both body
    /// parts, one inline image and one regular attachment.
    pub fn sample_message() -> Message {
        let mut message = Message::builder()
            .from("app@example.com", "App")
            .to("user@example.com", "User")
            .to("not-an-address", "Broken")
            .cc("copy@example.com", "")
            .cc("@example.com", "")
            .bcc("hidden@example.com", "")
            .bcc("hidden at example.com", "")
            .reply_to("support@example.com", "Support")
            .subject("Welcome")
            .text("Hello there")
            .html("<p>Hello <img src=\"cid:logo\"></p>")
            .header("X-Campaign", "spring")
            .attachment(Attachment::from_bytes(b"PNG".to_vec(), Some("logo.png")).inline("logo"))
            .attachment(Attachment::from_bytes(b"PDF".to_vec(), Some("terms.pdf")))
            .build();

        // Snapshots edited outside the builder can still carry bad addresses.
        message.recipients.push(Recipient {
            kind: RecipientKind::Cc,
            address: Address {
                email: "not-an-address".to_string(),
                name: None,
            },
        });
        message
    }

    /// Mailer that only collects what the setters produce.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub draft: Draft,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        fn slug(&self) -> &'static str {
            "recording"
        }

        fn title(&self) -> &'static str {
            "Recording"
        }

        fn draft(&self) -> &Draft {
            &self.draft
        }

        fn draft_mut(&mut self) -> &mut Draft {
            &mut self.draft
        }

        async fn send(&mut self) -> bool {
            false
        }

        fn is_email_sent(&self) -> bool {
            false
        }

        fn is_mailer_complete(&self) -> bool {
            true
        }

        fn get_response_error(&self) -> Option<String> {
            None
        }

        fn get_debug_info(&self) -> String {
            String::new()
        }

        fn message_id(&self) -> Option<&str> {
            None
        }

        fn outgoing_headers(&self) -> &[(String, String)] {
            &[]
        }
    }

    /// The draft produced by loading [`sample_message`].
    pub fn sample_draft() -> Draft {
        let mut mailer = RecordingMailer::default();
        load_message(&mut mailer, &sample_message());
        mailer.draft
    }

    /// Request body as readable text, whatever its encoding.
    pub fn body_text(request: &HttpRequest) -> String {
        match &request.body {
            RequestBody::Form(fields) => fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::from_utf8_lossy(&request.body_bytes()).into_owned(),
        }
    }

    /// The sample's valid recipients are all present and the invalid ones
    /// are not.
    pub fn assert_valid_recipients_only(request: &HttpRequest) {
        let body = body_text(request);
        for valid in ["user@example.com", "copy@example.com", "hidden@example.com"] {
            assert!(body.contains(valid), "missing {} in {}", valid, body);
        }
        for invalid in ["not-an-address", "hidden at example.com", "\"@example.com"] {
            assert!(!body.contains(invalid), "unexpected {} in {}", invalid, body);
        }
    }

    /// Build an adapter over a mock transport and load the sample message.
    pub fn loaded<P: ApiProvider>(
        pairs: &[(&str, &str)],
        response: HttpResponse,
    ) -> (HttpMailer<P>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(response));
        let settings = MailerSettings::from_pairs(P::SLUG, pairs.iter().copied());
        let mut mailer = HttpMailer::<P>::new(settings, transport.clone());
        load_message(&mut mailer, &sample_message());
        (mailer, transport)
    }
}
