//! In-memory representation of an outgoing email.
//!
//! A [`Message`] knows nothing about providers. All mutators are best-effort:
//! malformed addresses and empty values are dropped instead of failing, so
//! that something can always be sent.
//!
//! ```ignore
//! let message = Message::builder()
//!     .from("app@example.com", "My App")
//!     .to("user@example.com", "")
//!     .subject("Welcome!")
//!     .text("Thanks for signing up.")
//!     .build();
//! ```

mod address;
mod attachment;

pub use address::{is_valid_email, Address};
pub use attachment::{generated_filename, Attachment, AttachmentSource, Disposition};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Recipient partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    To,
    Cc,
    Bcc,
}

impl RecipientKind {
    /// Every kind, in the order adapters translate them.
    pub const ALL: [RecipientKind; 3] = [Self::To, Self::Cc, Self::Bcc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::To => "to",
            Self::Cc => "cc",
            Self::Bcc => "bcc",
        }
    }
}

/// A validated address tagged with its recipient kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub kind: RecipientKind,
    #[serde(flatten)]
    pub address: Address,
}

/// How a single-string body should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    #[serde(rename = "text/plain")]
    Plain,
    #[serde(rename = "text/html")]
    Html,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "text/plain",
            Self::Html => "text/html",
        }
    }
}

/// Body as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    /// One string; [`ContentType`] decides whether it is text or HTML.
    Single(String),
    /// Explicit parts, either or both of which may be present.
    Parts {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        html: Option<String>,
    },
}

impl Default for Body {
    fn default() -> Self {
        Self::Single(String::new())
    }
}

/// Body resolved into its text and HTML parts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Content {
    pub text: Option<String>,
    pub html: Option<String>,
}

impl Content {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.html.is_none()
    }

    pub fn has_both(&self) -> bool {
        self.text.is_some() && self.html.is_some()
    }
}

/// An outgoing email.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub reply_to: Vec<Address>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: Body,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_path: Option<String>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Set the sender. An invalid address leaves the current sender untouched.
    pub fn set_from(&mut self, email: &str, name: &str) {
        match Address::with_name(email, name) {
            Some(address) => self.from = Some(address),
            None => debug!(email = %email, "message_invalid_from_dropped"),
        }
    }

    /// Add a recipient. Invalid or duplicate addresses are dropped.
    pub fn add_recipient(&mut self, kind: RecipientKind, email: &str, name: &str) {
        let Some(address) = Address::with_name(email, name) else {
            debug!(email = %email, kind = kind.as_str(), "message_invalid_recipient_dropped");
            return;
        };

        let duplicate = self
            .recipients
            .iter()
            .any(|r| r.kind == kind && r.address.email.eq_ignore_ascii_case(&address.email));
        if !duplicate {
            self.recipients.push(Recipient { kind, address });
        }
    }

    pub fn add_reply_to(&mut self, email: &str, name: &str) {
        match Address::with_name(email, name) {
            Some(address) if !self.reply_to.contains(&address) => self.reply_to.push(address),
            Some(_) => {}
            None => debug!(email = %email, "message_invalid_reply_to_dropped"),
        }
    }

    pub fn set_subject(&mut self, subject: &str) {
        self.subject = subject.replace(['\r', '\n'], " ");
    }

    /// Set a single-string body interpreted according to the content type.
    pub fn set_body(&mut self, body: &str, content_type: ContentType) {
        self.body = Body::Single(body.to_string());
        self.content_type = content_type;
    }

    pub fn set_text(&mut self, text: &str) {
        let html = match std::mem::take(&mut self.body) {
            Body::Parts { html, .. } => html,
            Body::Single(_) => None,
        };
        self.body = Body::Parts {
            text: Some(text.to_string()),
            html,
        };
    }

    pub fn set_html(&mut self, html: &str) {
        let text = match std::mem::take(&mut self.body) {
            Body::Parts { text, .. } => text,
            Body::Single(_) => None,
        };
        self.body = Body::Parts {
            text,
            html: Some(html.to_string()),
        };
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment.normalized());
    }

    /// Add a custom header. Empty names and values containing line breaks
    /// are rejected to keep header injection out.
    pub fn add_header(&mut self, name: &str, value: &str) {
        let name = name.trim();
        if name.is_empty()
            || name.contains(|c: char| c == ':' || c.is_whitespace() || c.is_control())
            || value.contains(['\r', '\n'])
        {
            debug!(header = %name, "message_invalid_header_dropped");
            return;
        }
        self.headers.push((name.to_string(), value.trim().to_string()));
    }

    pub fn set_return_path(&mut self, email: &str) {
        if is_valid_email(email.trim()) {
            self.return_path = Some(email.trim().to_string());
        }
    }

    /// Recipients of one kind, in insertion order.
    pub fn recipients(&self, kind: RecipientKind) -> impl Iterator<Item = &Address> {
        self.recipients
            .iter()
            .filter(move |r| r.kind == kind)
            .map(|r| &r.address)
    }

    /// Resolve the body into explicit parts.
    pub fn content(&self) -> Content {
        match &self.body {
            Body::Single(body) => match self.content_type {
                ContentType::Plain => Content {
                    text: Some(body.clone()),
                    html: None,
                },
                ContentType::Html => Content {
                    text: None,
                    html: Some(body.clone()),
                },
            },
            Body::Parts { text, html } => Content {
                text: text.clone(),
                html: html.clone(),
            },
        }
    }
}

/// Fluent construction of a [`Message`].
#[derive(Debug, Default)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    pub fn from(mut self, email: &str, name: &str) -> Self {
        self.message.set_from(email, name);
        self
    }

    pub fn to(mut self, email: &str, name: &str) -> Self {
        self.message.add_recipient(RecipientKind::To, email, name);
        self
    }

    pub fn cc(mut self, email: &str, name: &str) -> Self {
        self.message.add_recipient(RecipientKind::Cc, email, name);
        self
    }

    pub fn bcc(mut self, email: &str, name: &str) -> Self {
        self.message.add_recipient(RecipientKind::Bcc, email, name);
        self
    }

    pub fn reply_to(mut self, email: &str, name: &str) -> Self {
        self.message.add_reply_to(email, name);
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.message.set_subject(subject);
        self
    }

    pub fn body(mut self, body: &str, content_type: ContentType) -> Self {
        self.message.set_body(body, content_type);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.message.set_text(text);
        self
    }

    pub fn html(mut self, html: &str) -> Self {
        self.message.set_html(html);
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.message.add_attachment(attachment);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.message.add_header(name, value);
        self
    }

    pub fn return_path(mut self, email: &str) -> Self {
        self.message.set_return_path(email);
        self
    }

    pub fn build(self) -> Message {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_recipients_are_dropped() {
        let message = Message::builder()
            .to("good@example.com", "Good")
            .to("not an email", "Bad")
            .cc("also-bad@", "")
            .bcc("hidden@example.com", "")
            .build();

        assert_eq!(message.recipients.len(), 2);
        assert_eq!(message.recipients(RecipientKind::To).count(), 1);
        assert_eq!(message.recipients(RecipientKind::Cc).count(), 0);
        assert_eq!(message.recipients(RecipientKind::Bcc).count(), 1);
    }

    #[test]
    fn test_duplicate_recipient_ignored() {
        let message = Message::builder()
            .to("a@example.com", "")
            .to("A@example.com", "Again")
            .cc("a@example.com", "")
            .build();

        assert_eq!(message.recipients(RecipientKind::To).count(), 1);
        assert_eq!(message.recipients(RecipientKind::Cc).count(), 1);
    }

    #[test]
    fn test_invalid_from_keeps_previous() {
        let mut message = Message::new();
        message.set_from("app@example.com", "App");
        message.set_from("broken", "Broken");
        assert_eq!(message.from.unwrap().email, "app@example.com");
    }

    #[test]
    fn test_single_body_follows_content_type() {
        let plain = Message::builder().body("hello", ContentType::Plain).build();
        assert_eq!(plain.content().text.as_deref(), Some("hello"));
        assert!(plain.content().html.is_none());

        let html = Message::builder().body("<p>hi</p>", ContentType::Html).build();
        assert_eq!(html.content().html.as_deref(), Some("<p>hi</p>"));
        assert!(html.content().text.is_none());
    }

    #[test]
    fn test_text_and_html_parts_combine() {
        let message = Message::builder().html("<b>x</b>").text("x").build();
        let content = message.content();
        assert!(content.has_both());
        assert_eq!(content.text.as_deref(), Some("x"));
        assert_eq!(content.html.as_deref(), Some("<b>x</b>"));
    }

    #[test]
    fn test_header_injection_rejected() {
        let message = Message::builder()
            .header("X-Campaign", "spring")
            .header("X-Evil", "a\r\nBcc: victim@example.com")
            .header("Bad Name", "v")
            .header("", "v")
            .build();

        assert_eq!(message.headers, vec![("X-Campaign".to_string(), "spring".to_string())]);
    }

    #[test]
    fn test_subject_line_breaks_flattened() {
        let message = Message::builder().subject("Hello\r\nWorld").build();
        assert_eq!(message.subject, "Hello  World");
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let message = Message::builder()
            .from("app@example.com", "App")
            .to("user@example.com", "User")
            .subject("Hi")
            .text("hello")
            .attachment(Attachment::from_bytes(b"data".to_vec(), Some("a.txt")))
            .build();

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["recipients"][0]["kind"], "to");
        assert_eq!(json["recipients"][0]["email"], "user@example.com");

        let restored: Message = serde_json::from_value(json).unwrap();
        assert_eq!(restored, message);
    }
}
