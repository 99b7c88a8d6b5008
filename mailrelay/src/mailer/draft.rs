//! Per-send scratch state filled by the mailer setters.

use crate::message::{Address, Content, Recipient, RecipientKind};

use super::template::LoadedAttachment;

/// Everything an adapter needs to assemble one request.
///
/// Setters only ever write here; the provider reads it once, in its
/// finalize step, so setter order has no effect on the result.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub from: Option<Address>,
    pub recipients: Vec<Recipient>,
    pub subject: String,
    pub content: Content,
    pub attachments: Vec<LoadedAttachment>,
    pub reply_to: Vec<Address>,
    pub return_path: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl Draft {
    pub fn recipients(&self, kind: RecipientKind) -> impl Iterator<Item = &Address> {
        self.recipients
            .iter()
            .filter(move |r| r.kind == kind)
            .map(|r| &r.address)
    }

    pub fn has_recipients(&self, kind: RecipientKind) -> bool {
        self.recipients(kind).next().is_some()
    }

    /// Attachments referenced from the HTML body by content-id.
    pub fn inline_attachments(&self) -> impl Iterator<Item = &LoadedAttachment> {
        self.attachments.iter().filter(|a| a.is_inline())
    }

    /// Attachments offered for download.
    pub fn regular_attachments(&self) -> impl Iterator<Item = &LoadedAttachment> {
        self.attachments.iter().filter(|a| !a.is_inline())
    }

    pub fn from_email(&self) -> &str {
        self.from.as_ref().map(|a| a.email.as_str()).unwrap_or_default()
    }

    pub fn from_name(&self) -> &str {
        self.from.as_ref().and_then(|a| a.name.as_deref()).unwrap_or_default()
    }

    /// Reply-to list rendered as one comma-separated header value.
    pub fn reply_to_header(&self) -> Option<String> {
        if self.reply_to.is_empty() {
            return None;
        }
        Some(
            self.reply_to
                .iter()
                .map(Address::to_header)
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}
