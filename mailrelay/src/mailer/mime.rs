//! MIME assembly with lettre.
//!
//! Used by the SMTP and sendmail adapters and by providers that accept a raw
//! message (Amazon SES). Part layout:
//!
//! ```text
//! mixed
//! ├── related
//! │   ├── alternative (text, html)
//! │   └── inline parts (Content-ID)
//! └── attachments
//! ```
//!
//! Levels with nothing to wrap are collapsed.

use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{
    Attachment as MimeAttachment, Mailbox, MultiPart, MultiPartBuilder, SinglePart,
};
use lettre::address::Envelope;
use lettre::{Address as MailAddress, Message as MimeMessage};

use crate::message::{Address, RecipientKind};

use super::draft::Draft;
use super::template::LoadedAttachment;
use super::transport::TransportError;

/// A built message and the SMTP envelope it should travel in.
pub struct BuiltMessage {
    pub message: MimeMessage,
    pub envelope: Envelope,
}

impl BuiltMessage {
    /// RFC 5322 bytes. Bcc recipients are not part of the headers.
    pub fn formatted(&self) -> Vec<u8> {
        self.message.formatted()
    }
}

enum Part {
    Single(SinglePart),
    Multi(MultiPart),
}

impl Part {
    /// Open a new multipart level with this part first.
    fn wrap(self, builder: MultiPartBuilder) -> MultiPart {
        match self {
            Part::Single(part) => builder.singlepart(part),
            Part::Multi(part) => builder.multipart(part),
        }
    }
}

/// Build a complete MIME message from the draft.
pub fn build_message(draft: &Draft) -> Result<BuiltMessage, TransportError> {
    let from = draft
        .from
        .as_ref()
        .ok_or_else(|| TransportError::Build("missing from address".to_string()))?;

    let mut builder = MimeMessage::builder()
        .from(mailbox(from)?)
        .subject(draft.subject.clone());

    for kind in RecipientKind::ALL {
        for address in draft.recipients(kind) {
            let mailbox = mailbox(address)?;
            builder = match kind {
                RecipientKind::To => builder.to(mailbox),
                RecipientKind::Cc => builder.cc(mailbox),
                RecipientKind::Bcc => builder.bcc(mailbox),
            };
        }
    }

    for address in &draft.reply_to {
        builder = builder.reply_to(mailbox(address)?);
    }

    for (name, value) in &draft.headers {
        let name = HeaderName::new_from_ascii(name.clone())
            .map_err(|e| TransportError::Build(format!("header {}: {}", name, e)))?;
        builder = builder.raw_header(HeaderValue::new(name, value.clone()));
    }

    let message = match body(draft)? {
        Part::Single(part) => builder.singlepart(part),
        Part::Multi(part) => builder.multipart(part),
    }
    .map_err(|e| TransportError::Build(e.to_string()))?;

    let envelope = match &draft.return_path {
        Some(return_path) => Envelope::new(
            Some(parse_address(return_path)?),
            message.envelope().to().to_vec(),
        )
        .map_err(|e| TransportError::Build(e.to_string()))?,
        None => message.envelope().clone(),
    };

    Ok(BuiltMessage { message, envelope })
}

fn body(draft: &Draft) -> Result<Part, TransportError> {
    let content = match (&draft.content.text, &draft.content.html) {
        (Some(text), Some(html)) => {
            Part::Multi(MultiPart::alternative_plain_html(text.clone(), html.clone()))
        }
        (None, Some(html)) => Part::Single(SinglePart::html(html.clone())),
        (Some(text), None) => Part::Single(SinglePart::plain(text.clone())),
        (None, None) => Part::Single(SinglePart::plain(String::new())),
    };

    let mut inline = draft.inline_attachments().peekable();
    let content = if inline.peek().is_some() {
        let mut related = content.wrap(MultiPart::related());
        for attachment in inline {
            related = related.singlepart(attachment_part(attachment)?);
        }
        Part::Multi(related)
    } else {
        content
    };

    let mut regular = draft.regular_attachments().peekable();
    if regular.peek().is_none() {
        return Ok(content);
    }

    let mut mixed = content.wrap(MultiPart::mixed());
    for attachment in regular {
        mixed = mixed.singlepart(attachment_part(attachment)?);
    }
    Ok(Part::Multi(mixed))
}

fn attachment_part(attachment: &LoadedAttachment) -> Result<SinglePart, TransportError> {
    let content_type = ContentType::parse(&attachment.mime_type)
        .or_else(|_| ContentType::parse("application/octet-stream"))
        .map_err(|e| TransportError::Build(e.to_string()))?;

    let part = match attachment.cid() {
        Some(cid) => MimeAttachment::new_inline(cid.to_string()),
        None => MimeAttachment::new(attachment.filename.clone()),
    };
    Ok(part.body(attachment.data.clone(), content_type))
}

fn mailbox(address: &Address) -> Result<Mailbox, TransportError> {
    Ok(Mailbox::new(address.name.clone(), parse_address(&address.email)?))
}

fn parse_address(email: &str) -> Result<MailAddress, TransportError> {
    email
        .parse::<MailAddress>()
        .map_err(|e| TransportError::Build(format!("address {}: {}", email, e)))
}
