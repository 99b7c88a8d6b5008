//! Shared building blocks composed by every adapter.
//!
//! Attachment loading, header sanitizing, and response error formatting live
//! here so adapters only describe what differs between providers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tracing::warn;

use crate::message::{Attachment, AttachmentSource, Disposition};

use super::transport::HttpResponse;

/// Headers every adapter derives from the message itself.
const MANAGED_HEADERS: &[&str] = &[
    "from",
    "to",
    "cc",
    "bcc",
    "subject",
    "reply-to",
    "content-type",
    "content-transfer-encoding",
    "mime-version",
    "return-path",
    "sender",
];

/// Longest response body excerpt included in error messages.
const EXCERPT_LENGTH: usize = 300;

/// Attachment bytes read and ready to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAttachment {
    pub filename: String,
    pub mime_type: String,
    pub disposition: Disposition,
    pub content_id: Option<String>,
    pub data: Vec<u8>,
}

impl LoadedAttachment {
    pub fn is_inline(&self) -> bool {
        self.disposition == Disposition::Inline && self.content_id.is_some()
    }

    /// Content-id, only for inline attachments.
    pub fn cid(&self) -> Option<&str> {
        if self.is_inline() {
            self.content_id.as_deref()
        } else {
            None
        }
    }

    pub fn base64(&self) -> String {
        STANDARD.encode(&self.data)
    }
}

/// Read attachment bytes. Missing or unreadable files are skipped.
pub fn load_attachments(attachments: &[Attachment]) -> Vec<LoadedAttachment> {
    attachments
        .iter()
        .filter_map(|attachment| {
            let attachment = attachment.clone().normalized();
            let data = match &attachment.source {
                AttachmentSource::Bytes { data } => data.clone(),
                AttachmentSource::Path { path } | AttachmentSource::Stored { path } => {
                    match std::fs::read(path) {
                        Ok(data) => data,
                        Err(e) => {
                            warn!(
                                path = %path.display(),
                                filename = %attachment.filename,
                                error = %e,
                                "attachment_unreadable_skipped"
                            );
                            return None;
                        }
                    }
                }
            };

            Some(LoadedAttachment {
                filename: attachment.filename,
                mime_type: attachment.mime_type,
                disposition: attachment.disposition,
                content_id: attachment.content_id,
                data,
            })
        })
        .collect()
}

/// Drop headers the adapter manages itself and any value with line breaks.
pub fn sanitize_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, value)| {
            let name = name.trim();
            !name.is_empty()
                && !MANAGED_HEADERS.contains(&name.to_ascii_lowercase().as_str())
                && !name.contains(|c: char| c == ':' || c.is_whitespace() || c.is_control())
                && !value.contains(['\r', '\n'])
        })
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Default success check: the status equals the adapter's declared code.
pub fn status_matches(response: &HttpResponse, expected: u16) -> bool {
    response.status == expected
}

/// Fallback error text when a provider's error shape is not recognized.
pub fn generic_error(response: &HttpResponse) -> String {
    let body = excerpt(response.body.trim());
    if body.is_empty() {
        format!("HTTP {} {}", response.status, response.reason())
    } else {
        format!("HTTP {} {}: {}", response.status, response.reason(), body)
    }
}

/// Flatten an arbitrary error value into `field: message; ...`.
///
/// Handles plain strings, arrays of strings or objects, and objects mapping
/// field names to messages or lists of messages.
pub fn flatten_errors(value: &Value) -> String {
    let mut parts = Vec::new();
    collect_errors(None, value, &mut parts);
    parts.join("; ")
}

fn collect_errors(field: Option<&str>, value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) if s.trim().is_empty() => {}
        Value::String(s) => match field {
            Some(field) => parts.push(format!("{}: {}", field, s.trim())),
            None => parts.push(s.trim().to_string()),
        },
        Value::Array(items) => {
            for item in items {
                collect_errors(field, item, parts);
            }
        }
        Value::Object(map) => {
            let message = ["message", "Message", "error", "ErrorMessage", "description"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str));

            if let Some(message) = message {
                let field = ["field", "Field", "ErrorRelatedTo"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .or(field);
                collect_errors(field, &Value::String(message.to_string()), parts);
                return;
            }

            for (key, nested) in map {
                let key = match field {
                    Some(parent) => format!("{}.{}", parent, key),
                    None => key.clone(),
                };
                collect_errors(Some(&key), nested, parts);
            }
        }
        other => match field {
            Some(field) => parts.push(format!("{}: {}", field, other)),
            None => parts.push(other.to_string()),
        },
    }
}

/// Prefix an extracted provider message with the HTTP status.
pub fn with_status(response: &HttpResponse, message: &str) -> String {
    format!("HTTP {}: {}", response.status, message)
}

pub fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_LENGTH) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Mask credentials before headers end up in debug output.
pub fn redact_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.to_ascii_lowercase();
            if lower == "authorization" || lower.contains("key") || lower.contains("token") {
                (name.clone(), "[redacted]".to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}
