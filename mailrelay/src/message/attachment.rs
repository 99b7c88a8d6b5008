//! Attachment descriptors.
//!
//! An [`Attachment`] only describes where the bytes live. Reading them is the
//! job of the mailer template, which skips anything it cannot read.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the attachment is presented to the recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Offered as a downloadable file.
    #[default]
    Attachment,
    /// Rendered inside the HTML body via a `cid:` reference.
    Inline,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        }
    }
}

/// Where the attachment bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentSource {
    /// A file on disk owned by the caller.
    Path { path: PathBuf },
    /// Raw content held in memory.
    Bytes {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// A copy written to the queue's private attachment storage.
    Stored { path: PathBuf },
}

/// A single attachment on an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub source: AttachmentSource,
    pub filename: String,
    pub mime_type: String,
    #[serde(default)]
    pub disposition: Disposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

impl Attachment {
    /// Attach a file from disk. The display name defaults to the file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generated_filename);
        let mime_type = guess_mime(&filename);

        Self {
            source: AttachmentSource::Path { path },
            filename,
            mime_type,
            disposition: Disposition::Attachment,
            content_id: None,
        }
    }

    /// Attach in-memory content. A unique name is generated when none is given.
    pub fn from_bytes(data: impl Into<Vec<u8>>, filename: Option<&str>) -> Self {
        let filename = filename
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generated_filename);
        let mime_type = guess_mime(&filename);

        Self {
            source: AttachmentSource::Bytes { data: data.into() },
            filename,
            mime_type,
            disposition: Disposition::Attachment,
            content_id: None,
        }
    }

    /// Mark as inline with the given content-id. An empty id leaves the
    /// attachment as a regular one, since nothing could reference it.
    pub fn inline(mut self, content_id: impl AsRef<str>) -> Self {
        let brackets = |c: char| c == '<' || c == '>' || c.is_whitespace();
        let cid = content_id
            .as_ref()
            .trim_matches(brackets)
            .trim_start_matches("cid:")
            .trim_matches(brackets);
        if !cid.is_empty() {
            self.disposition = Disposition::Inline;
            self.content_id = Some(cid.to_string());
        }
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        if !mime_type.trim().is_empty() {
            self.mime_type = mime_type;
        }
        self
    }

    /// Inline attachments must carry a content-id; anything else is
    /// downgraded to a regular attachment.
    pub fn normalized(mut self) -> Self {
        if self.disposition == Disposition::Inline
            && self.content_id.as_deref().map_or(true, str::is_empty)
        {
            self.disposition = Disposition::Attachment;
            self.content_id = None;
        }
        if self.filename.trim().is_empty() {
            self.filename = generated_filename();
        }
        if self.mime_type.trim().is_empty() {
            self.mime_type = guess_mime(&self.filename);
        }
        self
    }

    pub fn is_inline(&self) -> bool {
        self.disposition == Disposition::Inline && self.content_id.is_some()
    }

    /// The path backing this attachment, if it lives on disk.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            AttachmentSource::Path { path } | AttachmentSource::Stored { path } => Some(path),
            AttachmentSource::Bytes { .. } => None,
        }
    }
}

/// Generate a collision-free display name for unnamed content.
pub fn generated_filename() -> String {
    format!("attachment-{}", Uuid::new_v4().simple())
}

fn guess_mime(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_uses_file_name_and_guesses_type() {
        let att = Attachment::from_path("/tmp/reports/q3.pdf");
        assert_eq!(att.filename, "q3.pdf");
        assert_eq!(att.mime_type, "application/pdf");
        assert_eq!(att.disposition, Disposition::Attachment);
    }

    #[test]
    fn test_unnamed_bytes_get_generated_name() {
        let att = Attachment::from_bytes(b"hello".to_vec(), None);
        assert!(att.filename.starts_with("attachment-"));
        assert_eq!(att.mime_type, "application/octet-stream");

        let other = Attachment::from_bytes(b"hello".to_vec(), Some(" "));
        assert_ne!(att.filename, other.filename);
    }

    #[test]
    fn test_inline_strips_cid_decoration() {
        let att = Attachment::from_bytes(vec![1, 2, 3], Some("logo.png")).inline("<cid:logo>");
        assert!(att.is_inline());
        assert_eq!(att.content_id.as_deref(), Some("logo"));
        assert_eq!(att.mime_type, "image/png");

        for raw in ["cid:logo", " <logo> ", "cid:<logo>", "<cid: logo>"] {
            let att = Attachment::from_bytes(vec![1], Some("logo.png")).inline(raw);
            assert_eq!(att.content_id.as_deref(), Some("logo"), "from {:?}", raw);
        }
    }

    #[test]
    fn test_inline_without_cid_is_downgraded() {
        let att = Attachment::from_bytes(vec![1], Some("a.png")).inline("");
        assert_eq!(att.disposition, Disposition::Attachment);

        let mut forced = Attachment::from_bytes(vec![1], Some("a.png"));
        forced.disposition = Disposition::Inline;
        let normalized = forced.normalized();
        assert_eq!(normalized.disposition, Disposition::Attachment);
        assert!(normalized.content_id.is_none());
    }

    #[test]
    fn test_bytes_serialize_as_base64() {
        let att = Attachment::from_bytes(b"hi".to_vec(), Some("a.txt"));
        let json = serde_json::to_value(&att).unwrap();
        assert_eq!(json["source"]["kind"], "bytes");
        assert_eq!(json["source"]["data"], "aGk=");

        let back: Attachment = serde_json::from_value(json).unwrap();
        assert_eq!(back, att);
    }
}
