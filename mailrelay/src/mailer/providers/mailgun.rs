//! Mailgun messages API.
//!
//! Plain messages go out form-urlencoded. Once attachments are present the
//! whole body is rebuilt as `multipart/form-data`, files included.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::config::MailerSettings;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{header_values, str_at};

const US_API: &str = "https://api.mailgun.net/v3";
const EU_API: &str = "https://api.eu.mailgun.net/v3";

pub struct Mailgun;

impl Mailgun {
    fn endpoint(settings: &MailerSettings) -> String {
        let base = if settings.get_or("region", "us").eq_ignore_ascii_case("eu") {
            EU_API
        } else {
            US_API
        };
        format!("{}/{}/messages", base, settings.get_or("domain", ""))
    }

    fn fields(draft: &Draft) -> Vec<(String, String)> {
        let mut fields = vec![
            (
                "from".to_string(),
                draft.from.as_ref().map(|a| a.to_header()).unwrap_or_default(),
            ),
            ("subject".to_string(), draft.subject.clone()),
        ];

        for kind in RecipientKind::ALL {
            let list = header_values(draft.recipients(kind));
            if !list.is_empty() {
                fields.push((kind.as_str().to_string(), list.join(", ")));
            }
        }

        if let Some(text) = &draft.content.text {
            fields.push(("text".to_string(), text.clone()));
        }
        if let Some(html) = &draft.content.html {
            fields.push(("html".to_string(), html.clone()));
        }
        if let Some(reply_to) = draft.reply_to_header() {
            fields.push(("h:Reply-To".to_string(), reply_to));
        }
        if let Some(return_path) = &draft.return_path {
            fields.push(("h:Sender".to_string(), return_path.clone()));
        }
        for (name, value) in &draft.headers {
            fields.push((format!("h:{}", name), value.clone()));
        }

        fields
    }

    fn multipart(fields: &[(String, String)], draft: &Draft) -> (String, Vec<u8>) {
        Self::multipart_with(fields, draft, || {
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(24)
                .map(char::from)
                .collect()
        })
    }

    /// Build the multipart body, drawing boundaries from `next_boundary`
    /// until one does not occur in any part.
    fn multipart_with(
        fields: &[(String, String)],
        draft: &Draft,
        mut next_boundary: impl FnMut() -> String,
    ) -> (String, Vec<u8>) {
        let boundary = loop {
            let candidate = next_boundary();
            let delimiter = format!("--{}", candidate);
            let collides = fields
                .iter()
                .any(|(name, value)| name.contains(&delimiter) || value.contains(&delimiter))
                || draft
                    .attachments
                    .iter()
                    .any(|a| contains_bytes(&a.data, delimiter.as_bytes()));
            if !collides {
                break candidate;
            }
        };
        let mut body = Vec::new();

        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    boundary,
                    escape_param(name),
                    value
                )
                .as_bytes(),
            );
        }

        for attachment in &draft.attachments {
            // Mailgun references inline files by their filename.
            let (field, filename) = match attachment.cid() {
                Some(cid) => ("inline", cid),
                None => ("attachment", attachment.filename.as_str()),
            };
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    boundary,
                    field,
                    escape_param(filename),
                    attachment.mime_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(&attachment.data);
            body.extend_from_slice(b"\r\n");
        }

        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        (boundary, body)
    }
}

/// Percent-encode the characters that would end a quoted
/// `Content-Disposition` parameter or its header line.
fn escape_param(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

impl ApiProvider for Mailgun {
    const SLUG: &'static str = "mailgun";
    const TITLE: &'static str = "Mailgun";
    const REQUIRED: &'static [&'static str] = &["api_key", "domain"];
    const SETTINGS: &'static [&'static str] = &["api_key", "domain", "region"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let request = HttpRequest::post(Self::endpoint(settings))
            .basic_auth("api", settings.get_or("api_key", ""));
        let fields = Self::fields(draft);

        if draft.attachments.is_empty() {
            Ok(request.form(fields))
        } else {
            let (boundary, bytes) = Self::multipart(&fields, draft);
            Ok(request.multipart(boundary, bytes))
        }
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE && Self::message_id(response).is_some()
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        str_at(&json, "/id").map(|id| id.trim_matches(|c| c == '<' || c == '>').to_string())
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        str_at(&response.json()?, "/message").map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::test_support::{assert_valid_recipients_only, loaded, sample_message};
    use crate::mailer::transport::RequestBody;
    use crate::mailer::{HttpMailer, Mailer};
    use crate::mocks::MockTransport;
    use std::sync::Arc;

    const OK: &str = r#"{"id":"<20240101.1@mg.example.com>","message":"Queued. Thank you."}"#;

    #[tokio::test]
    async fn test_multipart_when_attachments() {
        let (mut mailer, transport) = loaded::<Mailgun>(
            &[("api_key", "key-1"), ("domain", "mg.example.com"), ("region", "eu")],
            HttpResponse::new(200, OK),
        );
        assert!(mailer.send().await);
        assert_eq!(mailer.message_id(), Some("20240101.1@mg.example.com"));

        let request = transport.last_request().unwrap();
        assert_eq!(request.url, "https://api.eu.mailgun.net/v3/mg.example.com/messages");
        assert_eq!(request.header_value("Authorization"), Some("Basic YXBpOmtleS0x"));
        assert_valid_recipients_only(&request);

        let RequestBody::Multipart { boundary, bytes } = &request.body else {
            panic!("expected multipart body");
        };
        let text = String::from_utf8_lossy(bytes);
        assert!(request.content_type().unwrap().contains(boundary.as_str()));
        assert!(text.contains("name=\"inline\"; filename=\"logo\""));
        assert!(text.contains("name=\"attachment\"; filename=\"terms.pdf\""));
        assert!(text.contains("name=\"h:X-Campaign\""));
        assert!(text.ends_with(&format!("--{}--\r\n", boundary)));
    }

    #[test]
    fn test_multipart_escapes_names_and_avoids_boundary_collision() {
        let mut draft = crate::mailer::test_support::sample_draft();
        draft.attachments.clear();
        let fields = vec![
            ("h:X-\"Odd\"\r\nName".to_string(), "plain".to_string()),
            ("text".to_string(), "quoting --taken inside".to_string()),
        ];

        let mut candidates = vec!["fresh".to_string(), "taken".to_string()];
        let (boundary, bytes) =
            Mailgun::multipart_with(&fields, &draft, || candidates.pop().unwrap());
        assert_eq!(boundary, "fresh");

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("name=\"h:X-%22Odd%22%0D%0AName\""));
        assert!(!text.contains("\r\nName"));
    }

    #[test]
    fn test_escape_param() {
        assert_eq!(escape_param("a\"b"), "a%22b");
        assert_eq!(escape_param("100%"), "100%25");
        assert_eq!(escape_param("plain.pdf"), "plain.pdf");
    }

    #[tokio::test]
    async fn test_form_without_attachments() {
        let transport = Arc::new(MockTransport::new(HttpResponse::new(200, OK)));
        let settings =
            MailerSettings::from_pairs("mailgun", [("api_key", "k"), ("domain", "mg.example.com")]);
        let mut mailer = HttpMailer::<Mailgun>::new(settings, transport.clone());
        mailer.set_from("app@example.com", "");
        mailer.set_recipients(&sample_message().recipients);
        mailer.set_subject("Hi");

        assert!(mailer.send().await);
        let request = transport.last_request().unwrap();
        assert_eq!(request.url, "https://api.mailgun.net/v3/mg.example.com/messages");
        assert_eq!(request.form_value("to"), Some("User <user@example.com>"));
        assert_eq!(request.form_value("bcc"), Some("hidden@example.com"));
    }

    #[tokio::test]
    async fn test_success_status_without_id_is_failure() {
        let (mut mailer, _) = loaded::<Mailgun>(
            &[("api_key", "k"), ("domain", "d.example.com")],
            HttpResponse::new(200, "{}"),
        );
        assert!(!mailer.send().await);
    }

    #[tokio::test]
    async fn test_error_message() {
        let (mut mailer, _) = loaded::<Mailgun>(
            &[("api_key", "k"), ("domain", "d.example.com")],
            HttpResponse::new(401, r#"{"message":"Invalid private key"}"#),
        );
        assert!(!mailer.send().await);
        assert_eq!(mailer.get_response_error().as_deref(), Some("HTTP 401: Invalid private key"));
    }
}
