//! Elastic Email v4 transactional API.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{header_values, headers_object, str_at};

const ENDPOINT: &str = "https://api.elasticemail.com/v4/emails/transactional";

pub struct ElasticEmail;

impl ApiProvider for ElasticEmail {
    const SLUG: &'static str = "elasticemail";
    const TITLE: &'static str = "Elastic Email";
    const REQUIRED: &'static [&'static str] = &["api_key"];
    const SETTINGS: &'static [&'static str] = &["api_key"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let mut recipients = serde_json::Map::new();
        for (kind, key) in [
            (RecipientKind::To, "To"),
            (RecipientKind::Cc, "CC"),
            (RecipientKind::Bcc, "BCC"),
        ] {
            let list = header_values(draft.recipients(kind));
            if !list.is_empty() {
                recipients.insert(key.to_string(), json!(list));
            }
        }

        let mut parts = Vec::new();
        if let Some(html) = &draft.content.html {
            parts.push(json!({ "ContentType": "HTML", "Content": html, "Charset": "utf-8" }));
        }
        if let Some(text) = &draft.content.text {
            parts.push(json!({ "ContentType": "PlainText", "Content": text, "Charset": "utf-8" }));
        }

        let mut content = json!({
            "From": draft.from.as_ref().map(|a| a.to_header()).unwrap_or_default(),
            "Subject": draft.subject,
            "Body": parts,
        });
        if let Some(reply_to) = draft.reply_to_header() {
            content["ReplyTo"] = json!(reply_to);
        }
        if !draft.headers.is_empty() {
            content["Headers"] = Value::Object(headers_object(&draft.headers));
        }
        // No content-id support: inline files travel as plain attachments.
        if !draft.attachments.is_empty() {
            content["Attachments"] = draft
                .attachments
                .iter()
                .map(|a| json!({ "BinaryContent": a.base64(), "Name": a.filename, "ContentType": a.mime_type }))
                .collect();
        }

        Ok(HttpRequest::post(ENDPOINT)
            .header("X-ElasticEmail-ApiKey", settings.get_or("api_key", ""))
            .json(json!({ "Recipients": recipients, "Content": content })))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE && Self::message_id(response).is_some()
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        str_at(&json, "/TransactionID")
            .or_else(|| str_at(&json, "/MessageID"))
            .map(str::to_string)
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        str_at(&response.json()?, "/Error").map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::test_support::{assert_valid_recipients_only, loaded};
    use crate::mailer::Mailer;

    #[tokio::test]
    async fn test_transactional_payload() {
        let (mut mailer, transport) = loaded::<ElasticEmail>(
            &[("api_key", "ee-key")],
            HttpResponse::new(200, r#"{"TransactionID":"t-1","MessageID":"m-1"}"#),
        );
        assert!(mailer.send().await);
        assert_eq!(mailer.message_id(), Some("t-1"));

        let request = transport.last_request().unwrap();
        assert_eq!(request.header_value("X-ElasticEmail-ApiKey"), Some("ee-key"));
        assert_valid_recipients_only(&request);

        let body = request.json_body().unwrap();
        assert_eq!(body["Recipients"]["To"][0], "User <user@example.com>");
        assert_eq!(body["Content"]["Body"][0]["ContentType"], "HTML");
        assert_eq!(body["Content"]["Body"][1]["ContentType"], "PlainText");
        assert_eq!(body["Content"]["Attachments"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_error_field() {
        let (mut mailer, _) = loaded::<ElasticEmail>(
            &[("api_key", "k")],
            HttpResponse::new(401, r#"{"Error":"Access Denied."}"#),
        );
        assert!(!mailer.send().await);
        assert_eq!(mailer.get_response_error().as_deref(), Some("HTTP 401: Access Denied."));
    }
}
