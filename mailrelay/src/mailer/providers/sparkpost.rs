//! SparkPost transmissions API.

use serde_json::{json, Map, Value};

use crate::config::MailerSettings;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{contact, headers_object, str_at};

const US_ENDPOINT: &str = "https://api.sparkpost.com/api/v1/transmissions";
const EU_ENDPOINT: &str = "https://api.eu.sparkpost.com/api/v1/transmissions";

pub struct SparkPost;

impl ApiProvider for SparkPost {
    const SLUG: &'static str = "sparkpost";
    const TITLE: &'static str = "SparkPost";
    const REQUIRED: &'static [&'static str] = &["api_key"];
    const SETTINGS: &'static [&'static str] = &["api_key", "region"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let to: Vec<String> = draft.recipients(RecipientKind::To).map(|a| a.email.clone()).collect();
        let header_to = to.join(",");

        // Cc and bcc are plain recipients whose `header_to` points at the
        // visible To list; cc is additionally listed in a CC header.
        let mut recipients = Vec::new();
        for kind in RecipientKind::ALL {
            for address in draft.recipients(kind) {
                let mut entry = contact(address);
                if kind != RecipientKind::To {
                    entry["header_to"] = json!(header_to);
                }
                recipients.push(json!({ "address": entry }));
            }
        }

        let mut headers: Map<String, Value> = headers_object(&draft.headers);
        let cc: Vec<String> = draft.recipients(RecipientKind::Cc).map(|a| a.email.clone()).collect();
        if !cc.is_empty() {
            headers.insert("CC".to_string(), json!(cc.join(",")));
        }

        let mut content = json!({
            "from": draft.from.as_ref().map(contact).unwrap_or(Value::Null),
            "subject": draft.subject,
        });
        if let Some(text) = &draft.content.text {
            content["text"] = json!(text);
        }
        if let Some(html) = &draft.content.html {
            content["html"] = json!(html);
        }
        if let Some(reply_to) = draft.reply_to_header() {
            content["reply_to"] = json!(reply_to);
        }
        if !headers.is_empty() {
            content["headers"] = Value::Object(headers);
        }

        let attachments: Vec<Value> = draft
            .regular_attachments()
            .map(|a| json!({ "name": a.filename, "type": a.mime_type, "data": a.base64() }))
            .collect();
        if !attachments.is_empty() {
            content["attachments"] = Value::Array(attachments);
        }
        let images: Vec<Value> = draft
            .inline_attachments()
            .filter_map(|a| {
                a.cid()
                    .map(|cid| json!({ "name": cid, "type": a.mime_type, "data": a.base64() }))
            })
            .collect();
        if !images.is_empty() {
            content["inline_images"] = Value::Array(images);
        }

        let mut body = json!({ "recipients": recipients, "content": content });
        if let Some(return_path) = &draft.return_path {
            body["return_path"] = json!(return_path);
        }

        let endpoint = if settings.get_or("region", "us").eq_ignore_ascii_case("eu") {
            EU_ENDPOINT
        } else {
            US_ENDPOINT
        };

        Ok(HttpRequest::post(endpoint)
            .header("Authorization", settings.get_or("api_key", ""))
            .json(body))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE && Self::message_id(response).is_some()
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        str_at(&response.json()?, "/results/id").map(str::to_string)
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        let errors = json.get("errors")?.as_array()?;
        let parts: Vec<String> = errors
            .iter()
            .filter_map(|e| {
                let message = str_at(e, "/message")?;
                Some(match str_at(e, "/description") {
                    Some(description) => format!("{}: {}", message, description),
                    None => message.to_string(),
                })
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::test_support::{assert_valid_recipients_only, loaded};
    use crate::mailer::Mailer;

    #[tokio::test]
    async fn test_recipients_and_inline_images() {
        let (mut mailer, transport) = loaded::<SparkPost>(
            &[("api_key", "sp-key"), ("region", "eu")],
            HttpResponse::new(200, r#"{"results":{"total_accepted_recipients":3,"id":"11668787484950529"}}"#),
        );
        assert!(mailer.send().await);
        assert_eq!(mailer.message_id(), Some("11668787484950529"));

        let request = transport.last_request().unwrap();
        assert_eq!(request.url, EU_ENDPOINT);
        assert_eq!(request.header_value("Authorization"), Some("sp-key"));
        assert_valid_recipients_only(&request);

        let body = request.json_body().unwrap();
        let recipients = body["recipients"].as_array().unwrap();
        assert_eq!(recipients.len(), 3);
        assert!(recipients[0]["address"].get("header_to").is_none());
        assert_eq!(recipients[1]["address"]["header_to"], "user@example.com");
        assert_eq!(body["content"]["headers"]["CC"], "copy@example.com");
        assert_eq!(body["content"]["inline_images"][0]["name"], "logo");
        assert_eq!(body["content"]["attachments"][0]["name"], "terms.pdf");
    }

    #[tokio::test]
    async fn test_error_descriptions() {
        let (mut mailer, _) = loaded::<SparkPost>(
            &[("api_key", "k")],
            HttpResponse::new(
                422,
                r#"{"errors":[{"message":"Invalid domain","description":"Unconfigured sending domain","code":"7001"}]}"#,
            ),
        );
        assert!(!mailer.send().await);
        assert_eq!(
            mailer.get_response_error().as_deref(),
            Some("HTTP 422: Invalid domain: Unconfigured sending domain")
        );
    }
}
