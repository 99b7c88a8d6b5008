//! Brevo (formerly Sendinblue) transactional email API.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{contact, headers_object, str_at};

const ENDPOINT: &str = "https://api.brevo.com/v3/smtp/email";

pub struct Sendinblue;

impl ApiProvider for Sendinblue {
    const SLUG: &'static str = "sendinblue";
    const TITLE: &'static str = "Brevo";
    const SUCCESS_CODE: u16 = 201;
    const REQUIRED: &'static [&'static str] = &["api_key"];
    const SETTINGS: &'static [&'static str] = &["api_key"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let mut body = json!({
            "sender": draft.from.as_ref().map(contact).unwrap_or(Value::Null),
            "subject": draft.subject,
        });

        for kind in RecipientKind::ALL {
            let list: Vec<Value> = draft.recipients(kind).map(contact).collect();
            if !list.is_empty() {
                body[kind.as_str()] = Value::Array(list);
            }
        }

        if let Some(text) = &draft.content.text {
            body["textContent"] = json!(text);
        }
        if let Some(html) = &draft.content.html {
            body["htmlContent"] = json!(html);
        }
        // Only one reply-to address is accepted.
        if let Some(reply_to) = draft.reply_to.first() {
            body["replyTo"] = contact(reply_to);
        }
        if !draft.headers.is_empty() {
            body["headers"] = Value::Object(headers_object(&draft.headers));
        }
        if !draft.attachments.is_empty() {
            body["attachment"] = draft
                .attachments
                .iter()
                .map(|a| json!({ "name": a.filename, "content": a.base64() }))
                .collect();
        }

        Ok(HttpRequest::post(ENDPOINT)
            .header("api-key", settings.get_or("api_key", ""))
            .header("Accept", "application/json")
            .json(body))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE && Self::message_id(response).is_some()
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        str_at(&response.json()?, "/messageId").map(str::to_string)
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        let message = str_at(&json, "/message")?;
        Some(match str_at(&json, "/code") {
            Some(code) => format!("{}: {}", code, message),
            None => message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::test_support::{assert_valid_recipients_only, loaded};
    use crate::mailer::Mailer;

    #[tokio::test]
    async fn test_payload_and_marker() {
        let (mut mailer, transport) = loaded::<Sendinblue>(
            &[("api_key", "xkeysib-1")],
            HttpResponse::new(201, r#"{"messageId":"<201@smtp-relay.mailin.fr>"}"#),
        );
        assert!(mailer.send().await);
        assert_eq!(mailer.message_id(), Some("<201@smtp-relay.mailin.fr>"));

        let request = transport.last_request().unwrap();
        assert_eq!(request.header_value("api-key"), Some("xkeysib-1"));
        assert_valid_recipients_only(&request);

        let body = request.json_body().unwrap();
        assert_eq!(body["sender"]["name"], "App");
        assert_eq!(body["to"][0]["email"], "user@example.com");
        assert_eq!(body["cc"].as_array().unwrap().len(), 1);
        assert_eq!(body["replyTo"]["email"], "support@example.com");
        assert_eq!(body["attachment"][1]["name"], "terms.pdf");
        assert_eq!(body["attachment"][1]["content"], "UERG");
    }

    #[tokio::test]
    async fn test_created_without_marker_is_failure() {
        let (mut mailer, _) = loaded::<Sendinblue>(&[("api_key", "k")], HttpResponse::new(201, "{}"));
        assert!(!mailer.send().await);
    }

    #[tokio::test]
    async fn test_error_with_code() {
        let (mut mailer, _) = loaded::<Sendinblue>(
            &[("api_key", "k")],
            HttpResponse::new(401, r#"{"code":"unauthorized","message":"Key not found"}"#),
        );
        assert!(!mailer.send().await);
        assert_eq!(
            mailer.get_response_error().as_deref(),
            Some("HTTP 401: unauthorized: Key not found")
        );
    }
}
