//! SMTP2GO email send API.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{header_values, str_at};

const ENDPOINT: &str = "https://api.smtp2go.com/v3/email/send";

pub struct Smtp2Go;

impl ApiProvider for Smtp2Go {
    const SLUG: &'static str = "smtp2go";
    const TITLE: &'static str = "SMTP2GO";
    const REQUIRED: &'static [&'static str] = &["api_key"];
    const SETTINGS: &'static [&'static str] = &["api_key"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let mut body = json!({
            "sender": draft.from.as_ref().map(|a| a.to_header()).unwrap_or_default(),
            "subject": draft.subject,
        });

        for kind in RecipientKind::ALL {
            let list = header_values(draft.recipients(kind));
            if !list.is_empty() {
                body[kind.as_str()] = json!(list);
            }
        }

        if let Some(text) = &draft.content.text {
            body["text_body"] = json!(text);
        }
        if let Some(html) = &draft.content.html {
            body["html_body"] = json!(html);
        }

        let mut headers: Vec<Value> = draft
            .headers
            .iter()
            .map(|(name, value)| json!({ "header": name, "value": value }))
            .collect();
        if let Some(reply_to) = draft.reply_to_header() {
            headers.push(json!({ "header": "Reply-To", "value": reply_to }));
        }
        if !headers.is_empty() {
            body["custom_headers"] = Value::Array(headers);
        }

        let attachments: Vec<Value> = draft
            .regular_attachments()
            .map(|a| json!({ "filename": a.filename, "fileblob": a.base64(), "mimetype": a.mime_type }))
            .collect();
        if !attachments.is_empty() {
            body["attachments"] = Value::Array(attachments);
        }
        let inlines: Vec<Value> = draft
            .inline_attachments()
            .filter_map(|a| {
                a.cid().map(|cid| {
                    json!({ "filename": cid, "fileblob": a.base64(), "mimetype": a.mime_type })
                })
            })
            .collect();
        if !inlines.is_empty() {
            body["inlines"] = Value::Array(inlines);
        }

        Ok(HttpRequest::post(ENDPOINT)
            .header("X-Smtp2go-Api-Key", settings.get_or("api_key", ""))
            .header("Accept", "application/json")
            .json(body))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE
            && response.json().is_some_and(|json| {
                json.pointer("/data/succeeded")
                    .and_then(Value::as_u64)
                    .is_some_and(|n| n > 0)
            })
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        str_at(&response.json()?, "/data/email_id").map(str::to_string)
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        if let Some(error) = str_at(&json, "/data/error") {
            return Some(error.to_string());
        }
        let failures: Vec<&str> = json
            .pointer("/data/failures")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .collect();
        (!failures.is_empty()).then(|| failures.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::test_support::{assert_valid_recipients_only, loaded};
    use crate::mailer::Mailer;

    #[tokio::test]
    async fn test_inlines_and_attachments_split() {
        let (mut mailer, transport) = loaded::<Smtp2Go>(
            &[("api_key", "api-1")],
            HttpResponse::new(200, r#"{"data":{"succeeded":3,"failed":0,"email_id":"1er8bV-6Tw0Mi-7h"}}"#),
        );
        assert!(mailer.send().await);
        assert_eq!(mailer.message_id(), Some("1er8bV-6Tw0Mi-7h"));

        let request = transport.last_request().unwrap();
        assert_eq!(request.header_value("X-Smtp2go-Api-Key"), Some("api-1"));
        assert_valid_recipients_only(&request);

        let body = request.json_body().unwrap();
        assert_eq!(body["to"][0], "User <user@example.com>");
        assert_eq!(body["inlines"][0]["filename"], "logo");
        assert_eq!(body["attachments"][0]["filename"], "terms.pdf");
        assert_eq!(body["custom_headers"][1]["header"], "Reply-To");
    }

    #[tokio::test]
    async fn test_zero_succeeded_is_failure() {
        let (mut mailer, _) = loaded::<Smtp2Go>(
            &[("api_key", "k")],
            HttpResponse::new(200, r#"{"data":{"succeeded":0,"failed":1,"failures":["user@example.com bounced"]}}"#),
        );
        assert!(!mailer.send().await);
        assert_eq!(
            mailer.get_response_error().as_deref(),
            Some("HTTP 200: user@example.com bounced")
        );
    }
}
