//! Postal (self-hosted) send API.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{header_values, headers_object, id_at, str_at};

pub struct Postal;

impl Postal {
    /// `mail.example.com` or a full base URL such as `http://10.0.0.5:5000`.
    fn endpoint(host: &str) -> String {
        let host = host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}/api/v1/send/message", host)
        } else {
            format!("https://{}/api/v1/send/message", host)
        }
    }
}

impl ApiProvider for Postal {
    const SLUG: &'static str = "postal";
    const TITLE: &'static str = "Postal";
    const REQUIRED: &'static [&'static str] = &["host", "api_key"];
    const SETTINGS: &'static [&'static str] = &["host", "api_key"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let mut body = json!({
            "from": draft.from.as_ref().map(|a| a.to_header()).unwrap_or_default(),
            "subject": draft.subject,
        });

        for kind in RecipientKind::ALL {
            let list = header_values(draft.recipients(kind));
            if !list.is_empty() {
                body[kind.as_str()] = json!(list);
            }
        }

        if let Some(reply_to) = draft.reply_to_header() {
            body["reply_to"] = json!(reply_to);
        }
        if let Some(text) = &draft.content.text {
            body["plain_body"] = json!(text);
        }
        if let Some(html) = &draft.content.html {
            body["html_body"] = json!(html);
        }
        if let Some(return_path) = &draft.return_path {
            body["bounce"] = json!(false);
            body["sender"] = json!(return_path);
        }
        if !draft.headers.is_empty() {
            body["headers"] = Value::Object(headers_object(&draft.headers));
        }
        if !draft.attachments.is_empty() {
            body["attachments"] = draft
                .attachments
                .iter()
                .map(|a| json!({ "name": a.filename, "content_type": a.mime_type, "data": a.base64() }))
                .collect();
        }

        Ok(HttpRequest::post(Self::endpoint(settings.get_or("host", "")))
            .header("X-Server-API-Key", settings.get_or("api_key", ""))
            .json(body))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE
            && response
                .json()
                .is_some_and(|json| str_at(&json, "/status") == Some("success"))
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        id_at(&response.json()?, "/data/message_id")
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        let message = str_at(&json, "/data/message")?;
        Some(match str_at(&json, "/data/code") {
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

    #[test]
    fn test_endpoint_from_host() {
        assert_eq!(
            Postal::endpoint("postal.example.com"),
            "https://postal.example.com/api/v1/send/message"
        );
        assert_eq!(
            Postal::endpoint("http://10.0.0.5:5000/"),
            "http://10.0.0.5:5000/api/v1/send/message"
        );
    }

    #[tokio::test]
    async fn test_send_message() {
        let (mut mailer, transport) = loaded::<Postal>(
            &[("host", "postal.example.com"), ("api_key", "srv-key")],
            HttpResponse::new(
                200,
                r#"{"status":"success","time":0.1,"data":{"message_id":"a1b2@postal.example.com","messages":{}}}"#,
            ),
        );
        assert!(mailer.send().await);
        assert_eq!(mailer.message_id(), Some("a1b2@postal.example.com"));

        let request = transport.last_request().unwrap();
        assert_eq!(request.header_value("X-Server-API-Key"), Some("srv-key"));
        assert_valid_recipients_only(&request);

        let body = request.json_body().unwrap();
        assert_eq!(body["plain_body"], "Hello there");
        assert_eq!(body["attachments"][1]["name"], "terms.pdf");
    }

    #[tokio::test]
    async fn test_error_status() {
        let (mut mailer, _) = loaded::<Postal>(
            &[("host", "postal.example.com"), ("api_key", "k")],
            HttpResponse::new(
                200,
                r#"{"status":"error","data":{"code":"ValidationError","message":"From address is missing"}}"#,
            ),
        );
        assert!(!mailer.send().await);
        assert_eq!(
            mailer.get_response_error().as_deref(),
            Some("HTTP 200: ValidationError: From address is missing")
        );
    }
}
