//! Mandrill (Mailchimp Transactional) `messages/send`.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{headers_object, str_at};

const ENDPOINT: &str = "https://mandrillapp.com/api/1.0/messages/send.json";

const ACCEPTED: &[&str] = &["sent", "queued", "scheduled"];

pub struct Mandrill;

impl ApiProvider for Mandrill {
    const SLUG: &'static str = "mandrill";
    const TITLE: &'static str = "Mandrill";
    const REQUIRED: &'static [&'static str] = &["api_key"];
    const SETTINGS: &'static [&'static str] = &["api_key"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let to: Vec<Value> = RecipientKind::ALL
            .into_iter()
            .flat_map(|kind| {
                draft.recipients(kind).map(move |a| {
                    let mut entry = json!({ "email": a.email, "type": kind.as_str() });
                    if let Some(name) = &a.name {
                        entry["name"] = json!(name);
                    }
                    entry
                })
            })
            .collect();

        let mut headers = headers_object(&draft.headers);
        if let Some(reply_to) = draft.reply_to_header() {
            headers.insert("Reply-To".to_string(), json!(reply_to));
        }

        let mut message = json!({
            "from_email": draft.from_email(),
            "subject": draft.subject,
            "to": to,
            "preserve_recipients": true,
        });
        if !draft.from_name().is_empty() {
            message["from_name"] = json!(draft.from_name());
        }
        if let Some(text) = &draft.content.text {
            message["text"] = json!(text);
        }
        if let Some(html) = &draft.content.html {
            message["html"] = json!(html);
        }
        if !headers.is_empty() {
            message["headers"] = Value::Object(headers);
        }
        if let Some(return_path) = &draft.return_path {
            message["return_path_domain"] = json!(return_path
                .split_once('@')
                .map(|(_, domain)| domain)
                .unwrap_or_default());
        }

        let attachments: Vec<Value> = draft
            .regular_attachments()
            .map(|a| json!({ "type": a.mime_type, "name": a.filename, "content": a.base64() }))
            .collect();
        if !attachments.is_empty() {
            message["attachments"] = Value::Array(attachments);
        }
        let images: Vec<Value> = draft
            .inline_attachments()
            .filter_map(|a| {
                a.cid()
                    .map(|cid| json!({ "type": a.mime_type, "name": cid, "content": a.base64() }))
            })
            .collect();
        if !images.is_empty() {
            message["images"] = Value::Array(images);
        }

        Ok(HttpRequest::post(ENDPOINT).json(json!({
            "key": settings.get_or("api_key", ""),
            "message": message,
        })))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE
            && response.json().is_some_and(|json| {
                str_at(&json, "/0/status").is_some_and(|status| ACCEPTED.contains(&status))
            })
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        str_at(&response.json()?, "/0/_id").map(str::to_string)
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        if let Some(message) = str_at(&json, "/message") {
            return Some(message.to_string());
        }
        let status = str_at(&json, "/0/status")?;
        Some(match str_at(&json, "/0/reject_reason") {
            Some(reason) => format!("{}: {}", status, reason),
            None => status.to_string(),
        })
    }
}
