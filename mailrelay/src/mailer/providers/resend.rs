//! Resend emails API.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{header_values, headers_object, str_at};

const ENDPOINT: &str = "https://api.resend.com/emails";

pub struct Resend;

impl ApiProvider for Resend {
    const SLUG: &'static str = "resend";
    const TITLE: &'static str = "Resend";
    const REQUIRED: &'static [&'static str] = &["api_key"];
    const SETTINGS: &'static [&'static str] = &["api_key"];

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

        if !draft.reply_to.is_empty() {
            body["reply_to"] = json!(header_values(draft.reply_to.iter()));
        }
        if let Some(text) = &draft.content.text {
            body["text"] = json!(text);
        }
        if let Some(html) = &draft.content.html {
            body["html"] = json!(html);
        }
        if !draft.headers.is_empty() {
            body["headers"] = Value::Object(headers_object(&draft.headers));
        }
        if !draft.attachments.is_empty() {
            body["attachments"] = draft
                .attachments
                .iter()
                .map(|a| {
                    let mut item = json!({
                        "filename": a.filename,
                        "content": a.base64(),
                        "content_type": a.mime_type,
                    });
                    if let Some(cid) = a.cid() {
                        item["content_id"] = json!(cid);
                    }
                    item
                })
                .collect();
        }

        Ok(HttpRequest::post(ENDPOINT)
            .bearer(settings.get_or("api_key", ""))
            .json(body))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE && Self::message_id(response).is_some()
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        str_at(&response.json()?, "/id").map(str::to_string)
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        let message = str_at(&json, "/message")?;
        Some(match str_at(&json, "/name") {
            Some(name) => format!("{}: {}", name, message),
            None => message.to_string(),
        })
    }
}
