//! MailerSend email API.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::template::flatten_errors;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{contact, str_at};

const ENDPOINT: &str = "https://api.mailersend.com/v1/email";

pub struct MailerSend;

impl ApiProvider for MailerSend {
    const SLUG: &'static str = "mailersend";
    const TITLE: &'static str = "MailerSend";
    const SUCCESS_CODE: u16 = 202;
    const REQUIRED: &'static [&'static str] = &["api_key"];
    const SETTINGS: &'static [&'static str] = &["api_key"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let mut body = json!({
            "from": draft.from.as_ref().map(contact).unwrap_or(Value::Null),
            "subject": draft.subject,
        });

        for kind in RecipientKind::ALL {
            let list: Vec<Value> = draft.recipients(kind).map(contact).collect();
            if !list.is_empty() {
                body[kind.as_str()] = Value::Array(list);
            }
        }

        if let Some(reply_to) = draft.reply_to.first() {
            body["reply_to"] = contact(reply_to);
        }
        if let Some(text) = &draft.content.text {
            body["text"] = json!(text);
        }
        if let Some(html) = &draft.content.html {
            body["html"] = json!(html);
        }
        if !draft.headers.is_empty() {
            body["headers"] = draft
                .headers
                .iter()
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect();
        }
        if !draft.attachments.is_empty() {
            body["attachments"] = draft
                .attachments
                .iter()
                .map(|a| {
                    let mut item = json!({
                        "content": a.base64(),
                        "filename": a.filename,
                        "disposition": a.disposition.as_str(),
                    });
                    if let Some(cid) = a.cid() {
                        item["id"] = json!(cid);
                    }
                    item
                })
                .collect();
        }

        Ok(HttpRequest::post(ENDPOINT)
            .bearer(settings.get_or("api_key", ""))
            .header("X-Requested-With", "XMLHttpRequest")
            .json(body))
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        let message = str_at(&json, "/message");
        let details = json.get("errors").map(flatten_errors).filter(|s| !s.is_empty());
        match (message, details) {
            (Some(message), Some(details)) => Some(format!("{} ({})", message, details)),
            (Some(message), None) => Some(message.to_string()),
            (None, details) => details,
        }
    }
}
