//! SMTP.com v4 messages API.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::template::flatten_errors;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{contact_with, headers_object, str_at};

const ENDPOINT: &str = "https://api.smtp.com/v4/messages";

pub struct SmtpCom;

impl ApiProvider for SmtpCom {
    const SLUG: &'static str = "smtpcom";
    const TITLE: &'static str = "SMTP.com";
    const REQUIRED: &'static [&'static str] = &["api_key", "channel"];
    const SETTINGS: &'static [&'static str] = &["api_key", "channel"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let mut recipients = serde_json::Map::new();
        for kind in RecipientKind::ALL {
            let list: Vec<Value> = draft
                .recipients(kind)
                .map(|a| contact_with(a, "address", "name"))
                .collect();
            if !list.is_empty() {
                recipients.insert(kind.as_str().to_string(), Value::Array(list));
            }
        }

        let mut originator = json!({
            "from": draft
                .from
                .as_ref()
                .map(|a| contact_with(a, "address", "name"))
                .unwrap_or(Value::Null),
        });
        if let Some(reply_to) = draft.reply_to.first() {
            originator["reply_to"] = contact_with(reply_to, "address", "name");
        }

        let mut parts = Vec::new();
        if let Some(text) = &draft.content.text {
            parts.push(json!({ "type": "text/plain", "content": text }));
        }
        if let Some(html) = &draft.content.html {
            parts.push(json!({ "type": "text/html", "content": html }));
        }

        let mut message_body = json!({ "parts": parts });
        if !draft.attachments.is_empty() {
            message_body["attachments"] = draft
                .attachments
                .iter()
                .map(|a| {
                    let mut item = json!({
                        "content": a.base64(),
                        "type": a.mime_type,
                        "encoding": "base64",
                        "filename": a.filename,
                        "disposition": a.disposition.as_str(),
                    });
                    if let Some(cid) = a.cid() {
                        item["cid"] = json!(cid);
                    }
                    item
                })
                .collect();
        }

        let mut body = json!({
            "channel": settings.get_or("channel", ""),
            "recipients": Value::Object(recipients),
            "originator": originator,
            "subject": draft.subject,
            "body": message_body,
        });
        if !draft.headers.is_empty() {
            body["custom_headers"] = Value::Object(headers_object(&draft.headers));
        }

        Ok(HttpRequest::post(ENDPOINT)
            .bearer(settings.get_or("api_key", ""))
            .header("Accept", "application/json")
            .json(body))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE
            && response
                .json()
                .is_some_and(|json| str_at(&json, "/status") == Some("success"))
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        let message = str_at(&json, "/data/message")?;
        // "msg_id: <id>" style confirmations carry the id after the colon.
        message
            .rsplit_once(':')
            .map(|(_, id)| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let data = response.json()?.get("data").cloned()?;
        let flat = flatten_errors(&data);
        (!flat.is_empty()).then_some(flat)
    }
}
