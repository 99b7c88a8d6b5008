//! SendGrid v3 mail send API.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::template::flatten_errors;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{contact, headers_object};

const ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendGrid;

impl ApiProvider for SendGrid {
    const SLUG: &'static str = "sendgrid";
    const TITLE: &'static str = "SendGrid";
    const SUCCESS_CODE: u16 = 202;
    const REQUIRED: &'static [&'static str] = &["api_key"];
    const SETTINGS: &'static [&'static str] = &["api_key"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let mut personalization = serde_json::Map::new();
        for kind in RecipientKind::ALL {
            let list: Vec<Value> = draft.recipients(kind).map(contact).collect();
            if !list.is_empty() {
                personalization.insert(kind.as_str().to_string(), Value::Array(list));
            }
        }

        let mut body = json!({
            "personalizations": [personalization],
            "from": draft.from.as_ref().map(contact).unwrap_or(Value::Null),
            "subject": draft.subject,
        });

        let mut content = Vec::new();
        if let Some(text) = &draft.content.text {
            content.push(json!({ "type": "text/plain", "value": text }));
        }
        if let Some(html) = &draft.content.html {
            content.push(json!({ "type": "text/html", "value": html }));
        }
        if !content.is_empty() {
            body["content"] = Value::Array(content);
        }

        match draft.reply_to.as_slice() {
            [] => {}
            [single] => body["reply_to"] = contact(single),
            many => body["reply_to_list"] = many.iter().map(contact).collect(),
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
                        "content": a.base64(),
                        "type": a.mime_type,
                        "filename": a.filename,
                        "disposition": a.disposition.as_str(),
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

    fn error_message(response: &HttpResponse) -> Option<String> {
        let errors = response.json()?.get("errors").cloned()?;
        Some(flatten_errors(&errors))
    }
}
