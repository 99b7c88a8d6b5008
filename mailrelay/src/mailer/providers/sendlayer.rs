//! SendLayer email API.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::template::flatten_errors;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{contact, headers_object, str_at};

const ENDPOINT: &str = "https://console.sendlayer.com/api/v1/email";

pub struct SendLayer;

impl ApiProvider for SendLayer {
    const SLUG: &'static str = "sendlayer";
    const TITLE: &'static str = "SendLayer";
    const REQUIRED: &'static [&'static str] = &["api_key"];
    const SETTINGS: &'static [&'static str] = &["api_key"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let mut body = json!({
            "From": draft.from.as_ref().map(contact).unwrap_or(Value::Null),
            "Subject": draft.subject,
        });

        for (kind, key) in [
            (RecipientKind::To, "To"),
            (RecipientKind::Cc, "CC"),
            (RecipientKind::Bcc, "BCC"),
        ] {
            let list: Vec<Value> = draft.recipients(kind).map(contact).collect();
            if !list.is_empty() {
                body[key] = Value::Array(list);
            }
        }

        match (&draft.content.text, &draft.content.html) {
            (text, Some(html)) => {
                body["ContentType"] = json!("HTML");
                body["HTMLContent"] = json!(html);
                if let Some(text) = text {
                    body["PlainContent"] = json!(text);
                }
            }
            (text, None) => {
                body["ContentType"] = json!("plain");
                body["PlainContent"] = json!(text.as_deref().unwrap_or_default());
            }
        }

        if !draft.reply_to.is_empty() {
            body["ReplyTo"] = draft.reply_to.iter().map(contact).collect();
        }
        if !draft.headers.is_empty() {
            body["Headers"] = Value::Object(headers_object(&draft.headers));
        }
        if !draft.attachments.is_empty() {
            body["Attachments"] = draft
                .attachments
                .iter()
                .map(|a| {
                    let mut item = json!({
                        "Content": a.base64(),
                        "Type": a.mime_type,
                        "Filename": a.filename,
                        "Disposition": a.disposition.as_str(),
                    });
                    if let Some(cid) = a.cid() {
                        item["ContentId"] = json!(cid);
                    }
                    item
                })
                .collect();
        }

        Ok(HttpRequest::post(ENDPOINT)
            .bearer(settings.get_or("api_key", ""))
            .header("Accept", "application/json")
            .json(body))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE && Self::message_id(response).is_some()
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        str_at(&response.json()?, "/MessageID").map(str::to_string)
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let errors = response.json()?.get("Errors").cloned()?;
        let flat = flatten_errors(&errors);
        (!flat.is_empty()).then_some(flat)
    }
}
