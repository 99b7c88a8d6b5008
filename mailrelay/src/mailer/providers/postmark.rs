//! Postmark email API.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{header_values, id_at, str_at};

const ENDPOINT: &str = "https://api.postmarkapp.com/email";

pub struct Postmark;

impl ApiProvider for Postmark {
    const SLUG: &'static str = "postmark";
    const TITLE: &'static str = "Postmark";
    const REQUIRED: &'static [&'static str] = &["server_api_token"];
    const SETTINGS: &'static [&'static str] = &["server_api_token", "message_stream"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let mut body = json!({
            "From": draft.from.as_ref().map(|a| a.to_header()).unwrap_or_default(),
            "Subject": draft.subject,
        });

        for (kind, key) in [
            (RecipientKind::To, "To"),
            (RecipientKind::Cc, "Cc"),
            (RecipientKind::Bcc, "Bcc"),
        ] {
            let list = header_values(draft.recipients(kind));
            if !list.is_empty() {
                body[key] = json!(list.join(","));
            }
        }

        if let Some(text) = &draft.content.text {
            body["TextBody"] = json!(text);
        }
        if let Some(html) = &draft.content.html {
            body["HtmlBody"] = json!(html);
        }
        if let Some(reply_to) = draft.reply_to_header() {
            body["ReplyTo"] = json!(reply_to);
        }
        if let Some(stream) = settings.get("message_stream") {
            body["MessageStream"] = json!(stream);
        }
        if !draft.headers.is_empty() {
            body["Headers"] = draft
                .headers
                .iter()
                .map(|(name, value)| json!({ "Name": name, "Value": value }))
                .collect();
        }
        if !draft.attachments.is_empty() {
            body["Attachments"] = draft
                .attachments
                .iter()
                .map(|a| {
                    let mut item = json!({
                        "Name": a.filename,
                        "Content": a.base64(),
                        "ContentType": a.mime_type,
                    });
                    if let Some(cid) = a.cid() {
                        item["ContentID"] = json!(format!("cid:{}", cid));
                    }
                    item
                })
                .collect();
        }

        Ok(HttpRequest::post(ENDPOINT)
            .header("X-Postmark-Server-Token", settings.get_or("server_api_token", ""))
            .header("Accept", "application/json")
            .json(body))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        let Some(json) = response.json() else {
            return false;
        };
        response.status == Self::SUCCESS_CODE
            && str_at(&json, "/MessageID").is_some()
            && json.get("ErrorCode").and_then(Value::as_i64) == Some(0)
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        id_at(&response.json()?, "/MessageID")
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        let message = str_at(&json, "/Message")?;
        Some(match json.get("ErrorCode").and_then(Value::as_i64) {
            Some(code) if code != 0 => format!("{} (code {})", message, code),
            _ => message.to_string(),
        })
    }
}
