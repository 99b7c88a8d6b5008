//! Amazon SES v2 `SendEmail` with raw MIME content.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::mime::build_message;
use crate::mailer::sigv4::{self, SigningParams};
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{header_values, str_at};

const DEFAULT_REGION: &str = "us-east-1";

pub struct AmazonSes;

impl AmazonSes {
    fn endpoint(region: &str) -> String {
        format!("https://email.{}.amazonaws.com/v2/email/outbound-emails", region)
    }
}

impl ApiProvider for AmazonSes {
    const SLUG: &'static str = "amazonses";
    const TITLE: &'static str = "Amazon SES";
    const REQUIRED: &'static [&'static str] = &["client_id", "client_secret", "region"];
    const SETTINGS: &'static [&'static str] = &["client_id", "client_secret", "region"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let raw = build_message(draft)?.formatted();
        let region = settings.get_or("region", DEFAULT_REGION);

        let mut destination = serde_json::Map::new();
        for (kind, key) in [
            (RecipientKind::To, "ToAddresses"),
            (RecipientKind::Cc, "CcAddresses"),
            (RecipientKind::Bcc, "BccAddresses"),
        ] {
            let list = header_values(draft.recipients(kind));
            if !list.is_empty() {
                destination.insert(key.to_string(), json!(list));
            }
        }

        let mut body = json!({
            "FromEmailAddress": draft.from.as_ref().map(|a| a.to_header()).unwrap_or_default(),
            "Destination": Value::Object(destination),
            "Content": { "Raw": { "Data": STANDARD.encode(&raw) } },
        });
        if !draft.reply_to.is_empty() {
            body["ReplyToAddresses"] = json!(header_values(draft.reply_to.iter()));
        }
        if let Some(return_path) = &draft.return_path {
            body["FeedbackForwardingEmailAddress"] = json!(return_path);
        }

        let url = Self::endpoint(region);
        let request = HttpRequest::post(&url)
            .header("Content-Type", "application/json")
            .json(body);

        let params = SigningParams {
            access_key_id: settings.get_or("client_id", ""),
            secret_access_key: settings.get_or("client_secret", ""),
            region,
            service: "ses",
        };
        let signed = sigv4::sign(
            &params,
            request.method.as_str(),
            &url,
            &request.headers,
            &request.body_bytes(),
            Utc::now(),
        )?;

        Ok(signed
            .into_iter()
            .fold(request, |request, (name, value)| request.header(name, value)))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE && Self::message_id(response).is_some()
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        str_at(&response.json()?, "/MessageId").map(str::to_string)
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        str_at(&json, "/message")
            .or_else(|| str_at(&json, "/Message"))
            .map(str::to_string)
    }
}
