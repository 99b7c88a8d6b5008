//! Mailjet Send API v3.1.

use serde_json::{json, Value};

use crate::config::MailerSettings;
use crate::mailer::template::flatten_errors;
use crate::mailer::{ApiProvider, Draft, HttpRequest, HttpResponse, TransportError};
use crate::message::RecipientKind;

use super::{contact_with, headers_object, id_at, str_at};

const ENDPOINT: &str = "https://api.mailjet.com/v3.1/send";

pub struct Mailjet;

fn mailjet_contact(address: &crate::message::Address) -> Value {
    contact_with(address, "Email", "Name")
}

impl ApiProvider for Mailjet {
    const SLUG: &'static str = "mailjet";
    const TITLE: &'static str = "Mailjet";
    const REQUIRED: &'static [&'static str] = &["api_key", "secret_key"];
    const SETTINGS: &'static [&'static str] = &["api_key", "secret_key"];

    fn build_request(settings: &MailerSettings, draft: &Draft) -> Result<HttpRequest, TransportError> {
        let mut message = json!({
            "From": draft.from.as_ref().map(mailjet_contact).unwrap_or(Value::Null),
            "Subject": draft.subject,
        });

        for (kind, key) in [
            (RecipientKind::To, "To"),
            (RecipientKind::Cc, "Cc"),
            (RecipientKind::Bcc, "Bcc"),
        ] {
            let list: Vec<Value> = draft.recipients(kind).map(mailjet_contact).collect();
            if !list.is_empty() {
                message[key] = Value::Array(list);
            }
        }

        // Mailjet accepts a single reply-to contact.
        if let Some(reply_to) = draft.reply_to.first() {
            message["ReplyTo"] = mailjet_contact(reply_to);
        }
        if let Some(text) = &draft.content.text {
            message["TextPart"] = json!(text);
        }
        if let Some(html) = &draft.content.html {
            message["HTMLPart"] = json!(html);
        }
        if !draft.headers.is_empty() {
            message["Headers"] = Value::Object(headers_object(&draft.headers));
        }

        let attachments: Vec<Value> = draft
            .regular_attachments()
            .map(|a| json!({ "ContentType": a.mime_type, "Filename": a.filename, "Base64Content": a.base64() }))
            .collect();
        if !attachments.is_empty() {
            message["Attachments"] = Value::Array(attachments);
        }
        let inlined: Vec<Value> = draft
            .inline_attachments()
            .filter_map(|a| {
                a.cid().map(|cid| {
                    json!({
                        "ContentType": a.mime_type,
                        "Filename": a.filename,
                        "ContentID": cid,
                        "Base64Content": a.base64(),
                    })
                })
            })
            .collect();
        if !inlined.is_empty() {
            message["InlinedAttachments"] = Value::Array(inlined);
        }

        Ok(HttpRequest::post(ENDPOINT)
            .basic_auth(settings.get_or("api_key", ""), settings.get_or("secret_key", ""))
            .json(json!({ "Messages": [message] })))
    }

    fn is_sent(response: &HttpResponse) -> bool {
        response.status == Self::SUCCESS_CODE
            && response
                .json()
                .is_some_and(|json| str_at(&json, "/Messages/0/Status") == Some("success"))
    }

    fn message_id(response: &HttpResponse) -> Option<String> {
        id_at(&response.json()?, "/Messages/0/To/0/MessageID")
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        let json = response.json()?;
        if let Some(errors) = json.pointer("/Messages/0/Errors") {
            let flat = flatten_errors(errors);
            if !flat.is_empty() {
                return Some(flat);
            }
        }
        str_at(&json, "/ErrorMessage").map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::test_support::{assert_valid_recipients_only, loaded};
    use crate::mailer::Mailer;

    const KEYS: [(&str, &str); 2] = [("api_key", "public"), ("secret_key", "private")];

    #[tokio::test]
    async fn test_messages_payload() {
        let (mut mailer, transport) = loaded::<Mailjet>(
            &KEYS,
            HttpResponse::new(
                200,
                r#"{"Messages":[{"Status":"success","To":[{"Email":"user@example.com","MessageID":576460754655154659}]}]}"#,
            ),
        );
        assert!(mailer.send().await);
        assert_eq!(mailer.message_id(), Some("576460754655154659"));

        let request = transport.last_request().unwrap();
        assert_eq!(request.header_value("Authorization"), Some("Basic cHVibGljOnByaXZhdGU="));
        assert_valid_recipients_only(&request);

        let message = &request.json_body().unwrap()["Messages"][0];
        assert_eq!(message["To"][0]["Email"], "user@example.com");
        assert_eq!(message["To"][0]["Name"], "User");
        assert_eq!(message["ReplyTo"]["Email"], "support@example.com");
        assert_eq!(message["InlinedAttachments"][0]["ContentID"], "logo");
        assert_eq!(message["Attachments"][0]["Base64Content"], "UERG");
        assert_eq!(message["Headers"]["X-Campaign"], "spring");
    }

    #[tokio::test]
    async fn test_message_errors() {
        let (mut mailer, _) = loaded::<Mailjet>(
            &KEYS,
            HttpResponse::new(
                400,
                r#"{"Messages":[{"Status":"error","Errors":[{"ErrorMessage":"Type mismatch","ErrorRelatedTo":["To[0].Email"]}]}]}"#,
            ),
        );
        assert!(!mailer.send().await);
        let error = mailer.get_response_error().unwrap();
        assert!(error.starts_with("HTTP 400: "), "{}", error);
        assert!(error.contains("Type mismatch"), "{}", error);
    }

    #[tokio::test]
    async fn test_auth_failure_message() {
        let (mut mailer, _) = loaded::<Mailjet>(
            &KEYS,
            HttpResponse::new(401, r#"{"ErrorIdentifier":"x","StatusCode":401,"ErrorMessage":"API key authentication/authorization failure."}"#),
        );
        assert!(!mailer.send().await);
        assert_eq!(
            mailer.get_response_error().as_deref(),
            Some("HTTP 401: API key authentication/authorization failure.")
        );
    }
}
