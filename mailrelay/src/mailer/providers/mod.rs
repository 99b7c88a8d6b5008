//! HTTP provider adapters.
//!
//! Each provider only knows its endpoint, auth scheme, payload shape and how
//! to read the response; the send lifecycle lives in [`HttpMailer`].
//!
//! [`HttpMailer`]: super::HttpMailer

pub mod amazonses;
pub mod elasticemail;
pub mod mailersend;
pub mod mailgun;
pub mod mailjet;
pub mod mandrill;
pub mod postal;
pub mod postmark;
pub mod resend;
pub mod sendgrid;
pub mod sendinblue;
pub mod sendlayer;
pub mod smtp2go;
pub mod smtpcom;
pub mod sparkpost;

pub use amazonses::AmazonSes;
pub use elasticemail::ElasticEmail;
pub use mailersend::MailerSend;
pub use mailgun::Mailgun;
pub use mailjet::Mailjet;
pub use mandrill::Mandrill;
pub use postal::Postal;
pub use postmark::Postmark;
pub use resend::Resend;
pub use sendgrid::SendGrid;
pub use sendinblue::Sendinblue;
pub use sendlayer::SendLayer;
pub use smtp2go::Smtp2Go;
pub use smtpcom::SmtpCom;
pub use sparkpost::SparkPost;

use serde_json::{json, Map, Value};

use crate::message::Address;

/// `{"email": ..., "name": ...}` with the name omitted when empty.
pub(crate) fn contact(address: &Address) -> Value {
    contact_with(address, "email", "name")
}

/// Same as [`contact`] with provider-specific key names.
pub(crate) fn contact_with(address: &Address, email_key: &str, name_key: &str) -> Value {
    let mut object = Map::new();
    object.insert(email_key.to_string(), json!(address.email));
    if let Some(name) = &address.name {
        object.insert(name_key.to_string(), json!(name));
    }
    Value::Object(object)
}

/// Addresses rendered as header values (`Name <email>`).
pub(crate) fn header_values<'a>(addresses: impl Iterator<Item = &'a Address>) -> Vec<String> {
    addresses.map(Address::to_header).collect()
}

/// Custom headers as a JSON object.
pub(crate) fn headers_object(headers: &[(String, String)]) -> Map<String, Value> {
    headers
        .iter()
        .map(|(name, value)| (name.clone(), json!(value)))
        .collect()
}

/// String at a JSON pointer, ignoring blanks.
pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Scalar at a JSON pointer rendered as a string (ids are sometimes numbers).
pub(crate) fn id_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
