//! Email addresses with best-effort validation.
//!
//! Construction never fails loudly: anything that does not look like a
//! deliverable address yields `None` and the caller drops it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Characters that may not appear in the local part of an address.
const FORBIDDEN_LOCAL: &[char] = &['<', '>', '(', ')', '[', ']', '\\', ',', ';', ':', '"'];

/// A validated email address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// The mailbox, e.g. `jane@example.com`.
    pub email: String,
    /// Display name, e.g. `Jane Doe`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Address {
    /// Create an address without a display name.
    pub fn new(email: impl AsRef<str>) -> Option<Self> {
        Self::with_name(email, "")
    }

    /// Create an address with a display name. Empty names are discarded.
    pub fn with_name(email: impl AsRef<str>, name: impl AsRef<str>) -> Option<Self> {
        let email = email.as_ref().trim();
        if !is_valid_email(email) {
            return None;
        }

        let name = strip_line_breaks(name.as_ref());
        let name = name.trim().trim_matches('"').trim();
        Some(Self {
            email: email.to_string(),
            name: (!name.is_empty()).then(|| name.to_string()),
        })
    }

    /// Parse `jane@example.com` or `Jane Doe <jane@example.com>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match (raw.rfind('<'), raw.rfind('>')) {
            (Some(start), Some(end)) if start < end => {
                Self::with_name(&raw[start + 1..end], &raw[..start])
            }
            _ => Self::new(raw),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Render as a header value: `"Doe, Jane" <jane@example.com>`.
    pub fn to_header(&self) -> String {
        // Deserialized addresses skip `with_name`.
        let name = self.name.as_deref().map(strip_line_breaks);
        match &name {
            Some(name) if needs_quoting(name) => {
                format!("\"{}\" <{}>", name.replace('\\', "\\\\").replace('"', "\\\""), self.email)
            }
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header())
    }
}

/// Replace CR and LF (and other control characters) with spaces so a name
/// can never start a new header line.
fn strip_line_breaks(name: &str) -> String {
    name.chars().map(|c| if c.is_control() { ' ' } else { c }).collect()
}

fn needs_quoting(name: &str) -> bool {
    name.chars()
        .any(|c| matches!(c, ',' | ';' | ':' | '<' | '>' | '@' | '"' | '(' | ')' | '[' | ']' | '.' | '\\'))
}

/// Check whether a string is a plausible, deliverable email address.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 254 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return false;
    }

    if local
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_LOCAL.contains(&c))
    {
        return false;
    }

    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }

    if !domain.contains('.') {
        return false;
    }

    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name+tag@sub.example.co.uk"));
        assert!(is_valid_email("a@b.io"));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("plainaddress"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("us er@example.com"));
        assert!(!is_valid_email("user@-example.com"));
        assert!(!is_valid_email("user@example..com"));
        assert!(!is_valid_email(".user@example.com"));
    }

    #[test]
    fn test_parse_named_address() {
        let addr = Address::parse("Jane Doe <jane@example.com>").unwrap();
        assert_eq!(addr.email(), "jane@example.com");
        assert_eq!(addr.name(), Some("Jane Doe"));

        let quoted = Address::parse("\"Doe, Jane\" <jane@example.com>").unwrap();
        assert_eq!(quoted.name(), Some("Doe, Jane"));
    }

    #[test]
    fn test_name_line_breaks_removed() {
        let addr = Address::with_name("jane@example.com", "Jane\r\nBcc: evil@example.com").unwrap();
        assert!(!addr.to_header().contains('\r'));
        assert!(!addr.to_header().contains('\n'));
        assert_eq!(addr.name(), Some("Jane  Bcc: evil@example.com"));

        let raw: Address =
            serde_json::from_str(r#"{"email":"jane@example.com","name":"Jane\nX-Evil: 1"}"#).unwrap();
        assert_eq!(raw.to_header(), "\"Jane X-Evil: 1\" <jane@example.com>");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Address::parse("Jane <not-an-email>").is_none());
        assert!(Address::parse("").is_none());
    }

    #[test]
    fn test_empty_name_is_dropped() {
        let addr = Address::with_name("jane@example.com", "  ").unwrap();
        assert_eq!(addr.name(), None);
        assert_eq!(addr.to_header(), "jane@example.com");
    }

    #[test]
    fn test_header_quoting() {
        let plain = Address::with_name("jane@example.com", "Jane Doe").unwrap();
        assert_eq!(plain.to_header(), "Jane Doe <jane@example.com>");

        let comma = Address::with_name("jane@example.com", "Doe, Jane").unwrap();
        assert_eq!(comma.to_header(), "\"Doe, Jane\" <jane@example.com>");
    }
}
