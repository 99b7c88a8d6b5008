//! HTTP transport boundary.
//!
//! Adapters describe their call as an [`HttpRequest`]; an [`HttpTransport`]
//! executes it. Network failures come back as [`TransportError`] values and
//! never escape an adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, error};

/// Failures below the provider API: network, timeouts, SMTP, message building.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("failed to build request: {0}")]
    Build(String),

    #[error("mailer is not configured: missing {0}")]
    NotConfigured(String),
}

/// Request body variants used by provider adapters.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    Multipart { boundary: String, bytes: Vec<u8> },
}

/// A fully assembled outbound API call.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn basic_auth(self, user: &str, password: &str) -> Self {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let encoded = STANDARD.encode(format!("{}:{}", user, password));
        self.header("Authorization", format!("Basic {}", encoded))
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    pub fn multipart(mut self, boundary: String, bytes: Vec<u8>) -> Self {
        self.body = RequestBody::Multipart { boundary, bytes };
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Value of a form field, for urlencoded bodies.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Content type implied by the body.
    pub fn content_type(&self) -> Option<String> {
        match &self.body {
            RequestBody::Empty => None,
            RequestBody::Json(_) => Some("application/json".to_string()),
            RequestBody::Form(_) => Some("application/x-www-form-urlencoded".to_string()),
            RequestBody::Multipart { boundary, .. } => {
                Some(format!("multipart/form-data; boundary={}", boundary))
            }
        }
    }

    /// Bytes that go on the wire.
    pub fn body_bytes(&self) -> Vec<u8> {
        match &self.body {
            RequestBody::Empty => Vec::new(),
            RequestBody::Json(v) => serde_json::to_vec(v).unwrap_or_default(),
            RequestBody::Form(fields) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields.iter())
                .finish()
                .into_bytes(),
            RequestBody::Multipart { bytes, .. } => bytes.clone(),
        }
    }
}

/// Raw API response as seen by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Decoded JSON body, if the body is JSON at all.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn reason(&self) -> &'static str {
        reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown")
    }
}

/// Executes provider API calls.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mailrelay/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(content_type) = request.content_type() {
            if request.header_value("Content-Type").is_none() {
                builder = builder.header("Content-Type", content_type);
            }
        }

        let body = request.body_bytes();
        let body_length = body.len();
        if !body.is_empty() {
            builder = builder.body(body);
        }

        debug!(
            url = %request.url,
            body_length = body_length,
            "http_request_sending"
        );

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                error!(url = %request.url, error = %e, "http_request_timeout");
                TransportError::Timeout(e.to_string())
            } else {
                error!(url = %request.url, error = %e, "http_request_error");
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        debug!(
            url = %request.url,
            status_code = status,
            response_length = body.len(),
            "http_request_complete"
        );

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_form_body_is_urlencoded() {
        let request = HttpRequest::post("https://example.com")
            .form(vec![("to".into(), "a@b.com, c@d.com".into()), ("subject".into(), "Hi & bye".into())]);

        let body = String::from_utf8(request.body_bytes()).unwrap();
        assert_eq!(body, "to=a%40b.com%2C+c%40d.com&subject=Hi+%26+bye");
        assert_eq!(request.form_value("subject"), Some("Hi & bye"));
        assert_eq!(
            request.content_type().as_deref(),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_basic_auth_header() {
        let request = HttpRequest::post("https://example.com").basic_auth("api", "key-123");
        assert_eq!(request.header_value("authorization"), Some("Basic YXBpOmtleS0xMjM="));
    }

    #[test]
    fn test_json_body_bytes_are_stable() {
        let request = HttpRequest::post("https://example.com").json(json!({"b": 1, "a": [1, 2]}));
        assert_eq!(request.body_bytes(), request.body_bytes());
        assert_eq!(request.content_type().as_deref(), Some("application/json"));
    }

    #[test]
    fn test_response_helpers() {
        let response = HttpResponse::new(404, r#"{"message":"nope"}"#).with_header("X-Message-Id", "abc");
        assert_eq!(response.reason(), "Not Found");
        assert_eq!(response.header("x-message-id"), Some("abc"));
        assert_eq!(response.json().unwrap()["message"], "nope");
        assert!(HttpResponse::new(200, "not json").json().is_none());
    }
}
