//! End-to-end sends through the reqwest transport against a mock provider.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mailrelay::mailer::{ReqwestTransport, SenderDefaults};
use mailrelay::{Attachment, Dispatcher, MailerRegistry, Message, ProviderSettings};

fn dispatcher(server: &MockServer, timeout: Duration) -> Dispatcher {
    let mut settings = ProviderSettings::default();
    settings.insert("postal", "host", &server.uri());
    settings.insert("postal", "api_key", "postal-key");

    let transport = ReqwestTransport::new(timeout).unwrap();
    Dispatcher::new(
        MailerRegistry::new(settings, Arc::new(transport)),
        "postal",
        SenderDefaults {
            from_email: "relay@example.com".to_string(),
            from_name: "Relay".to_string(),
            ..Default::default()
        },
    )
}

fn message() -> Message {
    Message::builder()
        .to("user@example.com", "User")
        .to("not-an-address", "")
        .subject("Your receipt")
        .text("Thanks for your order")
        .html("<p>Thanks for your order</p>")
        .attachment(Attachment::from_bytes(b"PDF".to_vec(), Some("receipt.pdf")))
        .build()
}

#[tokio::test]
async fn test_send_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/send/message"))
        .and(header("X-Server-API-Key", "postal-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "message_id": "abc@postal.example.com", "messages": {} }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let report = dispatcher(&server, Duration::from_secs(5)).send(&message()).await;

    assert!(report.sent, "unexpected error: {:?}", report.error);
    assert_eq!(report.mailer, "postal");
    assert_eq!(report.message_id.as_deref(), Some("abc@postal.example.com"));

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["from"], "Relay <relay@example.com>");
    assert_eq!(body["to"], json!(["User <user@example.com>"]));
    assert_eq!(body["plain_body"], "Thanks for your order");
    assert_eq!(body["attachments"][0]["data"], "UERG");
    assert_eq!(
        received[0].headers.get("content-type").unwrap().to_str().unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_provider_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/send/message"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "parameter-error",
            "data": { "code": "NoRecipients", "message": "There are no recipients defined to receive this message" }
        })))
        .mount(&server)
        .await;

    let report = dispatcher(&server, Duration::from_secs(5)).send(&message()).await;

    assert!(!report.sent);
    assert!(report.message_id.is_none());
    let error = report.error.unwrap();
    assert!(error.contains("NoRecipients"), "got {}", error);
}

#[tokio::test]
async fn test_server_error_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let report = dispatcher(&server, Duration::from_secs(5)).send(&message()).await;

    assert!(!report.sent);
    assert!(report.error.unwrap().contains("503"));
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "success", "data": { "message_id": "late" } }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let report = dispatcher(&server, Duration::from_millis(50)).send(&message()).await;

    assert!(!report.sent);
    assert!(report.error.unwrap().contains("timed out"));
}
