//! API endpoint handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::{AppContext, Delivery};
use crate::message::{AttachmentSource, Message};
use crate::queue::{Priority, QueueError};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
}

impl AppState {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: &'static str) -> Self {
        Self { status, error: None }
    }

    pub fn with_error(status: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            error: Some(error.into()),
        }
    }
}

fn queue_error_response(id: Uuid, e: QueueError) -> Response {
    match e {
        QueueError::NotFound(_) => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse::new("not_found"))).into_response()
        }
        QueueError::InvalidState { .. } => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::with_error("invalid_state", e.to_string())),
        )
            .into_response(),
        e => {
            error!(entry_id = %id, error = %e, "queue_request_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_error("error", e.to_string())),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mailer: String,
    pub queue_enabled: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        mailer: state.ctx.dispatcher().active_mailer().to_string(),
        queue_enabled: state.ctx.is_queue_enabled(),
    })
}

// =============================================================================
// Messages
// =============================================================================

/// Body of `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub message: Message,
    #[serde(default)]
    pub priority: Priority,
}

/// Submit a message for delivery.
///
/// Queued messages answer 202, direct sends 200 on success and 502 when
/// the provider rejected them. Attachments must carry inline content; file
/// paths on the server are refused.
pub async fn send_message(State(state): State<AppState>, Json(request): Json<SendRequest>) -> Response {
    let message = request.message;

    if message
        .attachments
        .iter()
        .any(|a| !matches!(a.source, AttachmentSource::Bytes { .. }))
    {
        warn!(attachments = message.attachments.len(), "message_rejected_attachment_source");
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::with_error(
                "invalid",
                "attachments must be sent as inline bytes",
            )),
        )
            .into_response();
    }

    info!(
        recipients = message.recipients.len(),
        attachments = message.attachments.len(),
        priority = ?request.priority,
        "message_received"
    );

    let delivery = state.ctx.deliver(&message, request.priority).await;
    let status = match &delivery {
        Delivery::Queued { .. } => StatusCode::ACCEPTED,
        Delivery::Sent(_) => StatusCode::OK,
        Delivery::Failed(_) => StatusCode::BAD_GATEWAY,
    };

    (status, Json(delivery)).into_response()
}

/// Current state of one queue entry.
pub async fn get_message(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.ctx.queue().get(id).await {
        Ok(Some(entry)) => Json(entry).into_response(),
        Ok(None) => queue_error_response(id, QueueError::NotFound(id)),
        Err(e) => queue_error_response(id, e),
    }
}

/// Put a failed entry back in the queue.
pub async fn reset_message(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.ctx.queue().reset(id).await {
        Ok(entry) => Json(entry).into_response(),
        Err(e) => queue_error_response(id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::HttpResponse;
    use crate::message::Attachment;
    use crate::queue::EntryState;
    use crate::tasks::test_support::test_context;
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(priority: Priority) -> SendRequest {
        SendRequest {
            message: Message::builder()
                .to("user@example.com", "User")
                .subject("Hello")
                .text("Body")
                .build(),
            priority,
        }
    }

    #[test]
    fn test_send_request_parses_json() {
        let request: SendRequest = serde_json::from_value(json!({
            "message": {
                "recipients": [{"kind": "to", "email": "user@example.com"}],
                "subject": "Hi",
                "body": {"single": "Hello"}
            },
            "priority": "immediate"
        }))
        .unwrap();

        assert_eq!(request.priority, Priority::Immediate);
        assert_eq!(request.message.recipients[0].address.email, "user@example.com");
    }

    #[tokio::test]
    async fn test_queued_message_returns_entry_id() {
        let t = test_context(true);
        let state = AppState::new(Arc::new(t.ctx));

        let response = send_message(State(state.clone()), Json(request(Priority::Normal))).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = body_json(response).await;
        assert_eq!(body["status"], "queued");
        let id: Uuid = body["entry_id"].as_str().unwrap().parse().unwrap();

        let response = get_message(State(state), Path(id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["state"], "pending");
    }

    #[tokio::test]
    async fn test_direct_send_failure_is_bad_gateway() {
        let t = test_context(false);
        t.transport.push(Ok(HttpResponse::new(
            422,
            r#"{"name":"validation_error","message":"Invalid from"}"#,
        )));
        let state = AppState::new(Arc::new(t.ctx));

        let response = send_message(State(state), Json(request(Priority::Normal))).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["status"], "failed");
        assert_eq!(body["mailer"], "resend");
        assert!(body["error"].as_str().unwrap().contains("Invalid from"));
    }

    #[tokio::test]
    async fn test_path_attachments_are_refused() {
        let t = test_context(true);
        let state = AppState::new(Arc::new(t.ctx));
        let mut req = request(Priority::Normal);
        req.message.add_attachment(Attachment::from_path("/etc/passwd"));

        let response = send_message(State(state), Json(req)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_reset_states() {
        let t = test_context(true);
        t.transport.push(Ok(HttpResponse::new(500, "oops")));
        let ctx = Arc::new(t.ctx);
        let state = AppState::new(ctx.clone());

        let response = reset_message(State(state.clone()), Path(Uuid::new_v4())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let id = ctx.queue().enqueue(&request(Priority::Normal).message, Priority::Normal).await.unwrap();
        let response = reset_message(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        ctx.queue().process().await.unwrap();
        assert_eq!(ctx.queue().get(id).await.unwrap().unwrap().state, EntryState::Failed);

        let response = reset_message(State(state), Path(id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["state"], "pending");
    }
}
