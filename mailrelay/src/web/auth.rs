//! Bearer token check for the HTTP API.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use super::handlers::{AppState, ErrorResponse};

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// `true` when no token is configured or the request carries the right one.
pub fn is_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected.filter(|t| !t.is_empty()) else {
        return true;
    };

    match bearer_token(headers) {
        Some(provided) => constant_time_compare(expected, provided),
        None => false,
    }
}

/// Rejects requests without the configured API token.
pub async fn require_api_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = state.ctx.config().api_token.as_deref();
    if !is_authorized(expected, request.headers()) {
        warn!(
            path = %request.uri().path(),
            has_token = bearer_token(request.headers()).is_some(),
            "api_auth_rejected"
        );
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("unauthorized")),
        )
            .into_response();
    }

    next.run(request).await
}

/// Constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
