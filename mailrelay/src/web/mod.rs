//! HTTP API for submitting messages and inspecting the queue.
//!
//! ```text
//! GET  /health
//! POST /messages              {message, priority} → {status, entry_id?, ...}
//! GET  /messages/:id
//! POST /messages/:id/reset
//! ```
//!
//! Every route except `/health` requires `Authorization: Bearer <token>`
//! when `MAILRELAY_API_TOKEN` is set.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use auth::{bearer_token, is_authorized, require_api_token};
pub use handlers::{
    get_message, health, reset_message, send_message, AppState, ErrorResponse, HealthResponse,
    SendRequest,
};

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/messages", post(send_message))
        .route("/messages/:id", get(get_message))
        .route("/messages/:id/reset", post(reset_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_token));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
