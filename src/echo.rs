//! Demo webhook receiver that logs whatever the webhook sink posts.
//!
//! Useful for pointing `notifications.webhook.url` at a local process
//! while setting up a mailbox.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::sinks::webhook::SECRET_HEADER;

struct EchoState {
    secret: Option<SecretString>,
}

/// Routes: `GET /` and `POST /webhook`. With a secret, requests must
/// carry a matching `X-Webhook-Secret` header.
pub fn echo_routes(secret: Option<SecretString>) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/webhook", post(receive))
        .with_state(Arc::new(EchoState { secret }))
}

async fn hello() -> Html<&'static str> {
    Html("<p>Hello, World!</p>")
}

async fn receive(
    State(state): State<Arc<EchoState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(expected) = &state.secret {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.expose_secret()) {
            tracing::warn!("Rejected webhook with missing or wrong secret");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid webhook secret" })),
            );
        }
    }

    let payload = serde_json::from_slice::<Value>(&body)
        .ok()
        .filter(|v| !is_blank(v));
    let Some(payload) = payload else {
        tracing::error!("No JSON payload received");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No JSON payload" })),
        );
    };

    tracing::info!(%payload, "Received webhook payload");
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "message": "Webhook received" })),
    )
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
