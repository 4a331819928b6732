mod orders;

pub use orders::*;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;

use crate::db::AppState;
use crate::models::StoredWebhookEvent;
use crate::payments::{self, LemonSqueezyWebhookEvent};
use crate::tasks;
use crate::util::now_iso;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/lemonsqueezy", post(handle_lemonsqueezy_webhook))
}

pub async fn handle_lemonsqueezy_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = match headers
        .get("x-signature")
        .or_else(|| headers.get("x-lemon-signature"))
    {
        Some(sig) => match sig.to_str() {
            Ok(s) => s.to_string(),
            Err(_) => return (StatusCode::BAD_REQUEST, "Invalid signature header"),
        },
        None => return (StatusCode::BAD_REQUEST, "Missing x-signature header"),
    };

    let Some(secret) = state.config.webhook_secret.as_deref() else {
        tracing::error!("LEMONSQUEEZY_WEBHOOK_SECRET is not configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Server misconfigured");
    };

    // Verify against the exact bytes on the wire, before any parsing.
    if payments::verify_webhook_signature(secret, &body, &signature).is_err() {
        return (StatusCode::BAD_REQUEST, "Invalid signature");
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Failed to parse LemonSqueezy webhook: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };
    let event: LemonSqueezyWebhookEvent = match serde_json::from_value(payload.clone()) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Unexpected LemonSqueezy webhook shape: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    // Audit trail first. Best effort: a failed append never blocks the
    // lifecycle decision below.
    let event_log_key = log_event(&state, &event, payload);

    match event.meta.event_name.as_str() {
        "order_created" => process_order_created(state, &event).await,
        "order_refunded" => process_order_refunded(state, &event, event_log_key).await,
        other => {
            tracing::info!(event_name = %other, "ignoring event (no license action)");
            (StatusCode::OK, "Event ignored")
        }
    }
}

fn log_event(
    state: &AppState,
    event: &LemonSqueezyWebhookEvent,
    payload: serde_json::Value,
) -> Option<String> {
    let order_id = if event.data.id.is_empty() {
        "unknown-order-id"
    } else {
        &event.data.id
    };
    let stored = StoredWebhookEvent {
        received_at: now_iso(),
        event_name: event.meta.event_name.clone(),
        order_id: order_id.to_string(),
        payload,
    };

    let conn = tasks::best_effort_sync("event_log_conn", state.db.get().map_err(Into::into))?;
    tasks::best_effort_sync("event_log_append", crate::db::events::append(&conn, &stored))
}
