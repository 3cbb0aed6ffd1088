//! Webhook receiver endpoints.
//!
//! The delivering platform treats any non-2xx response as a failed
//! delivery and redelivers. Every intake outcome is therefore a 200; only
//! a structurally invalid request (missing identification headers) or an
//! infrastructure fault turns into an error status.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use queue::JobQueue;
use saga::{EventIntake, IntakeResult};
use serde::Serialize;
use store::PipelineStore;

use crate::error::ApiError;

/// Header identifying one delivery; doubles as the dedup key.
pub const WEBHOOK_ID_HEADER: &str = "x-webhook-id";
/// Header naming the originating shop.
pub const SHOP_DOMAIN_HEADER: &str = "x-shop-domain";
/// Header naming the event topic, e.g. `orders/paid`.
pub const WEBHOOK_TOPIC_HEADER: &str = "x-webhook-topic";

/// Shared application state accessible from all handlers.
pub struct AppState<S, Q>
where
    S: PipelineStore,
    Q: JobQueue,
{
    pub intake: EventIntake<S, Q>,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: &'static str,
}

fn required_header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or(ApiError::MissingHeader(name))
}

/// POST /webhooks/orders — accepts an order event delivery.
pub async fn receive_order<S, Q>(
    State(state): State<Arc<AppState<S, Q>>>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<WebhookResponse>, ApiError>
where
    S: PipelineStore,
    Q: JobQueue,
{
    let webhook_id = required_header(&headers, WEBHOOK_ID_HEADER)?;
    let shop = required_header(&headers, SHOP_DOMAIN_HEADER)?;
    let topic = required_header(&headers, WEBHOOK_TOPIC_HEADER)?;

    let result = state.intake.ingest(payload, webhook_id, shop, topic).await?;
    let outcome = match result {
        IntakeResult::Enqueued { .. } => "enqueued",
        IntakeResult::Duplicate => "duplicate",
        IntakeResult::Malformed => "rejected",
        IntakeResult::NoPhone => "skipped",
    };
    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
