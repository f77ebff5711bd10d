use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    #[serde(rename = "type")]
    pub type_: String,
    pub reservation_id: Uuid,
    pub reference: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Payment provider callback. Only `payment.succeeded` moves a reservation; retries are harmless.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PaymentWebhook>, axum::extract::rejection::JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let presented = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.webhook_secret.matches(presented) {
        return Err(AppError::Authentication("Firma de webhook inválida".into()));
    }

    let Json(payload) = payload?;
    tracing::info!(
        "Received webhook: {} for reservation {}",
        payload.type_,
        payload.reservation_id
    );

    if payload.type_ != "payment.succeeded" {
        return Ok((StatusCode::ACCEPTED, Json(json!({ "ignored": payload.type_ }))));
    }

    let update = state
        .orchestrator
        .confirm_payment(payload.reservation_id, payload.reference)
        .await?;

    Ok((StatusCode::OK, Json(json!(update))))
}
