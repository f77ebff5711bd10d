use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::post,
    Extension, Json, Router,
};
use carpool_domain::CancellationOutcome;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Caller;
use crate::optional_json;
use crate::state::AppState;
use crate::trips::CancelRequest;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/reservations/{reservation_id}/cancel", post(cancel_reservation))
}

/// POST /v1/reservations/{reservation_id}/cancel
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(reservation_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<CancellationOutcome>, AppError> {
    let request: CancelRequest = optional_json(&body)?;
    let outcome = state
        .orchestrator
        .cancel_reservation_by_passenger(reservation_id, caller, request.reason)
        .await?;
    Ok(Json(outcome))
}
