use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use carpool_domain::{CancellationOutcome, ReservationUpdate};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Caller;
use crate::state::AppState;
use crate::{optional_json, required_json};

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub seats: u32,
    pub message: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{trip_id}/cancel", post(cancel_trip))
        .route("/v1/trips/{trip_id}/reservations", post(request_reservation))
        .route(
            "/v1/trips/{trip_id}/reservations/{reservation_id}/approve",
            post(approve_reservation),
        )
        .route(
            "/v1/trips/{trip_id}/reservations/{reservation_id}/reject",
            post(reject_reservation),
        )
}

/// POST /v1/trips/{trip_id}/cancel
pub async fn cancel_trip(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(trip_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<CancellationOutcome>, AppError> {
    let request: CancelRequest = optional_json(&body)?;
    let outcome = state
        .orchestrator
        .cancel_trip_by_driver(trip_id, caller, request.reason)
        .await?;
    Ok(Json(outcome))
}

/// POST /v1/trips/{trip_id}/reservations
pub async fn request_reservation(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(trip_id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<ReservationUpdate>), AppError> {
    let request: ReserveRequest = required_json(&body)?;
    let update = state
        .orchestrator
        .request_reservation(trip_id, caller, request.seats, request.message)
        .await?;
    Ok((StatusCode::CREATED, Json(update)))
}

pub async fn approve_reservation(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path((trip_id, reservation_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ReservationUpdate>, AppError> {
    let update = state
        .orchestrator
        .approve_reservation(trip_id, reservation_id, caller)
        .await?;
    Ok(Json(update))
}

pub async fn reject_reservation(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path((trip_id, reservation_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ReservationUpdate>, AppError> {
    let update = state
        .orchestrator
        .reject_reservation(trip_id, reservation_id, caller)
        .await?;
    Ok(Json(update))
}
