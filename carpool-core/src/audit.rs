use async_trait::async_trait;
use carpool_domain::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::BoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    TripCancelled,
    ReservationCancelled,
    ReservationRequested,
    ReservationApproved,
    ReservationRejected,
    PaymentConfirmed,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::TripCancelled => "TRIP_CANCELLED",
            ActionType::ReservationCancelled => "RESERVATION_CANCELLED",
            ActionType::ReservationRequested => "RESERVATION_REQUESTED",
            ActionType::ReservationApproved => "RESERVATION_APPROVED",
            ActionType::ReservationRejected => "RESERVATION_REJECTED",
            ActionType::PaymentConfirmed => "PAYMENT_CONFIRMED",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Success,
    Failed,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Success => "SUCCESS",
            ActionStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    /// `None` for system-initiated actions such as payment webhooks.
    pub actor_id: Option<UserId>,
    pub action: ActionType,
    pub status: ActionStatus,
    pub details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), BoxError>;
}
