use crate::models::{ReservationStatus, TripStatus, UserId};
use carpool_shared::models::events::InstructionKind;
use serde::Serialize;
use uuid::Uuid;

/// Status an operation left behind, for whichever entity it targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NewStatus {
    Trip(TripStatus),
    Reservation(ReservationStatus),
}

/// Refund or compensation intent for the payment subsystem. The engine never moves money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInstruction {
    pub kind: InstructionKind,
    pub payment_id: Uuid,
    pub reservation_id: Uuid,
    pub recipient_id: UserId,
    pub amount_cents: i64,
    pub percentage: u8,
}

/// Result of a cancellation. Not persisted; it only drives notification and logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancellationOutcome {
    pub trip_id: Uuid,
    pub driver_id: UserId,
    pub reservation_id: Option<Uuid>,
    pub affected_passenger_count: usize,
    pub affected_passengers: Vec<UserId>,
    pub refund_processed: bool,
    pub refund_percentage: u8,
    pub refund_amount_cents: i64,
    pub driver_compensation_cents: i64,
    pub hours_before_departure: f64,
    pub new_status: NewStatus,
    pub payment_instructions: Vec<PaymentInstruction>,
}

impl CancellationOutcome {
    pub fn driver_compensation_percentage(&self) -> u8 {
        if self.refund_processed {
            100 - self.refund_percentage
        } else {
            0
        }
    }
}

/// Result of approve, reject, payment confirmation and seat requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationUpdate {
    pub trip_id: Uuid,
    pub driver_id: UserId,
    pub reservation_id: Uuid,
    pub passenger_id: UserId,
    pub previous_status: Option<ReservationStatus>,
    pub new_status: ReservationStatus,
    /// False when the call was an idempotent repeat.
    pub changed: bool,
    pub remaining_seats: u32,
}
