use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type UserId = Uuid;

/// Trip status. Monotonic: once `Completed` or `Cancelled` nothing moves it again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn is_finalized(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Pending => "PENDING",
            TripStatus::Active => "ACTIVE",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TripStatus::Pending),
            "ACTIVE" => Ok(TripStatus::Active),
            "COMPLETED" => Ok(TripStatus::Completed),
            "CANCELLED" => Ok(TripStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Reservation status. See `transitions` for the allowed moves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    PendingApproval,
    Approved,
    Confirmed,
    Rejected,
    CancelledByDriver,
    CancelledByPassenger,
}

impl ReservationStatus {
    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReservationStatus::Rejected
                | ReservationStatus::CancelledByDriver
                | ReservationStatus::CancelledByPassenger
        )
    }

    /// Statuses counted against the trip's capacity.
    pub fn occupies_seats(self) -> bool {
        matches!(self, ReservationStatus::Approved | ReservationStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::PendingApproval => "PENDING_APPROVAL",
            ReservationStatus::Approved => "APPROVED",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Rejected => "REJECTED",
            ReservationStatus::CancelledByDriver => "CANCELLED_BY_DRIVER",
            ReservationStatus::CancelledByPassenger => "CANCELLED_BY_PASSENGER",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_APPROVAL" => Ok(ReservationStatus::PendingApproval),
            "APPROVED" => Ok(ReservationStatus::Approved),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "REJECTED" => Ok(ReservationStatus::Rejected),
            "CANCELLED_BY_DRIVER" => Ok(ReservationStatus::CancelledByDriver),
            "CANCELLED_BY_PASSENGER" => Ok(ReservationStatus::CancelledByPassenger),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    RefundRequested,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::RefundRequested => "REFUND_REQUESTED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "REFUND_REQUESTED" => Ok(PaymentStatus::RefundRequested),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown status value: {0}")]
pub struct UnknownStatus(pub String);

/// Who initiated a cancellation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Driver,
    Passenger,
}

impl Actor {
    pub fn cancelled_status(self) -> ReservationStatus {
        match self {
            Actor::Driver => ReservationStatus::CancelledByDriver,
            Actor::Passenger => ReservationStatus::CancelledByPassenger,
        }
    }
}

/// A published, seat-limited transportation offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub driver_id: UserId,
    pub status: TripStatus,
    pub departure_time: DateTime<Utc>,
    pub total_seats: u32,
    pub price_per_seat_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(
        driver_id: UserId,
        departure_time: DateTime<Utc>,
        total_seats: u32,
        price_per_seat_cents: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            driver_id,
            status: TripStatus::Active,
            departure_time,
            total_seats,
            price_per_seat_cents,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_driver(&self, user_id: UserId) -> bool {
        self.driver_id == user_id
    }

    /// Signed hours from `now` until departure; negative once the trip has left.
    pub fn hours_until_departure(&self, now: DateTime<Utc>) -> f64 {
        (self.departure_time - now).num_seconds() as f64 / 3600.0
    }
}

/// A passenger's claim on seats of a trip. Never deleted; cancelled rows stay for history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub passenger_id: UserId,
    pub seats_reserved: u32,
    pub price_per_seat_cents: i64,
    pub service_fee_cents: i64,
    pub status: ReservationStatus,
    pub message: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new_pending(
        trip: &Trip,
        passenger_id: UserId,
        seats_reserved: u32,
        service_fee_cents: i64,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id: trip.id,
            passenger_id,
            seats_reserved,
            price_per_seat_cents: trip.price_per_seat_cents,
            service_fee_cents,
            status: ReservationStatus::PendingApproval,
            message,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seats times the per-seat price snapshotted at request time. Excludes the service fee.
    pub fn trip_price_cents(&self) -> i64 {
        i64::from(self.seats_reserved) * self.price_per_seat_cents
    }

    pub fn total_price_cents(&self) -> i64 {
        self.trip_price_cents() + self.service_fee_cents
    }
}

/// Externally owned payment row. The engine only writes refund intent onto it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub reference: Option<String>,
    pub amount_cents: i64,
    pub service_fee_cents: i64,
    pub status: PaymentStatus,
    pub refund_percentage: Option<u8>,
    pub refund_amount_cents: Option<i64>,
    pub driver_compensation_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn completed_for(reservation: &Reservation, reference: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reservation_id: reservation.id,
            reference,
            amount_cents: reservation.total_price_cents(),
            service_fee_cents: reservation.service_fee_cents,
            status: PaymentStatus::Completed,
            refund_percentage: None,
            refund_amount_cents: None,
            driver_compensation_cents: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A trip with every reservation and payment attached to it, as read under the trip lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripSnapshot {
    pub trip: Trip,
    pub reservations: Vec<Reservation>,
    pub payments: Vec<Payment>,
}

impl TripSnapshot {
    pub fn reservation(&self, reservation_id: Uuid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == reservation_id)
    }

    /// The completed payment backing a reservation, if it was paid.
    pub fn payment_for(&self, reservation_id: Uuid) -> Option<&Payment> {
        self.payments
            .iter()
            .find(|p| p.reservation_id == reservation_id && p.status == PaymentStatus::Completed)
    }

    pub fn active_reservation_of(&self, passenger_id: UserId) -> Option<&Reservation> {
        self.reservations
            .iter()
            .find(|r| r.passenger_id == passenger_id && !r.status.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            ReservationStatus::PendingApproval,
            ReservationStatus::Approved,
            ReservationStatus::Confirmed,
            ReservationStatus::Rejected,
            ReservationStatus::CancelledByDriver,
            ReservationStatus::CancelledByPassenger,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::json!(status.as_str())
            );
        }
        assert!("BOGUS".parse::<TripStatus>().is_err());
    }

    #[test]
    fn test_reservation_pricing() {
        let trip = Trip::new(Uuid::new_v4(), Utc::now() + Duration::hours(5), 3, 2500);
        let reservation = Reservation::new_pending(&trip, Uuid::new_v4(), 2, 500, None, Utc::now());

        assert_eq!(reservation.trip_price_cents(), 5000);
        assert_eq!(reservation.total_price_cents(), 5500);
        assert_eq!(reservation.status, ReservationStatus::PendingApproval);
    }

    #[test]
    fn test_hours_until_departure() {
        let now = Utc::now();
        let trip = Trip::new(Uuid::new_v4(), now + Duration::minutes(90), 3, 1000);
        assert!((trip.hours_until_departure(now) - 1.5).abs() < 1e-9);

        let departed = Trip::new(Uuid::new_v4(), now - Duration::hours(2), 3, 1000);
        assert!(departed.hours_until_departure(now) < 0.0);
    }

    #[test]
    fn test_terminal_and_occupying_sets() {
        assert!(!ReservationStatus::Confirmed.is_terminal());
        assert!(ReservationStatus::Confirmed.occupies_seats());
        assert!(!ReservationStatus::PendingApproval.occupies_seats());
        assert!(ReservationStatus::Rejected.is_terminal());
        assert!(TripStatus::Cancelled.is_finalized());
        assert!(!TripStatus::Pending.is_finalized());
    }
}
