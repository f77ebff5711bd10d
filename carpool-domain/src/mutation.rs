use crate::error::{Entity, LifecycleError};
use crate::models::{Payment, PaymentStatus, Reservation, TripSnapshot, TripStatus};
use crate::policy::RefundSplit;
use crate::transitions::Transition;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One row-level change. An operation produces an ordered list of these and the store applies
/// all of them in a single transaction, or none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mutation {
    TripStatus {
        trip_id: Uuid,
        from: TripStatus,
        to: TripStatus,
    },
    ReservationStatus {
        transition: Transition,
        reason: Option<String>,
    },
    InsertReservation {
        reservation: Reservation,
    },
    InsertPayment {
        payment: Payment,
    },
    RequestRefund {
        payment_id: Uuid,
        split: RefundSplit,
    },
}

impl TripSnapshot {
    /// Apply a mutation to this snapshot, checking the same preconditions the SQL store checks.
    pub fn apply(&mut self, mutation: &Mutation, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        match mutation {
            Mutation::TripStatus { trip_id, from, to } => {
                if self.trip.id != *trip_id {
                    return Err(LifecycleError::not_found(Entity::Trip, *trip_id));
                }
                if self.trip.status != *from {
                    return Err(stale(format!(
                        "trip {} is {}, expected {}",
                        trip_id, self.trip.status, from
                    )));
                }
                self.trip.status = *to;
                self.trip.updated_at = now;
            }
            Mutation::ReservationStatus { transition, reason } => {
                let reservation = self
                    .reservations
                    .iter_mut()
                    .find(|r| r.id == transition.reservation_id)
                    .ok_or_else(|| LifecycleError::not_found(Entity::Reservation, transition.reservation_id))?;
                transition.apply(reservation, now)?;
                if reason.is_some() {
                    reservation.cancellation_reason = reason.clone();
                }
            }
            Mutation::InsertReservation { reservation } => {
                if self.reservations.iter().any(|r| r.id == reservation.id) {
                    return Err(stale(format!("reservation {} already exists", reservation.id)));
                }
                self.reservations.push(reservation.clone());
            }
            Mutation::InsertPayment { payment } => {
                if self.payments.iter().any(|p| p.id == payment.id) {
                    return Err(stale(format!("payment {} already exists", payment.id)));
                }
                self.payments.push(payment.clone());
            }
            Mutation::RequestRefund { payment_id, split } => {
                let payment = self
                    .payments
                    .iter_mut()
                    .find(|p| p.id == *payment_id)
                    .ok_or_else(|| stale(format!("payment {} not found", payment_id)))?;
                if payment.status != PaymentStatus::Completed {
                    return Err(stale(format!("payment {} is {}", payment_id, payment.status)));
                }
                payment.status = PaymentStatus::RefundRequested;
                payment.refund_percentage = Some(split.refund_percentage);
                payment.refund_amount_cents = Some(split.refund_cents);
                payment.driver_compensation_cents = Some(split.compensation_cents);
                payment.updated_at = now;
            }
        }
        Ok(())
    }
}

fn stale(detail: String) -> LifecycleError {
    LifecycleError::Infrastructure(format!("concurrent modification: {}", detail))
}
