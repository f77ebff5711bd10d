//! Reservation state machine.
//!
//! ```text
//! PENDING_APPROVAL ──approve──▶ APPROVED ──confirm_payment──▶ CONFIRMED
//!        │                         │                             │
//!        ├──reject──▶ REJECTED     │                             │
//!        └────────────cancel───────┴─────────────────────────────┴──▶ CANCELLED_BY_{DRIVER,PASSENGER}
//! ```
//!
//! Every function here only decides. The returned [`Transition`] is applied by whoever owns the
//! row, so a rejected transition can never leave a half-mutated reservation behind.

use crate::error::LifecycleError;
use crate::ledger::SeatLedger;
use crate::models::{Actor, Reservation, ReservationStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub reservation_id: Uuid,
    pub from: ReservationStatus,
    pub to: ReservationStatus,
}

impl Transition {
    fn of(reservation: &Reservation, to: ReservationStatus) -> Self {
        Self {
            reservation_id: reservation.id,
            from: reservation.status,
            to,
        }
    }

    /// Apply to an in-memory reservation. Fails if the row moved since the decision was made.
    pub fn apply(&self, reservation: &mut Reservation, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if reservation.id != self.reservation_id || reservation.status != self.from {
            return Err(LifecycleError::InvalidTransition {
                from: reservation.status,
                to: self.to,
            });
        }
        reservation.status = self.to;
        reservation.updated_at = now;
        Ok(())
    }
}

pub struct ReservationStateMachine;

impl ReservationStateMachine {
    /// Transition: PendingApproval → Approved (seats committed)
    pub fn approve(reservation: &Reservation, ledger: &SeatLedger<'_>) -> Result<Transition, LifecycleError> {
        Self::require(reservation, ReservationStatus::PendingApproval, ReservationStatus::Approved)?;
        ledger.ensure_capacity(reservation.seats_reserved)?;
        Ok(Transition::of(reservation, ReservationStatus::Approved))
    }

    /// Transition: PendingApproval → Rejected
    pub fn reject(reservation: &Reservation) -> Result<Transition, LifecycleError> {
        Self::require(reservation, ReservationStatus::PendingApproval, ReservationStatus::Rejected)?;
        Ok(Transition::of(reservation, ReservationStatus::Rejected))
    }

    /// Transition: Approved → Confirmed (payment received)
    ///
    /// Returns `Ok(None)` when the reservation is already confirmed: payment webhooks retry.
    pub fn confirm_payment(reservation: &Reservation) -> Result<Option<Transition>, LifecycleError> {
        if reservation.status == ReservationStatus::Confirmed {
            return Ok(None);
        }
        Self::require(reservation, ReservationStatus::Approved, ReservationStatus::Confirmed)?;
        Ok(Some(Transition::of(reservation, ReservationStatus::Confirmed)))
    }

    /// Cancel from any non-terminal status
    pub fn cancel(reservation: &Reservation, actor: Actor) -> Result<Transition, LifecycleError> {
        let to = actor.cancelled_status();
        if reservation.status.is_terminal() {
            return Err(LifecycleError::InvalidTransition {
                from: reservation.status,
                to,
            });
        }
        Ok(Transition::of(reservation, to))
    }

    fn require(
        reservation: &Reservation,
        expected: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<(), LifecycleError> {
        if reservation.status != expected {
            return Err(LifecycleError::InvalidTransition {
                from: reservation.status,
                to,
            });
        }
        Ok(())
    }
}
