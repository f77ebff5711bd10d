use crate::error::LifecycleError;
use crate::models::{Reservation, Trip};

/// Seat accounting for one trip.
///
/// Holds no counters of its own: every answer is recomputed from the reservation set so it can
/// never drift from the rows it describes.
#[derive(Debug, Clone, Copy)]
pub struct SeatLedger<'a> {
    trip: &'a Trip,
    reservations: &'a [Reservation],
}

impl<'a> SeatLedger<'a> {
    pub fn new(trip: &'a Trip, reservations: &'a [Reservation]) -> Self {
        Self { trip, reservations }
    }

    /// Seats held by `APPROVED` and `CONFIRMED` reservations of this trip.
    pub fn occupied_seats(&self) -> u32 {
        self.reservations
            .iter()
            .filter(|r| r.trip_id == self.trip.id && r.status.occupies_seats())
            .map(|r| r.seats_reserved)
            .sum()
    }

    /// Fails with `CapacityViolation` if the trip is already overbooked.
    pub fn remaining_seats(&self) -> Result<u32, LifecycleError> {
        let occupied = self.occupied_seats();
        self.trip
            .total_seats
            .checked_sub(occupied)
            .ok_or(LifecycleError::CapacityViolation {
                occupied,
                total: self.trip.total_seats,
            })
    }

    pub fn can_approve(&self, requested_seats: u32) -> Result<bool, LifecycleError> {
        Ok(self.remaining_seats()? >= requested_seats)
    }

    pub fn ensure_capacity(&self, requested_seats: u32) -> Result<(), LifecycleError> {
        let remaining = self.remaining_seats()?;
        if remaining < requested_seats {
            return Err(LifecycleError::CapacityExceeded {
                requested: requested_seats,
                remaining,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReservationStatus;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn reservation(trip: &Trip, seats: u32, status: ReservationStatus) -> Reservation {
        let mut r = Reservation::new_pending(trip, Uuid::new_v4(), seats, 0, None, Utc::now());
        r.status = status;
        r
    }

    #[test]
    fn test_only_approved_and_confirmed_occupy() {
        let trip = Trip::new(Uuid::new_v4(), Utc::now() + Duration::hours(24), 4, 1000);
        let reservations = vec![
            reservation(&trip, 1, ReservationStatus::Approved),
            reservation(&trip, 2, ReservationStatus::Confirmed),
            reservation(&trip, 3, ReservationStatus::PendingApproval),
            reservation(&trip, 3, ReservationStatus::CancelledByPassenger),
            reservation(&trip, 3, ReservationStatus::Rejected),
        ];

        let ledger = SeatLedger::new(&trip, &reservations);
        assert_eq!(ledger.occupied_seats(), 3);
        assert_eq!(ledger.remaining_seats().unwrap(), 1);
        assert!(ledger.can_approve(1).unwrap());
        assert!(!ledger.can_approve(2).unwrap());
    }

    #[test]
    fn test_ensure_capacity_reports_remaining() {
        let trip = Trip::new(Uuid::new_v4(), Utc::now() + Duration::hours(24), 4, 1000);
        let reservations = vec![reservation(&trip, 4, ReservationStatus::Approved)];

        let err = SeatLedger::new(&trip, &reservations).ensure_capacity(1).unwrap_err();
        assert_eq!(err, LifecycleError::CapacityExceeded { requested: 1, remaining: 0 });
    }

    #[test]
    fn test_overbooked_trip_is_an_invariant_violation() {
        let trip = Trip::new(Uuid::new_v4(), Utc::now() + Duration::hours(24), 2, 1000);
        let reservations = vec![
            reservation(&trip, 2, ReservationStatus::Confirmed),
            reservation(&trip, 1, ReservationStatus::Approved),
        ];

        let err = SeatLedger::new(&trip, &reservations).remaining_seats().unwrap_err();
        assert_eq!(err, LifecycleError::CapacityViolation { occupied: 3, total: 2 });
    }

    #[test]
    fn test_reservations_of_other_trips_are_ignored() {
        let trip = Trip::new(Uuid::new_v4(), Utc::now() + Duration::hours(24), 2, 1000);
        let other = Trip::new(Uuid::new_v4(), Utc::now() + Duration::hours(24), 2, 1000);
        let reservations = vec![reservation(&other, 2, ReservationStatus::Confirmed)];

        assert_eq!(SeatLedger::new(&trip, &reservations).remaining_seats().unwrap(), 2);
    }
}
