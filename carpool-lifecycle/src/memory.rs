use async_trait::async_trait;
use carpool_core::{StoreError, TripStore, TripTransaction};
use carpool_domain::{Mutation, Payment, Reservation, Trip, TripSnapshot};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct State {
    trips: Mutex<HashMap<Uuid, TripSnapshot>>,
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    fail_next_commit: AtomicBool,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Trip store held entirely in memory.
///
/// Each trip has its own async lock standing in for `SELECT ... FOR UPDATE`. A transaction works
/// on a private copy of the snapshot and swaps it in on commit.
#[derive(Clone, Default)]
pub struct InMemoryTripStore {
    state: Arc<State>,
}

impl InMemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_trip(&self, trip: Trip) {
        guard(&self.state.trips).insert(
            trip.id,
            TripSnapshot {
                trip,
                reservations: Vec::new(),
                payments: Vec::new(),
            },
        );
    }

    /// Seed a reservation. Ignored if its trip is unknown.
    pub fn insert_reservation(&self, reservation: Reservation) {
        if let Some(snapshot) = guard(&self.state.trips).get_mut(&reservation.trip_id) {
            snapshot.reservations.push(reservation);
        }
    }

    /// Seed a payment. Ignored if its reservation is unknown.
    pub fn insert_payment(&self, payment: Payment) {
        let mut trips = guard(&self.state.trips);
        if let Some(snapshot) = trips
            .values_mut()
            .find(|s| s.reservation(payment.reservation_id).is_some())
        {
            snapshot.payments.push(payment);
        }
    }

    pub fn snapshot(&self, trip_id: Uuid) -> Option<TripSnapshot> {
        guard(&self.state.trips).get(&trip_id).cloned()
    }

    pub fn reservation(&self, reservation_id: Uuid) -> Option<Reservation> {
        guard(&self.state.trips)
            .values()
            .find_map(|s| s.reservation(reservation_id).cloned())
    }

    pub fn payment_for(&self, reservation_id: Uuid) -> Option<Payment> {
        guard(&self.state.trips).values().find_map(|s| {
            s.payments
                .iter()
                .find(|p| p.reservation_id == reservation_id)
                .cloned()
        })
    }

    /// Make the next commit fail after its mutations were applied to the working copy.
    pub fn fail_next_commit(&self) {
        self.state.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn trip_lock(&self, trip_id: Uuid) -> Arc<AsyncMutex<()>> {
        guard(&self.state.locks).entry(trip_id).or_default().clone()
    }
}

#[async_trait]
impl TripStore for InMemoryTripStore {
    async fn begin(&self) -> Result<Box<dyn TripTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            lock: None,
            working: None,
        }))
    }

    async fn trip_id_for_reservation(&self, reservation_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(guard(&self.state.trips)
            .values()
            .find(|s| s.reservation(reservation_id).is_some())
            .map(|s| s.trip.id))
    }
}

struct MemoryTransaction {
    store: InMemoryTripStore,
    lock: Option<OwnedMutexGuard<()>>,
    working: Option<TripSnapshot>,
}

#[async_trait]
impl TripTransaction for MemoryTransaction {
    async fn lock_trip(&mut self, trip_id: Uuid) -> Result<Option<TripSnapshot>, StoreError> {
        if self.lock.is_some() {
            return Err(StoreError::Database("transaction already holds a trip lock".into()));
        }

        let lock = self.store.trip_lock(trip_id).lock_owned().await;
        let snapshot = self.store.snapshot(trip_id);
        if snapshot.is_some() {
            self.lock = Some(lock);
            self.working = snapshot.clone();
        }
        Ok(snapshot)
    }

    async fn apply(&mut self, mutations: &[Mutation]) -> Result<(), StoreError> {
        let working = self
            .working
            .as_mut()
            .ok_or_else(|| StoreError::Database("no trip locked in this transaction".into()))?;

        let now = Utc::now();
        for mutation in mutations {
            working
                .apply(mutation, now)
                .map_err(|e| StoreError::Conflict(e.to_string()))?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        if this.store.state.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database("simulated commit failure".into()));
        }

        // The trip lock in `this.lock` is released only after the swap.
        if let Some(snapshot) = this.working {
            guard(&this.store.state.trips).insert(snapshot.trip.id, snapshot);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carpool_domain::{ReservationStatus, Transition};
    use chrono::Duration;

    fn seeded() -> (InMemoryTripStore, Trip, Reservation) {
        let store = InMemoryTripStore::new();
        let trip = Trip::new(Uuid::new_v4(), Utc::now() + Duration::hours(10), 3, 5_000);
        let reservation = Reservation::new_pending(&trip, Uuid::new_v4(), 1, 500, None, Utc::now());
        store.insert_trip(trip.clone());
        store.insert_reservation(reservation.clone());
        (store, trip, reservation)
    }

    fn approve(reservation: &Reservation) -> Mutation {
        Mutation::ReservationStatus {
            transition: Transition {
                reservation_id: reservation.id,
                from: ReservationStatus::PendingApproval,
                to: ReservationStatus::Approved,
            },
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let (store, trip, reservation) = seeded();

        let mut tx = store.begin().await.unwrap();
        tx.lock_trip(trip.id).await.unwrap().unwrap();
        tx.apply(&[approve(&reservation)]).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            store.reservation(reservation.id).unwrap().status,
            ReservationStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_no_trace() {
        let (store, trip, reservation) = seeded();

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_trip(trip.id).await.unwrap().unwrap();
            tx.apply(&[approve(&reservation)]).await.unwrap();
        }

        assert_eq!(
            store.reservation(reservation.id).unwrap().status,
            ReservationStatus::PendingApproval
        );
    }

    #[tokio::test]
    async fn test_failed_commit_discards_working_copy() {
        let (store, trip, reservation) = seeded();
        store.fail_next_commit();

        let mut tx = store.begin().await.unwrap();
        tx.lock_trip(trip.id).await.unwrap().unwrap();
        tx.apply(&[approve(&reservation)]).await.unwrap();
        assert!(tx.commit().await.is_err());

        assert_eq!(
            store.reservation(reservation.id).unwrap().status,
            ReservationStatus::PendingApproval
        );
    }

    #[tokio::test]
    async fn test_stale_mutation_is_a_conflict() {
        let (store, trip, reservation) = seeded();

        let mut tx = store.begin().await.unwrap();
        tx.lock_trip(trip.id).await.unwrap().unwrap();
        tx.apply(&[approve(&reservation)]).await.unwrap();
        let err = tx.apply(&[approve(&reservation)]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_second_transaction_waits_for_the_lock() {
        let (store, trip, _) = seeded();

        let mut first = store.begin().await.unwrap();
        first.lock_trip(trip.id).await.unwrap().unwrap();

        let contender = store.clone();
        let trip_id = trip.id;
        let waiter = tokio::spawn(async move {
            let mut second = contender.begin().await.unwrap();
            second.lock_trip(trip_id).await.unwrap().is_some()
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        first.rollback().await.unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_trip_is_none() {
        let store = InMemoryTripStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_trip(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.trip_id_for_reservation(Uuid::new_v4()).await.unwrap().is_none());
    }
}
