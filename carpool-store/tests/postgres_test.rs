//! Runs against a live database: `DATABASE_URL=... cargo test -p carpool-store --features postgres-tests`
#![cfg(feature = "postgres-tests")]

use carpool_core::{FixedClock, StoreError, TripStore};
use carpool_domain::{
    CancellationPolicy, Mutation, Payment, PaymentStatus, Reservation, ReservationStatus, Transition, Trip,
    TripStatus,
};
use carpool_lifecycle::mocks::Recorders;
use carpool_lifecycle::LifecycleOrchestrator;
use carpool_store::{DbClient, PgTripStore};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

async fn connect() -> DbClient {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = DbClient::new(&url, 10).await.expect("connect");
    db.migrate().await.expect("migrate");
    db
}

async fn seed_trip(db: &DbClient, seats: i32, hours_out: i64) -> Trip {
    let trip = Trip::new(Uuid::new_v4(), Utc::now() + Duration::hours(hours_out), seats as u32, 10_000);
    sqlx::query(
        "INSERT INTO trips (id, driver_id, status, departure_time, total_seats, price_per_seat_cents) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(trip.id)
    .bind(trip.driver_id)
    .bind(trip.status.as_str())
    .bind(trip.departure_time)
    .bind(seats)
    .bind(trip.price_per_seat_cents)
    .execute(&db.pool)
    .await
    .unwrap();
    trip
}

async fn insert(store: &PgTripStore, trip_id: Uuid, mutations: Vec<Mutation>) -> Result<(), StoreError> {
    let mut tx = store.begin().await?;
    tx.lock_trip(trip_id).await?;
    tx.apply(&mutations).await?;
    tx.commit().await
}

#[tokio::test]
async fn test_snapshot_round_trips_through_postgres() {
    let db = connect().await;
    let store = PgTripStore::new(db.pool.clone());
    let trip = seed_trip(&db, 3, 30).await;

    let mut reservation = Reservation::new_pending(&trip, Uuid::new_v4(), 2, 2_000, Some("hola".into()), Utc::now());
    insert(&store, trip.id, vec![Mutation::InsertReservation { reservation: reservation.clone() }])
        .await
        .unwrap();

    reservation.status = ReservationStatus::Approved;
    let payment = Payment::completed_for(&reservation, Some("pay_1".into()), Utc::now());
    insert(
        &store,
        trip.id,
        vec![
            Mutation::ReservationStatus {
                transition: Transition {
                    reservation_id: reservation.id,
                    from: ReservationStatus::PendingApproval,
                    to: ReservationStatus::Approved,
                },
                reason: None,
            },
            Mutation::InsertPayment { payment: payment.clone() },
        ],
    )
    .await
    .unwrap();

    let mut tx = store.begin().await.unwrap();
    let snapshot = tx.lock_trip(trip.id).await.unwrap().unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(snapshot.trip.status, TripStatus::Active);
    assert_eq!(snapshot.reservations.len(), 1);
    assert_eq!(snapshot.reservations[0].status, ReservationStatus::Approved);
    assert_eq!(snapshot.reservations[0].message.as_deref(), Some("hola"));
    assert_eq!(snapshot.payments.len(), 1);
    assert_eq!(snapshot.payments[0].status, PaymentStatus::Completed);
    assert_eq!(store.trip_id_for_reservation(reservation.id).await.unwrap(), Some(trip.id));
}

#[tokio::test]
async fn test_stale_guard_aborts_the_transaction() {
    let db = connect().await;
    let store = PgTripStore::new(db.pool.clone());
    let trip = seed_trip(&db, 3, 30).await;

    let err = insert(
        &store,
        trip.id,
        vec![Mutation::TripStatus {
            trip_id: trip.id,
            from: TripStatus::Pending,
            to: TripStatus::Cancelled,
        }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_second_active_reservation_is_rejected_by_the_index() {
    let db = connect().await;
    let store = PgTripStore::new(db.pool.clone());
    let trip = seed_trip(&db, 3, 30).await;
    let passenger = Uuid::new_v4();

    let first = Reservation::new_pending(&trip, passenger, 1, 1_000, None, Utc::now());
    let second = Reservation::new_pending(&trip, passenger, 1, 1_000, None, Utc::now());
    insert(&store, trip.id, vec![Mutation::InsertReservation { reservation: first }])
        .await
        .unwrap();

    let err = insert(&store, trip.id, vec![Mutation::InsertReservation { reservation: second }])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_row_lock_serializes_concurrent_approvals() {
    let db = connect().await;
    let store = PgTripStore::new(db.pool.clone());
    let trip = seed_trip(&db, 2, 30).await;

    let mut pending = Vec::new();
    for _ in 0..6 {
        let reservation = Reservation::new_pending(&trip, Uuid::new_v4(), 1, 1_000, None, Utc::now());
        insert(&store, trip.id, vec![Mutation::InsertReservation { reservation: reservation.clone() }])
            .await
            .unwrap();
        pending.push(reservation.id);
    }

    let clock = Arc::new(FixedClock::new(Utc::now()));
    let orchestrator = Arc::new(LifecycleOrchestrator::new(
        Arc::new(store.clone()),
        CancellationPolicy::default(),
        clock.clone(),
        Recorders::new().dispatcher(clock),
    ));

    let handles: Vec<_> = pending
        .into_iter()
        .map(|reservation_id| {
            let orchestrator = orchestrator.clone();
            let (trip_id, driver_id) = (trip.id, trip.driver_id);
            tokio::spawn(async move {
                orchestrator
                    .approve_reservation(trip_id, reservation_id, driver_id)
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut approved = 0;
    for handle in handles {
        if handle.await.unwrap() {
            approved += 1;
        }
    }
    assert_eq!(approved, 2);
}

#[tokio::test]
async fn test_trip_without_seats_is_refused() {
    let db = connect().await;
    let result = sqlx::query(
        "INSERT INTO trips (id, driver_id, status, departure_time, total_seats, price_per_seat_cents) VALUES ($1, $2, 'ACTIVE', $3, 0, 1000)",
    )
    .bind(Uuid::new_v4())
    .bind(Uuid::new_v4())
    .bind(Utc::now() + Duration::hours(24))
    .execute(&db.pool)
    .await;

    let err = result.unwrap_err();
    assert!(err.as_database_error().is_some_and(|e| e.is_check_violation()));
}
