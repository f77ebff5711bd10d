use async_trait::async_trait;
use carpool_core::{StoreError, TripStore, TripTransaction};
use carpool_domain::{Mutation, Payment, Reservation, Trip, TripSnapshot};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;

fn db(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Database(err.to_string())
}

fn parse<T: FromStr>(raw: &str, column: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

fn to_u32(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} is negative: {}", column, value)))
}

fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("seat count out of range: {}", value)))
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    driver_id: Uuid,
    status: String,
    departure_time: DateTime<Utc>,
    total_seats: i32,
    price_per_seat_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TripRow {
    fn into_domain(self) -> Result<Trip, StoreError> {
        Ok(Trip {
            id: self.id,
            driver_id: self.driver_id,
            status: parse(&self.status, "trips.status")?,
            departure_time: self.departure_time,
            total_seats: to_u32(self.total_seats, "trips.total_seats")?,
            price_per_seat_cents: self.price_per_seat_cents,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    trip_id: Uuid,
    passenger_id: Uuid,
    seats_reserved: i32,
    price_per_seat_cents: i64,
    service_fee_cents: i64,
    status: String,
    message: Option<String>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_domain(self) -> Result<Reservation, StoreError> {
        Ok(Reservation {
            id: self.id,
            trip_id: self.trip_id,
            passenger_id: self.passenger_id,
            seats_reserved: to_u32(self.seats_reserved, "reservations.seats_reserved")?,
            price_per_seat_cents: self.price_per_seat_cents,
            service_fee_cents: self.service_fee_cents,
            status: parse(&self.status, "reservations.status")?,
            message: self.message,
            cancellation_reason: self.cancellation_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    reservation_id: Uuid,
    reference: Option<String>,
    amount_cents: i64,
    service_fee_cents: i64,
    status: String,
    refund_percentage: Option<i16>,
    refund_amount_cents: Option<i64>,
    driver_compensation_cents: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_domain(self) -> Result<Payment, StoreError> {
        let refund_percentage = self
            .refund_percentage
            .map(|p| {
                u8::try_from(p).map_err(|_| StoreError::Corrupt(format!("payments.refund_percentage: {}", p)))
            })
            .transpose()?;

        Ok(Payment {
            id: self.id,
            reservation_id: self.reservation_id,
            reference: self.reference,
            amount_cents: self.amount_cents,
            service_fee_cents: self.service_fee_cents,
            status: parse(&self.status, "payments.status")?,
            refund_percentage,
            refund_amount_cents: self.refund_amount_cents,
            driver_compensation_cents: self.driver_compensation_cents,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Postgres-backed trip store. Trip rows are locked with `SELECT ... FOR UPDATE`, so every
/// operation on one trip is serialized at the database.
#[derive(Clone)]
pub struct PgTripStore {
    pool: PgPool,
}

impl PgTripStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TripStore for PgTripStore {
    async fn begin(&self) -> Result<Box<dyn TripTransaction>, StoreError> {
        let tx = self.pool.begin().await.map_err(db)?;
        Ok(Box::new(PgTripTransaction { tx }))
    }

    async fn trip_id_for_reservation(&self, reservation_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        sqlx::query_scalar("SELECT trip_id FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)
    }
}

/// Dropping this without `commit` rolls the transaction back.
pub struct PgTripTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgTripTransaction {
    /// Run a guarded write. Touching no row means the expected state no longer holds.
    async fn guarded(&mut self, query: PgQuery<'_>, what: String) -> Result<(), StoreError> {
        let result = query.execute(&mut *self.tx).await.map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(what));
        }
        Ok(())
    }

    async fn apply_one(&mut self, mutation: &Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::TripStatus { trip_id, from, to } => {
                let query = sqlx::query(
                    "UPDATE trips SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
                )
                .bind(to.as_str())
                .bind(*trip_id)
                .bind(from.as_str());
                self.guarded(query, format!("trip {} is no longer {}", trip_id, from))
                    .await
            }
            Mutation::ReservationStatus { transition, reason } => {
                let query = sqlx::query(
                    r#"
                    UPDATE reservations
                    SET status = $1, cancellation_reason = COALESCE($2, cancellation_reason), updated_at = NOW()
                    WHERE id = $3 AND status = $4
                    "#,
                )
                .bind(transition.to.as_str())
                .bind(reason.as_deref())
                .bind(transition.reservation_id)
                .bind(transition.from.as_str());
                self.guarded(
                    query,
                    format!(
                        "reservation {} is no longer {}",
                        transition.reservation_id, transition.from
                    ),
                )
                .await
            }
            Mutation::InsertReservation { reservation: r } => {
                sqlx::query(
                    r#"
                    INSERT INTO reservations (id, trip_id, passenger_id, seats_reserved, price_per_seat_cents,
                        service_fee_cents, status, message, cancellation_reason, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                )
                .bind(r.id)
                .bind(r.trip_id)
                .bind(r.passenger_id)
                .bind(to_i32(r.seats_reserved)?)
                .bind(r.price_per_seat_cents)
                .bind(r.service_fee_cents)
                .bind(r.status.as_str())
                .bind(r.message.as_deref())
                .bind(r.cancellation_reason.as_deref())
                .bind(r.created_at)
                .bind(r.updated_at)
                .execute(&mut *self.tx)
                .await
                .map_err(db)?;
                Ok(())
            }
            Mutation::InsertPayment { payment: p } => {
                sqlx::query(
                    r#"
                    INSERT INTO payments (id, reservation_id, reference, amount_cents, service_fee_cents, status,
                        created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(p.id)
                .bind(p.reservation_id)
                .bind(p.reference.as_deref())
                .bind(p.amount_cents)
                .bind(p.service_fee_cents)
                .bind(p.status.as_str())
                .bind(p.created_at)
                .bind(p.updated_at)
                .execute(&mut *self.tx)
                .await
                .map_err(db)?;
                Ok(())
            }
            Mutation::RequestRefund { payment_id, split } => {
                let query = sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = 'REFUND_REQUESTED', refund_percentage = $1, refund_amount_cents = $2,
                        driver_compensation_cents = $3, updated_at = NOW()
                    WHERE id = $4 AND status = 'COMPLETED'
                    "#,
                )
                .bind(i16::from(split.refund_percentage))
                .bind(split.refund_cents)
                .bind(split.compensation_cents)
                .bind(*payment_id);
                self.guarded(query, format!("payment {} is no longer COMPLETED", payment_id))
                    .await
            }
        }
    }
}

#[async_trait]
impl TripTransaction for PgTripTransaction {
    async fn lock_trip(&mut self, trip_id: Uuid) -> Result<Option<TripSnapshot>, StoreError> {
        let trip: Option<TripRow> = sqlx::query_as(
            r#"
            SELECT id, driver_id, status, departure_time, total_seats, price_per_seat_cents, created_at, updated_at
            FROM trips
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(trip_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?;

        let Some(trip) = trip else {
            return Ok(None);
        };

        let reservations: Vec<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, trip_id, passenger_id, seats_reserved, price_per_seat_cents, service_fee_cents,
                   status, message, cancellation_reason, created_at, updated_at
            FROM reservations
            WHERE trip_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(trip_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?;

        let payments: Vec<PaymentRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.reservation_id, p.reference, p.amount_cents, p.service_fee_cents, p.status,
                   p.refund_percentage, p.refund_amount_cents, p.driver_compensation_cents,
                   p.created_at, p.updated_at
            FROM payments p
            JOIN reservations r ON r.id = p.reservation_id
            WHERE r.trip_id = $1
            "#,
        )
        .bind(trip_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?;

        debug!(
            "Locked trip {} with {} reservations and {} payments",
            trip_id,
            reservations.len(),
            payments.len()
        );

        Ok(Some(TripSnapshot {
            trip: trip.into_domain()?,
            reservations: reservations
                .into_iter()
                .map(ReservationRow::into_domain)
                .collect::<Result<_, _>>()?,
            payments: payments
                .into_iter()
                .map(PaymentRow::into_domain)
                .collect::<Result<_, _>>()?,
        }))
    }

    async fn apply(&mut self, mutations: &[Mutation]) -> Result<(), StoreError> {
        for mutation in mutations {
            self.apply_one(mutation).await?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.commit().await.map_err(db)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.rollback().await.map_err(db)
    }
}
