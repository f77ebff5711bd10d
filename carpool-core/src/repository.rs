use async_trait::async_trait;
use carpool_domain::{LifecycleError, Mutation, TripSnapshot};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    /// A guarded update touched no row: someone else changed it first.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        LifecycleError::Infrastructure(err.to_string())
    }
}

/// Persistence for trips and everything hanging off them.
#[async_trait]
pub trait TripStore: Send + Sync {
    /// Open a unit of work. Dropping the transaction without committing rolls it back.
    async fn begin(&self) -> Result<Box<dyn TripTransaction>, StoreError>;

    /// Resolve the parent trip of a reservation. Read outside any lock; the trip of a
    /// reservation never changes.
    async fn trip_id_for_reservation(&self, reservation_id: Uuid) -> Result<Option<Uuid>, StoreError>;
}

/// A single serializable unit of work against one trip.
#[async_trait]
pub trait TripTransaction: Send {
    /// Take the write lock on the trip row and load the trip with its reservations and payments.
    /// Concurrent callers for the same trip block here until this transaction ends.
    async fn lock_trip(&mut self, trip_id: Uuid) -> Result<Option<TripSnapshot>, StoreError>;

    /// Apply mutations in order. Fails on the first guard that does not hold.
    async fn apply(&mut self, mutations: &[Mutation]) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
