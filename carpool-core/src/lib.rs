pub mod audit;
pub mod clock;
pub mod identity;
pub mod notify;
pub mod payment;
pub mod repository;

/// Error type returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use audit::{ActionStatus, ActionType, AuditEntry, AuditLog};
pub use clock::{Clock, FixedClock, SystemClock};
pub use identity::{IdentityError, IdentityResolver};
pub use notify::{Notification, Notifier};
pub use payment::PaymentGateway;
pub use repository::{StoreError, TripStore, TripTransaction};
