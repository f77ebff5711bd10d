pub mod app_config;
pub mod audit_repo;
pub mod database;
pub mod events;
pub mod trip_repo;

pub use audit_repo::PgAuditLog;
pub use database::DbClient;
pub use events::{EventProducer, KafkaNotifier, KafkaPaymentGateway};
pub use trip_repo::PgTripStore;
