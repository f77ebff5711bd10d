use crate::models::ReservationStatus;
use serde::Serialize;
use uuid::Uuid;

/// Message shown to end users for anything that is not their fault.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Ocurrió un error inesperado. Por favor, inténtalo de nuevo más tarde.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Trip,
    Reservation,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Trip => f.write_str("Trip"),
            Entity::Reservation => f.write_str("Reservation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: Uuid },

    #[error("Trip {0} is already finalized")]
    AlreadyFinalized(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Capacity exceeded: requested {requested} seats, {remaining} remaining")]
    CapacityExceeded { requested: u32, remaining: u32 },

    #[error("Seat ledger invariant violated: {occupied} seats occupied of {total}")]
    CapacityViolation { occupied: u32, total: u32 },

    #[error("Infrastructure failure: {0}")]
    Infrastructure(String),
}

/// Machine-readable error kind returned alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AuthorizationError,
    NotFound,
    AlreadyFinalized,
    ValidationError,
    InvalidTransition,
    CapacityExceeded,
    InfrastructureError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AuthorizationError => "AUTHORIZATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyFinalized => "ALREADY_FINALIZED",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::CapacityExceeded => "CAPACITY_EXCEEDED",
            ErrorKind::InfrastructureError => "INFRASTRUCTURE_ERROR",
        }
    }
}

impl LifecycleError {
    pub fn not_found(entity: Entity, id: Uuid) -> Self {
        LifecycleError::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::Authorization(_) => ErrorKind::AuthorizationError,
            LifecycleError::NotFound { .. } => ErrorKind::NotFound,
            LifecycleError::AlreadyFinalized(_) => ErrorKind::AlreadyFinalized,
            LifecycleError::Validation(_) => ErrorKind::ValidationError,
            LifecycleError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            LifecycleError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            LifecycleError::CapacityViolation { .. } | LifecycleError::Infrastructure(_) => {
                ErrorKind::InfrastructureError
            }
        }
    }

    /// Expected business outcomes, as opposed to infrastructure faults.
    pub fn is_domain(&self) -> bool {
        self.kind() != ErrorKind::InfrastructureError
    }

    /// Text safe to show the end user. Infrastructure detail never leaks.
    pub fn user_message(&self) -> String {
        if self.is_domain() {
            self.to_string()
        } else {
            GENERIC_FAILURE_MESSAGE.to_string()
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_detail_is_hidden() {
        let err = LifecycleError::Infrastructure("connection reset by peer at 10.0.0.4".into());
        assert_eq!(err.kind(), ErrorKind::InfrastructureError);
        assert!(!err.is_domain());
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);

        let violation = LifecycleError::CapacityViolation { occupied: 5, total: 4 };
        assert_eq!(violation.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_domain_errors_keep_their_message() {
        let err = LifecycleError::CapacityExceeded { requested: 1, remaining: 0 };
        assert_eq!(err.kind().as_str(), "CAPACITY_EXCEEDED");
        assert_eq!(err.user_message(), "Capacity exceeded: requested 1 seats, 0 remaining");

        let err = LifecycleError::InvalidTransition {
            from: ReservationStatus::Rejected,
            to: ReservationStatus::Approved,
        };
        assert_eq!(err.to_string(), "Invalid state transition from REJECTED to APPROVED");
    }
}
