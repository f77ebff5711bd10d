pub mod error;
pub mod ledger;
pub mod models;
pub mod mutation;
pub mod outcome;
pub mod policy;
pub mod transitions;

pub use error::{Entity, ErrorKind, LifecycleError, LifecycleResult, GENERIC_FAILURE_MESSAGE};
pub use ledger::SeatLedger;
pub use models::{
    Actor, Payment, PaymentStatus, Reservation, ReservationStatus, Trip, TripSnapshot, TripStatus, UserId,
};
pub use mutation::Mutation;
pub use outcome::{CancellationOutcome, NewStatus, PaymentInstruction, ReservationUpdate};
pub use policy::{
    BlockReason, CancellationPolicy, CancellationRequest, PolicyConfig, PolicyConfigError, PolicyDecision,
    RefundSplit, RefundTier,
};
pub use transitions::{ReservationStateMachine, Transition};
