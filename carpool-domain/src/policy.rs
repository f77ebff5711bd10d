use crate::models::{Actor, Reservation, ReservationStatus, Trip};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One step of the refund table: cancelling at least `min_hours_before` departure refunds
/// `refund_percentage` of the trip price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RefundTier {
    pub min_hours_before: f64,
    pub refund_percentage: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Inside this window before departure, paid reservations are locked.
    pub lock_window_hours: f64,

    /// Platform fee on the trip price, in basis points. Never refunded.
    pub service_fee_basis_points: u32,

    /// Ordered by `min_hours_before`, highest first.
    pub refund_tiers: Vec<RefundTier>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            lock_window_hours: 1.0,
            service_fee_basis_points: 1000,
            refund_tiers: vec![
                RefundTier { min_hours_before: 48.0, refund_percentage: 100 },
                RefundTier { min_hours_before: 24.0, refund_percentage: 90 },
                RefundTier { min_hours_before: 6.0, refund_percentage: 70 },
                RefundTier { min_hours_before: 1.0, refund_percentage: 50 },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyConfigError {
    #[error("Lock window must be a non-negative number of hours, got {0}")]
    InvalidLockWindow(f64),

    #[error("Service fee of {0} basis points exceeds 10000")]
    ServiceFeeOutOfRange(u32),

    #[error("Refund tier {index} has percentage {percentage} above 100")]
    PercentageOutOfRange { index: usize, percentage: u8 },

    #[error("Refund tier {index} is not strictly below the previous threshold")]
    UnorderedTiers { index: usize },

    #[error("Refund tier {index} refunds more than an earlier tier")]
    IncreasingRefund { index: usize },
}

/// Why a cancellation was refused.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    AlreadyFinalized,
    ConfirmedPassengersInLockWindow,
    ConfirmedReservationInLockWindow,
}

/// The two shapes a cancellation takes.
#[derive(Debug, Clone, Copy)]
pub enum CancellationRequest<'a> {
    /// The driver cancels the whole trip; every reservation on it is considered.
    Driver {
        trip: &'a Trip,
        reservations: &'a [Reservation],
    },
    /// A passenger cancels their own reservation.
    Passenger {
        trip: &'a Trip,
        reservation: &'a Reservation,
    },
}

impl<'a> CancellationRequest<'a> {
    pub fn actor(&self) -> Actor {
        match self {
            CancellationRequest::Driver { .. } => Actor::Driver,
            CancellationRequest::Passenger { .. } => Actor::Passenger,
        }
    }

    fn trip(&self) -> &'a Trip {
        match self {
            CancellationRequest::Driver { trip, .. } | CancellationRequest::Passenger { trip, .. } => trip,
        }
    }

    /// A payment exists somewhere in scope.
    fn involves_payment(&self) -> bool {
        match self {
            CancellationRequest::Driver { trip, reservations } => reservations
                .iter()
                .any(|r| r.trip_id == trip.id && r.status == ReservationStatus::Confirmed),
            CancellationRequest::Passenger { reservation, .. } => {
                reservation.status == ReservationStatus::Confirmed
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub block: Option<BlockReason>,
    pub reason: Option<String>,
    /// Set only when a payment exists and the cancellation is allowed.
    pub refund_percentage: Option<u8>,
    pub hours_until_departure: f64,
}

impl PolicyDecision {
    pub fn driver_compensation_percentage(&self) -> Option<u8> {
        self.refund_percentage.map(|p| 100 - p)
    }
}

/// How a refunded trip price is divided between passenger and driver.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RefundSplit {
    pub refund_percentage: u8,
    pub refund_cents: i64,
    pub compensation_cents: i64,
}

/// Pure cancellation rules: eligibility, refund tier and money split. No I/O, no clock.
#[derive(Debug, Clone)]
pub struct CancellationPolicy {
    config: PolicyConfig,
}

impl CancellationPolicy {
    pub fn new(config: PolicyConfig) -> Result<Self, PolicyConfigError> {
        Self::validate(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn evaluate(&self, request: CancellationRequest<'_>, now: DateTime<Utc>) -> PolicyDecision {
        let trip = request.trip();
        let hours = trip.hours_until_departure(now);

        if trip.status.is_finalized() {
            return self.blocked(BlockReason::AlreadyFinalized, hours);
        }

        let paid = request.involves_payment();
        if hours < self.config.lock_window_hours && paid {
            let block = match request.actor() {
                Actor::Driver => BlockReason::ConfirmedPassengersInLockWindow,
                Actor::Passenger => BlockReason::ConfirmedReservationInLockWindow,
            };
            return self.blocked(block, hours);
        }

        let refund_percentage = match (paid, request.actor()) {
            (false, _) => None,
            // The driver bears the cost of walking away from paid passengers.
            (true, Actor::Driver) => Some(100),
            (true, Actor::Passenger) => Some(self.refund_percentage(hours)),
        };

        PolicyDecision {
            allowed: true,
            block: None,
            reason: None,
            refund_percentage,
            hours_until_departure: hours,
        }
    }

    /// Step function over the tier table. Below the last tier nothing is refunded.
    pub fn refund_percentage(&self, hours_until_departure: f64) -> u8 {
        self.config
            .refund_tiers
            .iter()
            .find(|tier| hours_until_departure >= tier.min_hours_before)
            .map(|tier| tier.refund_percentage)
            .unwrap_or(0)
    }

    pub fn driver_compensation_percentage(&self, hours_until_departure: f64) -> u8 {
        100 - self.refund_percentage(hours_until_departure)
    }

    pub fn service_fee_cents(&self, trip_price_cents: i64) -> i64 {
        trip_price_cents * i64::from(self.config.service_fee_basis_points) / 10_000
    }

    /// Refund rounds down; the driver gets the remainder so nothing is lost to rounding.
    pub fn split(&self, trip_price_cents: i64, refund_percentage: u8) -> RefundSplit {
        let refund_cents = trip_price_cents * i64::from(refund_percentage) / 100;
        RefundSplit {
            refund_percentage,
            refund_cents,
            compensation_cents: trip_price_cents - refund_cents,
        }
    }

    pub fn block_message(&self, block: BlockReason) -> String {
        let window = if (self.config.lock_window_hours - 1.0).abs() < f64::EPSILON {
            "1 hora".to_string()
        } else {
            format!("{} horas", self.config.lock_window_hours)
        };

        match block {
            BlockReason::AlreadyFinalized => "El viaje ya fue finalizado o cancelado".to_string(),
            BlockReason::ConfirmedPassengersInLockWindow => format!(
                "No se puede cancelar el viaje con menos de {} de anticipación: hay pasajeros confirmados",
                window
            ),
            BlockReason::ConfirmedReservationInLockWindow => format!(
                "No se puede cancelar una reserva confirmada con menos de {} de anticipación",
                window
            ),
        }
    }

    fn blocked(&self, block: BlockReason, hours: f64) -> PolicyDecision {
        PolicyDecision {
            allowed: false,
            block: Some(block),
            reason: Some(self.block_message(block)),
            refund_percentage: None,
            hours_until_departure: hours,
        }
    }

    fn validate(config: &PolicyConfig) -> Result<(), PolicyConfigError> {
        if !config.lock_window_hours.is_finite() || config.lock_window_hours < 0.0 {
            return Err(PolicyConfigError::InvalidLockWindow(config.lock_window_hours));
        }
        if config.service_fee_basis_points > 10_000 {
            return Err(PolicyConfigError::ServiceFeeOutOfRange(config.service_fee_basis_points));
        }

        for (index, tier) in config.refund_tiers.iter().enumerate() {
            if tier.refund_percentage > 100 {
                return Err(PolicyConfigError::PercentageOutOfRange {
                    index,
                    percentage: tier.refund_percentage,
                });
            }
            if !tier.min_hours_before.is_finite() {
                return Err(PolicyConfigError::UnorderedTiers { index });
            }
            if index > 0 {
                let previous = &config.refund_tiers[index - 1];
                if tier.min_hours_before >= previous.min_hours_before {
                    return Err(PolicyConfigError::UnorderedTiers { index });
                }
                if tier.refund_percentage > previous.refund_percentage {
                    return Err(PolicyConfigError::IncreasingRefund { index });
                }
            }
        }
        Ok(())
    }
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            config: PolicyConfig::default(),
        }
    }
}
