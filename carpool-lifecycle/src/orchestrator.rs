use carpool_core::{ActionType, Clock, StoreError, TripStore, TripTransaction};
use carpool_domain::{
    Actor, BlockReason, CancellationOutcome, CancellationPolicy, CancellationRequest, Entity, LifecycleError,
    LifecycleResult, Mutation, NewStatus, PaymentInstruction, PolicyDecision, Reservation, ReservationStateMachine,
    ReservationStatus, ReservationUpdate, SeatLedger, TripSnapshot, TripStatus, UserId,
};
use carpool_shared::models::events::InstructionKind;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::effects::EffectDispatcher;
use crate::notices;

/// What a decision step wants written, and what to hand back once it is.
struct Plan<T> {
    mutations: Vec<Mutation>,
    value: T,
}

impl<T> Plan<T> {
    fn write(mutations: Vec<Mutation>, value: T) -> Self {
        Self { mutations, value }
    }

    fn read_only(value: T) -> Self {
        Self {
            mutations: Vec::new(),
            value,
        }
    }
}

fn infrastructure(err: StoreError) -> LifecycleError {
    error!("Trip store failure: {}", err);
    err.into()
}

/// Runs every lifecycle operation as one unit of work against a locked trip.
///
/// Each call locks the trip, lets the pure domain components decide, writes every resulting
/// mutation in the same transaction and only then fires notifications and payment instructions.
/// An audit entry is written for every call.
pub struct LifecycleOrchestrator {
    store: Arc<dyn TripStore>,
    policy: CancellationPolicy,
    clock: Arc<dyn Clock>,
    effects: EffectDispatcher,
}

impl LifecycleOrchestrator {
    pub fn new(
        store: Arc<dyn TripStore>,
        policy: CancellationPolicy,
        clock: Arc<dyn Clock>,
        effects: EffectDispatcher,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
            effects,
        }
    }

    pub fn policy(&self) -> &CancellationPolicy {
        &self.policy
    }

    /// Driver cancels the whole trip. Every live reservation is cancelled with it and confirmed
    /// passengers get their full trip price back.
    pub async fn cancel_trip_by_driver(
        &self,
        trip_id: Uuid,
        caller_id: UserId,
        reason: Option<String>,
    ) -> LifecycleResult<CancellationOutcome> {
        info!("Driver {} cancelling trip {}", caller_id, trip_id);
        let result = self
            .execute(trip_id, |snapshot, now| {
                self.plan_trip_cancellation(snapshot, caller_id, reason.as_deref(), now)
            })
            .await;

        if let Ok(outcome) = &result {
            self.effects.submit_payments(&outcome.payment_instructions).await;
            let (refunded, unpaid): (Vec<UserId>, Vec<UserId>) =
                outcome.affected_passengers.iter().copied().partition(|passenger| {
                    outcome
                        .payment_instructions
                        .iter()
                        .any(|i| i.kind == InstructionKind::Refund && i.recipient_id == *passenger)
                });
            self.effects
                .notify(&refunded, &notices::trip_cancelled(outcome, true, reason.as_deref()))
                .await;
            self.effects
                .notify(&unpaid, &notices::trip_cancelled(outcome, false, reason.as_deref()))
                .await;
        }
        self.effects
            .audit(
                Some(caller_id),
                ActionType::TripCancelled,
                json!({ "trip_id": trip_id, "reason": reason }),
                &result,
            )
            .await;
        result
    }

    /// Passenger cancels their own reservation, refunded by the tier in force right now.
    pub async fn cancel_reservation_by_passenger(
        &self,
        reservation_id: Uuid,
        caller_id: UserId,
        reason: Option<String>,
    ) -> LifecycleResult<CancellationOutcome> {
        info!("Passenger {} cancelling reservation {}", caller_id, reservation_id);
        let result = match self.trip_of(reservation_id).await {
            Ok(trip_id) => {
                self.execute(trip_id, |snapshot, now| {
                    self.plan_reservation_cancellation(snapshot, reservation_id, caller_id, reason.as_deref(), now)
                })
                .await
            }
            Err(e) => Err(e),
        };

        if let Ok(outcome) = &result {
            self.effects.submit_payments(&outcome.payment_instructions).await;
            self.effects
                .notify(
                    &[outcome.driver_id],
                    &notices::reservation_cancelled(outcome, reason.as_deref()),
                )
                .await;
        }
        self.effects
            .audit(
                Some(caller_id),
                ActionType::ReservationCancelled,
                json!({ "reservation_id": reservation_id, "reason": reason }),
                &result,
            )
            .await;
        result
    }

    /// A passenger asks for seats. The request waits for the driver's approval.
    pub async fn request_reservation(
        &self,
        trip_id: Uuid,
        caller_id: UserId,
        seats: u32,
        message: Option<String>,
    ) -> LifecycleResult<ReservationUpdate> {
        let result = self
            .execute(trip_id, |snapshot, now| {
                self.plan_request(snapshot, caller_id, seats, message.clone(), now)
            })
            .await;

        if let Ok(update) = &result {
            info!(
                "Passenger {} requested {} seats on trip {} ({})",
                caller_id, seats, trip_id, update.reservation_id
            );
            self.effects
                .notify(&[update.driver_id], &notices::reservation_requested(update))
                .await;
        }
        self.effects
            .audit(
                Some(caller_id),
                ActionType::ReservationRequested,
                json!({ "trip_id": trip_id, "seats": seats }),
                &result,
            )
            .await;
        result
    }

    pub async fn approve_reservation(
        &self,
        trip_id: Uuid,
        reservation_id: Uuid,
        caller_id: UserId,
    ) -> LifecycleResult<ReservationUpdate> {
        let result = self
            .execute(trip_id, |snapshot, _| {
                let reservation = self.driver_target(snapshot, reservation_id, caller_id)?;
                let ledger = SeatLedger::new(&snapshot.trip, &snapshot.reservations);
                let transition = ReservationStateMachine::approve(reservation, &ledger)?;
                let remaining = ledger.remaining_seats()? - reservation.seats_reserved;

                Ok(Plan::write(
                    vec![Mutation::ReservationStatus {
                        transition,
                        reason: None,
                    }],
                    Self::update(snapshot, reservation, transition.to, true, remaining),
                ))
            })
            .await;

        if let Ok(update) = &result {
            info!("Reservation {} approved, {} seats left", reservation_id, update.remaining_seats);
            self.effects
                .notify(&[update.passenger_id], &notices::reservation_approved(update))
                .await;
        }
        self.effects
            .audit(
                Some(caller_id),
                ActionType::ReservationApproved,
                json!({ "trip_id": trip_id, "reservation_id": reservation_id }),
                &result,
            )
            .await;
        result
    }

    pub async fn reject_reservation(
        &self,
        trip_id: Uuid,
        reservation_id: Uuid,
        caller_id: UserId,
    ) -> LifecycleResult<ReservationUpdate> {
        let result = self
            .execute(trip_id, |snapshot, _| {
                let reservation = self.driver_target(snapshot, reservation_id, caller_id)?;
                let transition = ReservationStateMachine::reject(reservation)?;
                let remaining = SeatLedger::new(&snapshot.trip, &snapshot.reservations).remaining_seats()?;

                Ok(Plan::write(
                    vec![Mutation::ReservationStatus {
                        transition,
                        reason: None,
                    }],
                    Self::update(snapshot, reservation, transition.to, true, remaining),
                ))
            })
            .await;

        if let Ok(update) = &result {
            self.effects
                .notify(&[update.passenger_id], &notices::reservation_rejected(update))
                .await;
        }
        self.effects
            .audit(
                Some(caller_id),
                ActionType::ReservationRejected,
                json!({ "trip_id": trip_id, "reservation_id": reservation_id }),
                &result,
            )
            .await;
        result
    }

    /// Payment subsystem callback. Repeats for an already confirmed reservation are a no-op.
    pub async fn confirm_payment(
        &self,
        reservation_id: Uuid,
        payment_reference: Option<String>,
    ) -> LifecycleResult<ReservationUpdate> {
        let result = match self.trip_of(reservation_id).await {
            Ok(trip_id) => {
                self.execute(trip_id, |snapshot, now| {
                    self.plan_payment_confirmation(snapshot, reservation_id, payment_reference.clone(), now)
                })
                .await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(update) if update.changed => {
                info!("Payment confirmed for reservation {}", reservation_id);
                self.effects
                    .notify(
                        &[update.passenger_id, update.driver_id],
                        &notices::payment_confirmed(update),
                    )
                    .await;
            }
            Ok(_) => debug!("Reservation {} already confirmed, ignoring repeat", reservation_id),
            Err(_) => {}
        }
        self.effects
            .audit(
                None,
                ActionType::PaymentConfirmed,
                json!({ "reservation_id": reservation_id, "payment_reference": payment_reference }),
                &result,
            )
            .await;
        result
    }

    /// Lock, decide, write, commit. Any failure before commit leaves the store untouched.
    async fn execute<T, F>(&self, trip_id: Uuid, decide: F) -> LifecycleResult<T>
    where
        F: FnOnce(&TripSnapshot, DateTime<Utc>) -> LifecycleResult<Plan<T>>,
    {
        let mut tx = self.store.begin().await.map_err(infrastructure)?;

        let snapshot = match tx.lock_trip(trip_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                Self::discard(tx).await;
                return Err(LifecycleError::not_found(Entity::Trip, trip_id));
            }
            Err(e) => {
                Self::discard(tx).await;
                return Err(infrastructure(e));
            }
        };

        let plan = match decide(&snapshot, self.clock.now()) {
            Ok(plan) => plan,
            Err(e) => {
                Self::discard(tx).await;
                return Err(e);
            }
        };

        if plan.mutations.is_empty() {
            Self::discard(tx).await;
            return Ok(plan.value);
        }

        if let Err(e) = tx.apply(&plan.mutations).await {
            Self::discard(tx).await;
            return Err(infrastructure(e));
        }
        tx.commit().await.map_err(infrastructure)?;

        debug!("Committed {} mutations on trip {}", plan.mutations.len(), trip_id);
        Ok(plan.value)
    }

    async fn discard(tx: Box<dyn TripTransaction>) {
        if let Err(e) = tx.rollback().await {
            warn!("Rollback failed: {}", e);
        }
    }

    async fn trip_of(&self, reservation_id: Uuid) -> LifecycleResult<Uuid> {
        self.store
            .trip_id_for_reservation(reservation_id)
            .await
            .map_err(infrastructure)?
            .ok_or_else(|| LifecycleError::not_found(Entity::Reservation, reservation_id))
    }

    fn refused(&self, decision: &PolicyDecision, trip_id: Uuid) -> LifecycleError {
        match decision.block {
            Some(BlockReason::AlreadyFinalized) => LifecycleError::AlreadyFinalized(trip_id),
            Some(block) => LifecycleError::Validation(self.policy.block_message(block)),
            None => LifecycleError::Validation(decision.reason.clone().unwrap_or_default()),
        }
    }

    /// Common guard for driver decisions on a single reservation.
    fn driver_target<'s>(
        &self,
        snapshot: &'s TripSnapshot,
        reservation_id: Uuid,
        caller_id: UserId,
    ) -> LifecycleResult<&'s Reservation> {
        let trip = &snapshot.trip;
        if !trip.is_driver(caller_id) {
            return Err(LifecycleError::Authorization(
                "Solo el conductor del viaje puede gestionar sus reservas".into(),
            ));
        }
        if trip.status.is_finalized() {
            return Err(LifecycleError::AlreadyFinalized(trip.id));
        }
        snapshot
            .reservation(reservation_id)
            .ok_or_else(|| LifecycleError::not_found(Entity::Reservation, reservation_id))
    }

    fn update(
        snapshot: &TripSnapshot,
        reservation: &Reservation,
        new_status: ReservationStatus,
        changed: bool,
        remaining_seats: u32,
    ) -> ReservationUpdate {
        ReservationUpdate {
            trip_id: snapshot.trip.id,
            driver_id: snapshot.trip.driver_id,
            reservation_id: reservation.id,
            passenger_id: reservation.passenger_id,
            previous_status: changed.then_some(reservation.status),
            new_status,
            changed,
            remaining_seats,
        }
    }

    fn plan_trip_cancellation(
        &self,
        snapshot: &TripSnapshot,
        caller_id: UserId,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> LifecycleResult<Plan<CancellationOutcome>> {
        let trip = &snapshot.trip;
        if !trip.is_driver(caller_id) {
            return Err(LifecycleError::Authorization(
                "Solo el conductor puede cancelar el viaje".into(),
            ));
        }
        if trip.status.is_finalized() {
            return Err(LifecycleError::AlreadyFinalized(trip.id));
        }

        let decision = self.policy.evaluate(
            CancellationRequest::Driver {
                trip,
                reservations: &snapshot.reservations,
            },
            now,
        );
        if !decision.allowed {
            return Err(self.refused(&decision, trip.id));
        }

        let mut mutations = vec![Mutation::TripStatus {
            trip_id: trip.id,
            from: trip.status,
            to: TripStatus::Cancelled,
        }];
        let mut affected = Vec::new();
        let mut instructions = Vec::new();
        let mut refunded_cents = 0;

        for reservation in snapshot.reservations.iter().filter(|r| !r.status.is_terminal()) {
            let transition = ReservationStateMachine::cancel(reservation, Actor::Driver)?;
            mutations.push(Mutation::ReservationStatus {
                transition,
                reason: reason.map(str::to_string),
            });
            affected.push(reservation.passenger_id);

            if reservation.status != ReservationStatus::Confirmed {
                continue;
            }
            let percentage = decision.refund_percentage.unwrap_or(100);
            let payment = Self::completed_payment(snapshot, reservation)?;
            let split = self.policy.split(reservation.trip_price_cents(), percentage);
            mutations.push(Mutation::RequestRefund {
                payment_id: payment.id,
                split,
            });
            instructions.push(PaymentInstruction {
                kind: InstructionKind::Refund,
                payment_id: payment.id,
                reservation_id: reservation.id,
                recipient_id: reservation.passenger_id,
                amount_cents: split.refund_cents,
                percentage,
            });
            refunded_cents += split.refund_cents;
        }

        let refund_processed = !instructions.is_empty();
        let outcome = CancellationOutcome {
            trip_id: trip.id,
            driver_id: trip.driver_id,
            reservation_id: None,
            affected_passenger_count: affected.len(),
            affected_passengers: affected,
            refund_processed,
            refund_percentage: if refund_processed { 100 } else { 0 },
            refund_amount_cents: refunded_cents,
            driver_compensation_cents: 0,
            hours_before_departure: decision.hours_until_departure,
            new_status: NewStatus::Trip(TripStatus::Cancelled),
            payment_instructions: instructions,
        };

        info!(
            "Trip {} cancellation planned: {} passengers affected, {} cents refunded",
            trip.id, outcome.affected_passenger_count, refunded_cents
        );
        Ok(Plan::write(mutations, outcome))
    }

    fn plan_reservation_cancellation(
        &self,
        snapshot: &TripSnapshot,
        reservation_id: Uuid,
        caller_id: UserId,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> LifecycleResult<Plan<CancellationOutcome>> {
        let trip = &snapshot.trip;
        let reservation = snapshot
            .reservation(reservation_id)
            .ok_or_else(|| LifecycleError::not_found(Entity::Reservation, reservation_id))?;
        if reservation.passenger_id != caller_id {
            return Err(LifecycleError::Authorization(
                "Solo el pasajero de la reserva puede cancelarla".into(),
            ));
        }

        let decision = self
            .policy
            .evaluate(CancellationRequest::Passenger { trip, reservation }, now);
        if !decision.allowed {
            return Err(self.refused(&decision, trip.id));
        }

        let transition = ReservationStateMachine::cancel(reservation, Actor::Passenger)?;
        let mut mutations = vec![Mutation::ReservationStatus {
            transition,
            reason: reason.map(str::to_string),
        }];

        let mut outcome = CancellationOutcome {
            trip_id: trip.id,
            driver_id: trip.driver_id,
            reservation_id: Some(reservation.id),
            affected_passenger_count: 1,
            affected_passengers: vec![reservation.passenger_id],
            refund_processed: false,
            refund_percentage: 0,
            refund_amount_cents: 0,
            driver_compensation_cents: 0,
            hours_before_departure: decision.hours_until_departure,
            new_status: NewStatus::Reservation(transition.to),
            payment_instructions: Vec::new(),
        };

        if let Some(percentage) = decision.refund_percentage {
            let payment = Self::completed_payment(snapshot, reservation)?;
            let split = self.policy.split(reservation.trip_price_cents(), percentage);
            mutations.push(Mutation::RequestRefund {
                payment_id: payment.id,
                split,
            });

            if split.refund_cents > 0 {
                outcome.payment_instructions.push(PaymentInstruction {
                    kind: InstructionKind::Refund,
                    payment_id: payment.id,
                    reservation_id: reservation.id,
                    recipient_id: reservation.passenger_id,
                    amount_cents: split.refund_cents,
                    percentage,
                });
            }
            if split.compensation_cents > 0 {
                outcome.payment_instructions.push(PaymentInstruction {
                    kind: InstructionKind::Compensation,
                    payment_id: payment.id,
                    reservation_id: reservation.id,
                    recipient_id: trip.driver_id,
                    amount_cents: split.compensation_cents,
                    percentage: 100 - percentage,
                });
            }

            outcome.refund_processed = true;
            outcome.refund_percentage = percentage;
            outcome.refund_amount_cents = split.refund_cents;
            outcome.driver_compensation_cents = split.compensation_cents;
        }

        Ok(Plan::write(mutations, outcome))
    }

    fn plan_request(
        &self,
        snapshot: &TripSnapshot,
        caller_id: UserId,
        seats: u32,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> LifecycleResult<Plan<ReservationUpdate>> {
        let trip = &snapshot.trip;
        if trip.status.is_finalized() {
            return Err(LifecycleError::AlreadyFinalized(trip.id));
        }
        if trip.status != TripStatus::Active {
            return Err(LifecycleError::Validation(
                "El viaje todavía no acepta reservas".into(),
            ));
        }
        if trip.is_driver(caller_id) {
            return Err(LifecycleError::Validation(
                "No puedes reservar asientos en tu propio viaje".into(),
            ));
        }
        if seats == 0 {
            return Err(LifecycleError::Validation(
                "Debes reservar al menos un asiento".into(),
            ));
        }
        if trip.hours_until_departure(now) <= 0.0 {
            return Err(LifecycleError::Validation("El viaje ya salió".into()));
        }
        if snapshot.active_reservation_of(caller_id).is_some() {
            return Err(LifecycleError::Validation(
                "Ya tienes una reserva activa en este viaje".into(),
            ));
        }

        let ledger = SeatLedger::new(trip, &snapshot.reservations);
        ledger.ensure_capacity(seats)?;
        let remaining = ledger.remaining_seats()?;

        let trip_price = i64::from(seats) * trip.price_per_seat_cents;
        let fee = self.policy.service_fee_cents(trip_price);
        let message = message.filter(|m| !m.trim().is_empty());
        let reservation = Reservation::new_pending(trip, caller_id, seats, fee, message, now);

        let update = ReservationUpdate {
            trip_id: trip.id,
            driver_id: trip.driver_id,
            reservation_id: reservation.id,
            passenger_id: caller_id,
            previous_status: None,
            new_status: reservation.status,
            changed: true,
            remaining_seats: remaining,
        };
        Ok(Plan::write(vec![Mutation::InsertReservation { reservation }], update))
    }

    fn plan_payment_confirmation(
        &self,
        snapshot: &TripSnapshot,
        reservation_id: Uuid,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> LifecycleResult<Plan<ReservationUpdate>> {
        let reservation = snapshot
            .reservation(reservation_id)
            .ok_or_else(|| LifecycleError::not_found(Entity::Reservation, reservation_id))?;
        let remaining = SeatLedger::new(&snapshot.trip, &snapshot.reservations).remaining_seats()?;

        let transition = match ReservationStateMachine::confirm_payment(reservation)? {
            Some(transition) => transition,
            None => {
                return Ok(Plan::read_only(Self::update(
                    snapshot,
                    reservation,
                    reservation.status,
                    false,
                    remaining,
                )))
            }
        };
        if snapshot.trip.status.is_finalized() {
            return Err(LifecycleError::AlreadyFinalized(snapshot.trip.id));
        }

        let payment = carpool_domain::Payment::completed_for(reservation, reference, now);
        Ok(Plan::write(
            vec![
                Mutation::ReservationStatus {
                    transition,
                    reason: None,
                },
                Mutation::InsertPayment { payment },
            ],
            Self::update(snapshot, reservation, transition.to, true, remaining),
        ))
    }

    /// A confirmed reservation always has a completed payment; anything else is corrupt data.
    fn completed_payment<'s>(
        snapshot: &'s TripSnapshot,
        reservation: &Reservation,
    ) -> LifecycleResult<&'s carpool_domain::Payment> {
        snapshot.payment_for(reservation.id).ok_or_else(|| {
            LifecycleError::Infrastructure(format!(
                "confirmed reservation {} has no completed payment",
                reservation.id
            ))
        })
    }
}
