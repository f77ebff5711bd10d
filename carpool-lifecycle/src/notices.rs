//! User-facing notification texts.

use carpool_core::Notification;
use carpool_domain::{CancellationOutcome, ReservationUpdate};
use uuid::Uuid;

fn trip_link(trip_id: Uuid) -> Option<String> {
    Some(format!("/trips/{}", trip_id))
}

fn with_reason(body: String, reason: Option<&str>) -> String {
    match reason {
        Some(reason) if !reason.trim().is_empty() => format!("{} Motivo: {}", body, reason.trim()),
        _ => body,
    }
}

/// `refunded` is per recipient: only passengers who had paid are promised their money back.
pub fn trip_cancelled(outcome: &CancellationOutcome, refunded: bool, reason: Option<&str>) -> Notification {
    let body = if refunded {
        "El conductor canceló el viaje. Se reembolsará el 100% del precio del viaje.".to_string()
    } else {
        "El conductor canceló el viaje.".to_string()
    };
    Notification::new("Viaje cancelado", with_reason(body, reason), trip_link(outcome.trip_id))
}

pub fn reservation_cancelled(outcome: &CancellationOutcome, reason: Option<&str>) -> Notification {
    let body = if outcome.refund_processed {
        format!(
            "Un pasajero canceló su reserva. Recibirás una compensación del {}% del precio.",
            outcome.driver_compensation_percentage()
        )
    } else {
        "Un pasajero canceló su reserva.".to_string()
    };
    Notification::new("Reserva cancelada", with_reason(body, reason), trip_link(outcome.trip_id))
}

pub fn reservation_requested(update: &ReservationUpdate) -> Notification {
    Notification::new(
        "Nueva solicitud de reserva",
        "Un pasajero solicitó asientos en tu viaje.",
        trip_link(update.trip_id),
    )
}

pub fn reservation_approved(update: &ReservationUpdate) -> Notification {
    Notification::new(
        "Reserva aprobada",
        "El conductor aprobó tu reserva. Completa el pago para confirmarla.",
        trip_link(update.trip_id),
    )
}

pub fn reservation_rejected(update: &ReservationUpdate) -> Notification {
    Notification::new(
        "Reserva rechazada",
        "El conductor rechazó tu solicitud de reserva.",
        trip_link(update.trip_id),
    )
}

pub fn payment_confirmed(update: &ReservationUpdate) -> Notification {
    Notification::new(
        "Pago confirmado",
        "El pago de la reserva fue confirmado.",
        trip_link(update.trip_id),
    )
}
