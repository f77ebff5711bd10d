use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published on the notification topic; a downstream worker fans it out to push and email.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationEvent {
    pub event_id: Uuid,
    pub recipients: Vec<Uuid>,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstructionKind {
    Refund,
    Compensation,
}

/// Published on the payment topic. The payment subsystem owns the actual money movement.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentInstructionEvent {
    pub event_id: Uuid,
    pub kind: InstructionKind,
    pub payment_id: Uuid,
    pub reservation_id: Uuid,
    pub recipient_id: Uuid,
    pub amount_cents: i64,
    pub percentage: u8,
    pub issued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_kind_wire_format() {
        let event = PaymentInstructionEvent {
            event_id: Uuid::new_v4(),
            kind: InstructionKind::Compensation,
            payment_id: Uuid::new_v4(),
            reservation_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            amount_cents: 3000,
            percentage: 30,
            issued_at: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "COMPENSATION");
        assert_eq!(json["amount_cents"], 3000);
    }
}
