use carpool_core::{ActionStatus, ActionType, AuditEntry, AuditLog, Clock, Notification, Notifier, PaymentGateway};
use carpool_domain::{LifecycleResult, PaymentInstruction, UserId};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Side effects that run after the unit of work is settled.
///
/// None of these can undo a commit: failures are logged and swallowed here, never propagated.
#[derive(Clone)]
pub struct EffectDispatcher {
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditLog>,
    payments: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
}

impl EffectDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditLog>,
        payments: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notifier,
            audit,
            payments,
            clock,
        }
    }

    pub async fn notify(&self, recipients: &[UserId], notification: &Notification) {
        if recipients.is_empty() {
            return;
        }

        let result = match recipients {
            [single] => self.notifier.notify_user(*single, notification).await,
            many => self.notifier.notify_users(many, notification).await,
        };
        if let Err(e) = result {
            warn!("Failed to deliver notification '{}' to {} users: {}", notification.title, recipients.len(), e);
        }
    }

    pub async fn submit_payments(&self, instructions: &[PaymentInstruction]) {
        for instruction in instructions {
            match self.payments.submit(instruction).await {
                Ok(()) => info!(
                    "Submitted {:?} of {} cents for payment {}",
                    instruction.kind, instruction.amount_cents, instruction.payment_id
                ),
                // The refund intent is already committed on the payment row; reconciliation picks it up.
                Err(e) => error!(
                    "Failed to submit {:?} for payment {}: {}",
                    instruction.kind, instruction.payment_id, e
                ),
            }
        }
    }

    /// Record the outcome of an orchestrator call, success or failure.
    pub async fn audit<T: Serialize>(
        &self,
        actor_id: Option<UserId>,
        action: ActionType,
        context: serde_json::Value,
        result: &LifecycleResult<T>,
    ) {
        let (status, outcome) = match result {
            Ok(value) => (ActionStatus::Success, json!({ "result": value })),
            Err(e) => {
                if e.is_domain() {
                    warn!("{} rejected: {}", action, e);
                } else {
                    error!("{} failed: {:?}", action, e);
                }
                (
                    ActionStatus::Failed,
                    json!({ "error": { "kind": e.kind(), "message": e.to_string() } }),
                )
            }
        };

        let entry = AuditEntry {
            actor_id,
            action,
            status,
            details: json!({ "context": context, "outcome": outcome }),
            recorded_at: self.clock.now(),
        };
        if let Err(e) = self.audit.record(&entry).await {
            error!("Failed to write audit entry for {}: {}", action, e);
        }
    }
}
