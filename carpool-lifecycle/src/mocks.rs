//! Recording collaborators for tests and local runs without a broker.

use async_trait::async_trait;
use carpool_core::{AuditEntry, AuditLog, BoxError, Clock, Notification, Notifier, PaymentGateway};
use carpool_domain::{PaymentInstruction, UserId};
use std::sync::{Arc, Mutex};

use crate::effects::EffectDispatcher;

fn snapshot<T: Clone>(items: &Mutex<Vec<T>>) -> Vec<T> {
    items.lock().map(|v| v.clone()).unwrap_or_default()
}

fn push<T>(items: &Mutex<Vec<T>>, item: T) {
    if let Ok(mut v) = items.lock() {
        v.push(item);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, Notification)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery fails after being counted.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(UserId, Notification)> {
        snapshot(&self.sent)
    }

    pub fn sent_to(&self, user_id: UserId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|(recipient, _)| *recipient == user_id)
            .map(|(_, n)| n)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_user(&self, user_id: UserId, notification: &Notification) -> Result<(), BoxError> {
        push(&self.sent, (user_id, notification.clone()));
        if self.fail {
            return Err("notification channel unavailable".into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    fail: bool,
}

impl RecordingAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        snapshot(&self.entries)
    }
}

#[async_trait]
impl AuditLog for RecordingAuditLog {
    async fn record(&self, entry: &AuditEntry) -> Result<(), BoxError> {
        if self.fail {
            return Err("audit table unavailable".into());
        }
        push(&self.entries, entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPaymentGateway {
    submitted: Mutex<Vec<PaymentInstruction>>,
    fail: bool,
}

impl RecordingPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> Vec<PaymentInstruction> {
        snapshot(&self.submitted)
    }
}

#[async_trait]
impl PaymentGateway for RecordingPaymentGateway {
    async fn submit(&self, instruction: &PaymentInstruction) -> Result<(), BoxError> {
        if self.fail {
            return Err("payment broker unavailable".into());
        }
        push(&self.submitted, instruction.clone());
        Ok(())
    }
}

/// The three recorders wired together.
#[derive(Clone)]
pub struct Recorders {
    pub notifier: Arc<RecordingNotifier>,
    pub audit: Arc<RecordingAuditLog>,
    pub payments: Arc<RecordingPaymentGateway>,
}

impl Recorders {
    pub fn new() -> Self {
        Self {
            notifier: Arc::new(RecordingNotifier::new()),
            audit: Arc::new(RecordingAuditLog::new()),
            payments: Arc::new(RecordingPaymentGateway::new()),
        }
    }

    pub fn dispatcher(&self, clock: Arc<dyn Clock>) -> EffectDispatcher {
        EffectDispatcher::new(
            self.notifier.clone(),
            self.audit.clone(),
            self.payments.clone(),
            clock,
        )
    }
}

impl Default for Recorders {
    fn default() -> Self {
        Self::new()
    }
}
