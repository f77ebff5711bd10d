use async_trait::async_trait;
use carpool_core::{BoxError, Notification, Notifier, PaymentGateway};
use carpool_domain::{PaymentInstruction, UserId};
use carpool_shared::models::events::{NotificationEvent, PaymentInstructionEvent};
use chrono::Utc;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }

    pub async fn publish_json<T: Serialize + Sync>(&self, topic: &str, key: &str, event: &T) -> Result<(), BoxError> {
        let payload = serde_json::to_string(event)?;
        self.publish(topic, key, &payload).await?;
        Ok(())
    }
}

/// Publishes notifications for the delivery worker. One event per fan-out.
pub struct KafkaNotifier {
    producer: EventProducer,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    fn event(recipients: Vec<UserId>, notification: &Notification) -> NotificationEvent {
        NotificationEvent {
            event_id: Uuid::new_v4(),
            recipients,
            title: notification.title.clone(),
            body: notification.body.clone(),
            link: notification.link.clone(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn notify_user(&self, user_id: UserId, notification: &Notification) -> Result<(), BoxError> {
        let event = Self::event(vec![user_id], notification);
        self.producer
            .publish_json(&self.topic, &user_id.to_string(), &event)
            .await
    }

    async fn notify_users(&self, user_ids: &[UserId], notification: &Notification) -> Result<(), BoxError> {
        let event = Self::event(user_ids.to_vec(), notification);
        self.producer
            .publish_json(&self.topic, &event.event_id.to_string(), &event)
            .await
    }
}

/// Hands refund and compensation instructions to the payment subsystem.
pub struct KafkaPaymentGateway {
    producer: EventProducer,
    topic: String,
}

impl KafkaPaymentGateway {
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for KafkaPaymentGateway {
    async fn submit(&self, instruction: &PaymentInstruction) -> Result<(), BoxError> {
        let event = PaymentInstructionEvent {
            event_id: Uuid::new_v4(),
            kind: instruction.kind,
            payment_id: instruction.payment_id,
            reservation_id: instruction.reservation_id,
            recipient_id: instruction.recipient_id,
            amount_cents: instruction.amount_cents,
            percentage: instruction.percentage,
            issued_at: Utc::now(),
        };
        // Keyed by payment so refund and compensation for one payment stay ordered.
        self.producer
            .publish_json(&self.topic, &instruction.payment_id.to_string(), &event)
            .await
    }
}
