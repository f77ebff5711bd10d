use async_trait::async_trait;
use carpool_domain::UserId;
use serde::Serialize;

use crate::BoxError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, link: Option<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            link,
        }
    }
}

/// Push/email delivery. Called only after a successful commit; failures never roll back.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(&self, user_id: UserId, notification: &Notification) -> Result<(), BoxError>;

    async fn notify_users(&self, user_ids: &[UserId], notification: &Notification) -> Result<(), BoxError> {
        for user_id in user_ids {
            self.notify_user(*user_id, notification).await?;
        }
        Ok(())
    }
}
