use async_trait::async_trait;
use carpool_core::{AuditEntry, AuditLog, BoxError};
use sqlx::PgPool;
use uuid::Uuid;

/// Writes audit entries to `action_logs`, outside any trip transaction.
#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn record(&self, entry: &AuditEntry) -> Result<(), BoxError> {
        sqlx::query(
            r#"
            INSERT INTO action_logs (id, actor_id, action_type, status, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.actor_id)
        .bind(entry.action.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.details)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
