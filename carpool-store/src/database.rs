use carpool_domain::{PolicyConfig, RefundTier};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rows of `policy_rules` on top of the file/env policy.
    ///
    /// Rows hold `{"value": ...}`. Unknown keys and values of the wrong shape are skipped.
    pub async fn fetch_policy(&self, defaults: PolicyConfig) -> Result<PolicyConfig, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM policy_rules")
            .fetch_all(&self.pool)
            .await?;

        Ok(apply_policy_rules(defaults, rows))
    }
}

fn apply_policy_rules(mut policy: PolicyConfig, rows: Vec<(String, Value)>) -> PolicyConfig {
    for (key, raw) in rows {
        let Some(value) = raw.get("value") else {
            warn!("Policy rule {} has no value, skipping", key);
            continue;
        };

        match key.as_str() {
            "lock_window_hours" => {
                if let Some(hours) = value.as_f64() {
                    policy.lock_window_hours = hours;
                }
            }
            "service_fee_basis_points" => {
                if let Some(bps) = value.as_u64().and_then(|v| u32::try_from(v).ok()) {
                    policy.service_fee_basis_points = bps;
                }
            }
            "refund_tiers" => match serde_json::from_value::<Vec<RefundTier>>(value.clone()) {
                Ok(tiers) => policy.refund_tiers = tiers,
                Err(e) => warn!("Ignoring malformed refund_tiers rule: {}", e),
            },
            other => warn!("Unknown policy rule {}", other),
        }
    }
    policy
}
