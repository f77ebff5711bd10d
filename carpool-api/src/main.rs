use anyhow::Context;
use carpool_api::{app, middleware::JwtIdentityResolver, state::AppState};
use carpool_core::{Clock, SystemClock};
use carpool_domain::CancellationPolicy;
use carpool_lifecycle::{EffectDispatcher, LifecycleOrchestrator};
use carpool_shared::Masked;
use carpool_store::{
    app_config::Config, DbClient, EventProducer, KafkaNotifier, KafkaPaymentGateway, PgAuditLog, PgTripStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "carpool_api=debug,carpool_lifecycle=info,carpool_store=info,tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Carpool API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let policy_config = match db.fetch_policy(config.policy.clone()).await {
        Ok(policy) => policy,
        Err(e) => {
            tracing::warn!("Could not read policy_rules, using configured policy: {}", e);
            config.policy.clone()
        }
    };
    let policy = CancellationPolicy::new(policy_config).context("Invalid cancellation policy")?;
    tracing::info!("Cancellation policy: {:?}", policy.config());

    let producer = EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let effects = EffectDispatcher::new(
        Arc::new(KafkaNotifier::new(producer.clone(), config.kafka.notification_topic.clone())),
        Arc::new(PgAuditLog::new(db.pool.clone())),
        Arc::new(KafkaPaymentGateway::new(producer, config.kafka.payment_topic.clone())),
        clock.clone(),
    );
    let orchestrator = LifecycleOrchestrator::new(
        Arc::new(PgTripStore::new(db.pool.clone())),
        policy,
        clock,
        effects,
    );

    let app_state = AppState {
        orchestrator: Arc::new(orchestrator),
        identity: Arc::new(JwtIdentityResolver::new(&Masked(config.auth.jwt_secret.clone()))),
        webhook_secret: Masked(config.auth.webhook_secret.clone()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state)).await?;
    Ok(())
}
