use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use tracing::error;
use tracing_subscriber::EnvFilter;

use notification_service::{
    api::run_api_server,
    clients::{
        circuit_breaker::CircuitBreaker,
        database::DatabaseClient,
        health::HealthChecker,
        mail::{MailGatewayClient, MailSender},
        rbmq::RabbitMqClient,
        schedule::ScheduleServiceClient,
        search::SearchIndexClient,
    },
    config::Config,
    consumer::{EnvelopeProcessor, run_consumer_loop},
    delivery::{DeliveryConfig, spawn_delivery_pool},
    scheduler::{EventPublisher, ReminderScheduler, SchedulerConfig},
    store::{
        HeartbeatRegistry, NotificationStore,
        postgres::{PgHeartbeatRegistry, PgNotificationStore},
    },
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;

    let database = Arc::new(DatabaseClient::connect(&config.database_url).await?);
    database.migrate().await?;

    let pool = database.pool();
    let store: Arc<dyn NotificationStore> = Arc::new(PgNotificationStore::new(pool.clone()));
    let heartbeats: Arc<dyn HeartbeatRegistry> = Arc::new(PgHeartbeatRegistry::new(pool));

    let circuit_breaker = Arc::new(CircuitBreaker::new(
        "mail_gateway".to_string(),
        config.circuit_breaker_config(),
    ));
    let mail = Arc::new(MailGatewayClient::new(&config, circuit_breaker)?);
    let search = Arc::new(SearchIndexClient::new(&config.search_index_url)?);
    let schedule = Arc::new(ScheduleServiceClient::new(
        &config.schedule_service_url,
        config.schedule_timeout_seconds,
    )?);
    let rbmq = Arc::new(RabbitMqClient::connect(&config).await?);

    let (delivery, _delivery_task) = spawn_delivery_pool(
        Arc::clone(&mail) as Arc<dyn MailSender>,
        DeliveryConfig::from_config(&config),
    );

    let processor = EnvelopeProcessor::new(
        Arc::clone(&store),
        Arc::clone(&heartbeats),
        delivery,
        config.consumer_name.clone(),
    );

    let consumer_rbmq = Arc::clone(&rbmq);
    tokio::spawn(async move {
        if let Err(e) = run_consumer_loop(consumer_rbmq, processor).await {
            error!(error = %e, "Consumer loop terminated");
        }
    });

    let scheduler = Arc::new(ReminderScheduler::new(
        schedule,
        Arc::clone(&rbmq) as Arc<dyn EventPublisher>,
        Arc::clone(&store),
        SchedulerConfig::from_config(&config),
    ));
    let _scheduler_tasks = Arc::clone(&scheduler).start();

    let health_checker = Arc::new(HealthChecker::new(
        config.clone(),
        database,
        Arc::clone(&heartbeats),
        mail,
        search,
        vec![config.consumer_name.clone()],
    ));

    let served = run_api_server(&config, store, health_checker).await;

    scheduler.stop();

    served.map_err(|e| anyhow!("API server failed: {}", e))
}
