use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{
    clients::{
        circuit_breaker::CircuitState, database::DatabaseClient, mail::MailGatewayClient,
        rbmq::RabbitMqClient, search::SearchIndexClient,
    },
    config::Config,
    models::{
        health::{ComponentHealth, ComponentStatus, HealthSnapshot},
        heartbeat::HeartbeatRecord,
    },
    store::HeartbeatRegistry,
};

/// Run one reachability probe under its own timeout. A hung dependency
/// becomes a DOWN component instead of blocking the whole snapshot.
pub async fn probe_with_timeout<F>(name: &str, timeout: Duration, probe: F) -> ComponentHealth
where
    F: std::future::Future<Output = Result<(), Error>>,
{
    let checked_at = Utc::now();

    match tokio::time::timeout(timeout, probe).await {
        Ok(Ok(())) => ComponentHealth::up(name, checked_at),
        Ok(Err(e)) => ComponentHealth::down(name, e.to_string(), checked_at),
        Err(_) => ComponentHealth::down(
            name,
            format!("Probe timed out after {}s", timeout.as_secs()),
            checked_at,
        ),
    }
}

/// Liveness inference for one named worker from its heartbeat record. DOWN
/// when no record exists, when the worker has never succeeded, or when its
/// last success is older than the staleness threshold.
pub fn worker_component(
    worker: &str,
    record: Option<&HeartbeatRecord>,
    now: DateTime<Utc>,
    staleness_threshold: chrono::Duration,
) -> ComponentHealth {
    let Some(record) = record else {
        return ComponentHealth::down(worker, "No heartbeat recorded yet".to_string(), now);
    };

    let counters = |health: ComponentHealth| {
        let health = health
            .with_detail("message_count", serde_json::json!(record.message_count))
            .with_detail("error_count", serde_json::json!(record.error_count));

        match &record.last_error_message {
            Some(message) => health.with_detail("last_error", serde_json::json!(message)),
            None => health,
        }
    };

    let Some(last_processed_at) = record.last_processed_at else {
        return counters(ComponentHealth::down(
            worker,
            "Worker has never processed a message successfully".to_string(),
            now,
        ));
    };

    let gap = now - last_processed_at;
    if gap > staleness_threshold {
        return counters(
            ComponentHealth::down(
                worker,
                format!(
                    "No successful processing for {}s (threshold {}s)",
                    gap.num_seconds(),
                    staleness_threshold.num_seconds()
                ),
                now,
            )
            .with_detail(
                "last_processed_at",
                serde_json::json!(last_processed_at.to_rfc3339()),
            ),
        );
    }

    counters(ComponentHealth::up(worker, now)).with_detail(
        "last_processed_at",
        serde_json::json!(last_processed_at.to_rfc3339()),
    )
}

/// Aggregates dependency probes and pipeline liveness into one snapshot.
/// Never cached, never fallible: every failure mode is data in the result.
pub struct HealthChecker {
    config: Config,
    database: Arc<DatabaseClient>,
    heartbeats: Arc<dyn HeartbeatRegistry>,
    mail: Arc<MailGatewayClient>,
    search: Arc<SearchIndexClient>,
    watched_workers: Vec<String>,
}

impl HealthChecker {
    pub fn new(
        config: Config,
        database: Arc<DatabaseClient>,
        heartbeats: Arc<dyn HeartbeatRegistry>,
        mail: Arc<MailGatewayClient>,
        search: Arc<SearchIndexClient>,
        watched_workers: Vec<String>,
    ) -> Self {
        Self {
            config,
            database,
            heartbeats,
            mail,
            search,
            watched_workers,
        }
    }

    pub async fn check_all(&self) -> HealthSnapshot {
        let generated_at = Utc::now();

        let (database, broker, mail, search, workers) = tokio::join!(
            self.check_database(),
            self.check_broker(),
            self.check_mail_gateway(),
            self.check_search_index(),
            self.check_workers(),
        );

        let mut components = HashMap::new();
        for component in [database, broker, mail, search]
            .into_iter()
            .chain(workers)
        {
            components.insert(component.name.clone(), component);
        }

        HealthSnapshot::from_components(components, generated_at)
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.config.probe_timeout_seconds)
    }

    async fn check_database(&self) -> ComponentHealth {
        probe_with_timeout("database", self.probe_timeout(), self.database.health_check()).await
    }

    async fn check_broker(&self) -> ComponentHealth {
        probe_with_timeout("message_broker", self.probe_timeout(), async {
            RabbitMqClient::connect(&self.config).await.map(|_| ())
        })
        .await
    }

    async fn check_mail_gateway(&self) -> ComponentHealth {
        let health =
            probe_with_timeout("mail_gateway", self.probe_timeout(), self.mail.ping()).await;

        let circuit_state = self.mail.circuit_state();
        let health = match (health.status, circuit_state) {
            (ComponentStatus::Up, CircuitState::Open | CircuitState::HalfOpen) => {
                ComponentHealth::degraded(
                    "mail_gateway",
                    "Circuit breaker in recovery mode".to_string(),
                    health.checked_at,
                )
            }
            _ => health,
        };

        health.with_detail("circuit_breaker", serde_json::json!(circuit_state.as_str()))
    }

    async fn check_search_index(&self) -> ComponentHealth {
        probe_with_timeout("search_index", self.probe_timeout(), self.search.ping()).await
    }

    async fn check_workers(&self) -> Vec<ComponentHealth> {
        let now = Utc::now();
        let staleness = chrono::Duration::seconds(self.config.staleness_threshold_seconds as i64);

        let mut components = Vec::with_capacity(self.watched_workers.len());
        for worker in &self.watched_workers {
            let lookup = tokio::time::timeout(self.probe_timeout(), self.heartbeats.get(worker));

            let component = match lookup.await {
                Ok(Ok(record)) => worker_component(worker, record.as_ref(), now, staleness),
                Ok(Err(e)) => {
                    warn!(worker = %worker, error = %e, "Heartbeat lookup failed");
                    ComponentHealth::down(worker, format!("Heartbeat lookup failed: {}", e), now)
                }
                Err(_) => ComponentHealth::down(
                    worker,
                    format!(
                        "Heartbeat lookup timed out after {}s",
                        self.probe_timeout().as_secs()
                    ),
                    now,
                ),
            };

            components.push(component);
        }

        components
    }
}
