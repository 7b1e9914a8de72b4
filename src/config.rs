use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::{clients::circuit_breaker::CircuitBreakerConfig, utils::RetryConfig};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub event_queue_name: String,
    pub failed_queue_name: String,
    pub prefetch_count: u16,

    pub database_url: String,

    pub mail_gateway_url: String,
    pub mail_timeout_seconds: u64,

    pub search_index_url: String,

    pub schedule_service_url: String,
    pub schedule_timeout_seconds: u64,

    pub consumer_name: String,

    pub staleness_threshold_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub admin_token: String,

    pub delivery_queue_depth: usize,
    pub delivery_worker_count: usize,
    pub delivery_timeout_seconds: u64,

    pub day_reminder_interval_seconds: u64,
    pub soon_reminder_interval_seconds: u64,
    pub retention_sweep_interval_seconds: u64,
    pub read_retention_days: i64,

    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_timeout_seconds: u64,
    pub circuit_breaker_success_threshold: u32,

    pub max_retry_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub retry_backoff_multiplier: u64,

    pub server_port: u16,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|_| anyhow!("Invalid or missing environmental variable"))?;
        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_failure_threshold,
            timeout_seconds: self.circuit_breaker_timeout_seconds,
            success_threshold: self.circuit_breaker_success_threshold,
        }
    }
}
