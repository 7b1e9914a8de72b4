use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    clients::circuit_breaker::CircuitBreaker,
    config::Config,
    models::notification::Notification,
    utils::{RetryConfig, retry_with_backoff},
};

/// Outbound mail payload handed to the gateway. Content formatting beyond
/// subject/body selection belongs to the gateway, not this service.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub event_id: String,
}

impl OutboundMail {
    /// None when the notification has no recipient email address.
    pub fn from_notification(notification: &Notification) -> Option<Self> {
        let to = notification.recipient_email.clone()?;

        Some(Self {
            to,
            subject: notification
                .subject
                .clone()
                .unwrap_or_else(|| notification.title.clone()),
            body: notification.message.clone(),
            event_id: notification.event_id.clone(),
        })
    }
}

/// Capability seam for outbound mail, so the delivery pool can be exercised
/// without a live gateway.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: &OutboundMail) -> Result<(), Error>;
}

pub struct MailGatewayClient {
    http_client: Client,
    base_url: String,
    retry_config: RetryConfig,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl MailGatewayClient {
    pub fn new(config: &Config, circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.mail_timeout_seconds))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(base_url = %config.mail_gateway_url, "Mail gateway client initialized");

        Ok(Self {
            http_client,
            base_url: config.mail_gateway_url.clone(),
            retry_config: config.retry_config(),
            circuit_breaker,
        })
    }

    pub fn circuit_state(&self) -> crate::clients::circuit_breaker::CircuitState {
        self.circuit_breaker.state()
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Mail gateway unreachable: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("Mail gateway returned status {}", response.status()))
        }
    }

    async fn send_once(http_client: Client, url: String, mail: OutboundMail) -> Result<(), Error> {
        let response = http_client.post(&url).json(&mail).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(anyhow!("Mail gateway returned {}: {}", status, error_text))
        }
    }
}

#[async_trait]
impl MailSender for MailGatewayClient {
    async fn send(&self, mail: &OutboundMail) -> Result<(), Error> {
        debug!(
            event_id = %mail.event_id,
            recipient = %mail.to,
            "Sending notification email"
        );

        let url = format!("{}/api/v1/mail/send", self.base_url);
        let http_client = self.http_client.clone();
        let retry_config = self.retry_config.clone();
        let payload = mail.clone();

        self.circuit_breaker
            .call(|| async move {
                retry_with_backoff(&retry_config, || {
                    Self::send_once(http_client.clone(), url.clone(), payload.clone())
                })
                .await
            })
            .await?;

        info!(event_id = %mail.event_id, "Notification email sent");

        Ok(())
    }
}
