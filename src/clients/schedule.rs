use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One scheduled interview, as served by the interview-schedule service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub session_id: String,
    pub candidate_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_email: Option<String>,

    pub job_title: String,
    pub scheduled_at: DateTime<Utc>,
}

/// Capability seam over the external interview-schedule data.
#[async_trait]
pub trait ScheduleProvider: Send + Sync {
    async fn sessions_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<InterviewSession>, Error>;
}

pub struct ScheduleServiceClient {
    http_client: Client,
    base_url: String,
}

impl ScheduleServiceClient {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(base_url = %base_url, "Schedule service client initialized");

        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl ScheduleProvider for ScheduleServiceClient {
    async fn sessions_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<InterviewSession>, Error> {
        let url = format!(
            "{}/api/v1/interviews?from={}&to={}",
            self.base_url,
            from.to_rfc3339_opts(SecondsFormat::Secs, true),
            to.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        debug!(from = %from, to = %to, "Fetching interview sessions");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Schedule service unreachable: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Schedule service returned status {}",
                response.status()
            ));
        }

        let sessions: Vec<InterviewSession> = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse interview sessions: {}", e))?;

        Ok(sessions)
    }
}
