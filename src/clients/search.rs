use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use reqwest::Client;
use tracing::info;

/// Reachability client for the search index. The index writer proper lives in
/// the job-posting CRUD layers; this subsystem only needs to answer whether
/// the index is reachable.
pub struct SearchIndexClient {
    http_client: Client,
    base_url: String,
}

impl SearchIndexClient {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(base_url = %base_url, "Search index client initialized");

        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
        })
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let url = format!("{}/_cluster/health", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Search index unreachable: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("Search index returned status {}", response.status()))
        }
    }
}
