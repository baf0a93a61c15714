use std::time::Duration;

use async_trait::async_trait;
use shotsched_core::config::DeviceConfig;
use shotsched_scheduler::{DeviceCommandClient, DispatchError};
use tracing::debug;

const USER_AGENT: &str = "shotsched";
/// Longest device response body quoted back in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Device command client that POSTs to the machine's HTTP API.
pub struct HttpDeviceClient {
    client: reqwest::Client,
    base_url: String,
    preheat_path: String,
    run_profile_path: String,
}

impl HttpDeviceClient {
    pub fn new(config: &DeviceConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            preheat_path: config.preheat_path.clone(),
            run_profile_path: config.run_profile_path.clone(),
        })
    }

    fn preheat_url(&self) -> String {
        format!("{}{}", self.base_url, self.preheat_path)
    }

    fn run_profile_url(&self, profile_id: &str) -> String {
        let path = self
            .run_profile_path
            .replace("{profile_id}", &urlencoding::encode(profile_id));
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, url: &str) -> Result<(), DispatchError> {
        debug!(%url, "device command");
        let resp = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| DispatchError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(DispatchError::Rejected(rejection_message(status, &body)))
    }
}

fn rejection_message(status: reqwest::StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP {status}");
    }
    let cut = body
        .char_indices()
        .nth(MAX_ERROR_BODY)
        .map_or(body.len(), |(i, _)| i);
    format!("HTTP {status}: {}", &body[..cut])
}

#[async_trait]
impl DeviceCommandClient for HttpDeviceClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn preheat(&self) -> Result<(), DispatchError> {
        self.post(&self.preheat_url()).await
    }

    async fn run_profile(&self, profile_id: &str) -> Result<(), DispatchError> {
        self.post(&self.run_profile_url(profile_id)).await
    }
}
