//! HTTP scoring service client

use super::{HealthStatus, ScoringRequest, ScoringResponse, ScoringService};
use crate::config::ScoringConfig;
use crate::error::{Result, WatchError};
use async_trait::async_trait;
use std::time::Duration;

/// Scoring service reached over HTTP/JSON
///
/// One request per classification. The client-level timeout bounds every
/// round trip.
pub struct HttpScoringService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpScoringService {
    pub fn new(config: &ScoringConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WatchError::Config(format!("Failed to build scoring client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
        url: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::Transport(format!(
                "{} returned status {}",
                url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| WatchError::Transport(format!("{}: failed to read body: {}", url, e)))?;

        serde_json::from_slice(&body)
            .map_err(|e| WatchError::Parse(format!("{}: malformed body: {}", url, e)))
    }
}

#[async_trait]
impl ScoringService for HttpScoringService {
    async fn classify(&self, request: &ScoringRequest) -> Result<ScoringResponse> {
        let url = format!("{}/check-permission", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| WatchError::Transport(format!("{}: {}", url, e)))?;

        let parsed: ScoringResponse = self.read_json(response, &url).await?;
        parsed.validate()?;
        Ok(parsed)
    }

    async fn health(&self) -> Result<HealthStatus> {
        let url = format!("{}/", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WatchError::Transport(format!("{}: {}", url, e)))?;

        self.read_json(response, &url).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ScoringConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        let service = HttpScoringService::new(&config).unwrap();
        assert_eq!(service.base_url(), "http://localhost:8000");
        assert_eq!(service.name(), "http");
    }
}
