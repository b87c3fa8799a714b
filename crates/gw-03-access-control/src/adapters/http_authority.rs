//! HTTP client for the upstream access authority.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use crate::domain::{AccessVerdict, Endpoint, UpstreamError};
use crate::ports::AccessAuthority;

/// Forwards access requests as `PUT {base_url}/request/{endpoint}`.
pub struct HttpAccessAuthority {
    client: Client,
    base_url: String,
}

impl HttpAccessAuthority {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, endpoint: Endpoint) -> String {
        format!("{}/request/{}", self.base_url, endpoint)
    }
}

fn classify(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else if err.is_connect() {
        UpstreamError::Unreachable(err.to_string())
    } else if err.is_decode() {
        UpstreamError::Decode(err.to_string())
    } else {
        UpstreamError::Transport(err.to_string())
    }
}

#[async_trait]
impl AccessAuthority for HttpAccessAuthority {
    async fn request(
        &self,
        endpoint: Endpoint,
        payload: &str,
    ) -> Result<AccessVerdict, UpstreamError> {
        let url = self.url_for(endpoint);
        let started = Instant::now();

        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_owned())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), elapsed_ms = started.elapsed().as_millis() as u64, "upstream replied");
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        response.json::<AccessVerdict>().await.map_err(classify)
    }
}
