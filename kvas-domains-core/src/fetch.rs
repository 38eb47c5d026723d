use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::FetchConfig;
use crate::contract::{FetchError, Fetcher};

/// [`Fetcher`] over HTTP(S) using a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "Non-success response");
            return Err(FetchError::http(status.as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::transport(e.to_string()))?;
        debug!(url, bytes = body.len(), "Fetched body");
        Ok(body.to_vec())
    }
}
