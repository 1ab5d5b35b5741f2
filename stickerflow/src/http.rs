//! `reqwest`-backed [`RemoteFetcher`].

use crate::errors::TransientRemoteError;
use crate::ports::RemoteFetcher;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("stickerflow/", env!("CARGO_PKG_VERSION"));

/// Downloads source images over HTTP(S).
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher with the default timeout.
    pub fn new() -> Result<Self, TransientRemoteError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a fetcher with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransientRemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| TransientRemoteError::new("build http client", e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteFetcher for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransientRemoteError> {
        debug!(url, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransientRemoteError::new("download", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Download returned non-success status");
            return Err(TransientRemoteError::new(
                "download",
                format!("HTTP {status}"),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransientRemoteError::new("download", e.to_string()))?;

        debug!(url, bytes = body.len(), "Downloaded");
        Ok(body.to_vec())
    }
}
