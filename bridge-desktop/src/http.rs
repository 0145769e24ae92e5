//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{DownloadStream, HttpClient},
};
use futures_util::TryStreamExt;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Reqwest-based HTTP client implementation
///
/// Streams payloads with:
/// - Connection pooling via reqwest
/// - rustls TLS
/// - A connect timeout only; whole-transfer deadlines belong to the caller
///
/// Retries are not performed here. The download scheduler owns the retry
/// policy and counts every failed fetch as one attempt.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Self {
        Self::with_connect_timeout(Duration::from_secs(10))
    }

    /// Create a new HTTP client with a custom connect timeout
    pub fn with_connect_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(timeout)
            .pool_max_idle_per_host(10)
            .user_agent(concat!("waveline/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self { client }
    }

    /// Create a new HTTP client around a preconfigured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn map_request_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout(e.to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }

    fn map_status(status: StatusCode, url: &str) -> BridgeError {
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            BridgeError::NotFound(format!("HTTP {} for {}", status.as_u16(), redact(url)))
        } else {
            BridgeError::OperationFailed(format!("HTTP {} error", status.as_u16()))
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn download_stream(&self, url: &str) -> Result<DownloadStream> {
        debug!(url = %redact(url), "Opening download stream");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::map_status(status, url));
        }

        let content_length = response.content_length();
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = tokio_util::io::StreamReader::new(stream);

        Ok(DownloadStream::new(content_length, Box::new(reader)))
    }
}

/// Strip the query string, which usually carries the URL signature
fn redact(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
