//! HTTP Client Abstraction
//!
//! Streaming byte fetch of resolved audio URLs.

use async_trait::async_trait;
use std::fmt;
use tokio::io::AsyncRead;

use crate::error::Result;

/// An open response body being streamed from a remote URL
pub struct DownloadStream {
    /// Total size announced by the server, if any
    pub content_length: Option<u64>,
    /// Response body
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

impl DownloadStream {
    pub fn new(content_length: Option<u64>, body: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self {
            content_length,
            body,
        }
    }
}

impl fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// HTTP client trait
///
/// # Platform Support
///
/// - **Desktop**: reqwest with rustls
/// - **iOS**: URLSession
/// - **Android**: OkHttp
///
/// Implementations should return an error for non-success status codes
/// rather than a stream over an error body.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::HttpClient;
/// use tokio::io::AsyncReadExt;
///
/// async fn fetch(client: &dyn HttpClient, url: &str) -> Result<Vec<u8>> {
///     let mut stream = client.download_stream(url).await?;
///     let mut buf = Vec::new();
///     stream.body.read_to_end(&mut buf).await?;
///     Ok(buf)
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Open a streaming GET of `url`
    async fn download_stream(&self, url: &str) -> Result<DownloadStream>;
}
