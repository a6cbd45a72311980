//! HTTP chunk transport.
//!
//! Each chunk is delivered as one `POST` whose body is the raw artifact
//! bytes. Only `200 OK` counts as success; any other status is a rejection.

use std::time::Duration;

use chunksync_chunker::Chunk;
use chunksync_sync::{Transport, TransportError};
use reqwest::{StatusCode, Url};
use tracing::debug;

/// Request timeout applied to every upload.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Header carrying the chunk index.
pub const CHUNK_INDEX_HEADER: &str = "x-chunk-index";

/// Header carrying the SHA-256 hex digest of the body.
pub const CHUNK_CHECKSUM_HEADER: &str = "x-chunk-sha256";

/// Errors from building the transport.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

/// Uploads chunk artifacts to a fixed endpoint.
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Creates a transport posting to `endpoint`.
    pub fn new(endpoint: &str) -> Result<Self, Error> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Creates a transport with a custom per-request timeout.
    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, Error> {
        let endpoint = Url::parse(endpoint).map_err(|e| Error::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }

    /// Returns the upload endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, chunk: &Chunk) -> Result<(), TransportError> {
        let data = tokio::fs::read(&chunk.artifact).await?;

        let resp = self
            .http
            .post(self.endpoint.clone())
            .header(CHUNK_INDEX_HEADER, chunk.index.to_string())
            .header(CHUNK_CHECKSUM_HEADER, chunk.checksum.as_str())
            .body(data)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Rejected(format!(
                "upload of chunk {} failed with status {}: {body}",
                chunk.index,
                status.as_u16()
            )));
        }

        debug!(index = chunk.index, len = chunk.len, "chunk delivered");
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn upload<'a>(
        &'a self,
        chunk: &'a Chunk,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(self.post(chunk))
    }
}
