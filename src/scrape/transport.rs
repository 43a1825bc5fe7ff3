//! Outbound HTTP capability used for target scrapes

use async_trait::async_trait;
use thiserror::Error;

/// Why a single target scrape failed
///
/// Never surfaced to clients; every variant becomes an `up{...} 0` line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} returned non-success status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("scrape of {url} exceeded the scrape deadline")]
    Timeout { url: String },

    #[error("scrape of {url} was cancelled")]
    Cancelled { url: String },
}

/// Response returned by an [`HttpTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Response body; left empty for non-success statuses
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for any 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues one plain GET and reads the body
///
/// Deadlines are enforced by the caller, so implementations should not add
/// their own overall timeout.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse, ScrapeError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with a fresh connection pool
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, ScrapeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Ok(TransportResponse::new(status.as_u16(), String::new()));
        }

        // Exposition text is UTF-8; anything else fails the scrape instead of
        // being rewritten with replacement characters.
        let bytes = response.bytes().await.map_err(|e| ScrapeError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let body = String::from_utf8(bytes.to_vec()).map_err(|e| ScrapeError::Body {
            url: url.to_string(),
            reason: format!("body is not valid UTF-8: {}", e.utf8_error()),
        })?;

        Ok(TransportResponse::new(status.as_u16(), body))
    }
}
