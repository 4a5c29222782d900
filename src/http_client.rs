//! The single shared, authenticated HTTP client used for both the initial
//! OpenAPI document fetch and every subsequent tool dispatch.

use std::time::Duration;

use crate::error::AirflowMcpError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bundles the base URL and bearer token alongside the pooled `reqwest`
/// client so dispatch sites don't have to thread three parameters around.
#[derive(Debug, Clone)]
pub struct HttpClientHandle {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpClientHandle {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, AirflowMcpError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AirflowMcpError::UpstreamError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Applies the 30-second dispatch-wide timeout around a request future,
    /// per §5's concurrency model. `reqwest`'s own per-request timeout
    /// already enforces this; this wrapper additionally maps `Elapsed` to
    /// the taxonomy's `UpstreamTimeout` for calls built without it (e.g.
    /// hand-assembled requests in tests).
    pub async fn with_timeout<F, T>(&self, fut: F) -> Result<T, AirflowMcpError>
    where
        F: std::future::Future<Output = Result<T, AirflowMcpError>>,
    {
        match tokio::time::timeout(REQUEST_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(AirflowMcpError::UpstreamTimeout(REQUEST_TIMEOUT)),
        }
    }

    /// Closes out the connection pool on shutdown. `reqwest::Client` has no
    /// explicit close; dropping the last clone tears down the pool, so this
    /// exists purely to document the shutdown step named in §4.6.
    pub fn shutdown(self) {
        drop(self);
    }
}
