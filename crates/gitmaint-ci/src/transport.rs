//! HTTP access for the CI backends.

use async_trait::async_trait;
use gitmaint_core::CiError;
use tracing::debug;

/// Fetches a URL and returns its body.
#[async_trait]
pub trait CiTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, CiError>;
}

/// [`CiTransport`] over a shared `reqwest` client.
///
/// Redirects are followed by the client; any non-success final status is a
/// [`CiError::Request`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, CiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("git-maintain/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CiError::Request {
                url: String::new(),
                status: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CiTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String, CiError> {
        debug!(%url, "querying CI");
        let request_failed = |status: String| CiError::Request {
            url: url.to_string(),
            status,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(request_failed(status.to_string()));
        }
        response
            .text()
            .await
            .map_err(|e| request_failed(e.to_string()))
    }
}
