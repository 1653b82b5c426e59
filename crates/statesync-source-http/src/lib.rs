// # HTTP Value Source
//
// This crate provides an HTTP-based value source for the statesync system.
//
// ## Purpose
//
// This is a **fallback value source** for:
// - Deployments whose authoritative value lives behind a plain REST lookup
// - CI/CD testing
// - Debugging and validation
//
// Real deployments with richer transports (RPC, IPC) implement
// `ValueSource` against those directly; this crate exists so the system is
// usable end to end with nothing but an HTTP endpoint.
//
// ## Architecture
//
// Fetches `GET {base_url}/{identity}` once per call and classifies the
// outcome into the core's retryable/terminal split. Retry pacing is owned
// by the synchronizer; this source never retries internally.

use async_trait::async_trait;
use reqwest::StatusCode;
use statesync_core::error::FetchError;
use statesync_core::traits::ValueSource;
use std::time::Duration;
use tracing::debug;

/// Default timeout for a single fetch request
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How a response status maps onto the fetch taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    /// The body carries the value
    Value,
    /// Worth retrying under backoff
    Retryable,
    /// No value will arrive for this identity
    Terminal,
}

/// Classify an HTTP status into the fetch taxonomy
///
/// Server-side trouble and throttling are transient; the remaining client
/// errors mean the remote has authoritatively declined this identity.
fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Value
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        StatusClass::Retryable
    } else if status.is_client_error() {
        StatusClass::Terminal
    } else {
        StatusClass::Retryable
    }
}

/// HTTP-based value source (fallback for REST-backed deployments or CI)
pub struct HttpValueSource {
    /// Base URL the identity is appended to
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpValueSource {
    /// Create a new HTTP value source
    ///
    /// # Parameters
    ///
    /// - `base_url`: URL prefix; a fetch requests `{base_url}/{identity}`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create with a custom request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    fn url_for(&self, identity: &str) -> String {
        format!("{}/{}", self.base_url, identity)
    }
}

#[async_trait]
impl ValueSource for HttpValueSource {
    type Value = String;

    async fn fetch(&self, identity: &str) -> Result<String, FetchError> {
        let url = self.url_for(identity);
        debug!("Fetching value from {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::retryable(format!("request failed: {e}")))?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Value => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| FetchError::retryable(format!("failed to read response: {e}")))?;
                Ok(body.trim().to_string())
            }
            StatusClass::Retryable => Err(FetchError::retryable(format!("HTTP error: {status}"))),
            StatusClass::Terminal => Err(FetchError::terminal(format!("HTTP error: {status}"))),
        }
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_carry_the_value() {
        assert_eq!(classify_status(StatusCode::OK), StatusClass::Value);
        assert_eq!(classify_status(StatusCode::CREATED), StatusClass::Value);
    }

    #[test]
    fn transient_statuses_are_retryable() {
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            StatusClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            StatusClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::REQUEST_TIMEOUT),
            StatusClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            StatusClass::Retryable
        );
    }

    #[test]
    fn definite_rejections_are_terminal() {
        assert_eq!(classify_status(StatusCode::NOT_FOUND), StatusClass::Terminal);
        assert_eq!(classify_status(StatusCode::GONE), StatusClass::Terminal);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), StatusClass::Terminal);
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            StatusClass::Terminal
        );
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let source = HttpValueSource::new("https://api.example.com/accounts/");
        assert_eq!(
            source.url_for("acct-1"),
            "https://api.example.com/accounts/acct-1"
        );
    }
}
