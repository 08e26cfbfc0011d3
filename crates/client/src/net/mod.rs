//! Origin network access.
//!
//! The coordinator never talks to reqwest directly; everything goes
//! through the [`Network`] trait so strategies and the queue drain can
//! be exercised against a scripted fake. The contract at this seam:
//!
//! - transport failures (unreachable origin, timed-out request) are
//!   `Err` with a transport error
//! - an HTTP error status is a normal `Ok` response; deciding what a
//!   4xx or 5xx means is the caller's business
//!
//! ### Timeouts
//! The reqwest client carries the configured timeout itself, so a hung
//! origin surfaces here as `Error::Timeout` rather than hanging the
//! event that triggered the fetch.

pub mod url;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use vowkeep_core::{AppConfig, Error, HttpRequest, HttpResponse};

pub use url::{UrlError, canonicalize, resolve};

/// Configuration for the origin client.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// User agent string (default: "vowkeep/0.1")
    pub user_agent: String,

    /// Request timeout (default: 5s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { user_agent: "vowkeep/0.1".to_string(), timeout: Duration::from_millis(5_000), max_redirects: 5 }
    }
}

impl NetworkConfig {
    /// Derive the network configuration from the worker configuration.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.network_timeout(),
            ..Default::default()
        }
    }
}

/// The seam between the coordinator and the wire.
#[async_trait]
pub trait Network: Send + Sync {
    /// Send a request to the origin and return its response.
    ///
    /// # Errors
    ///
    /// Returns a transport error (`Error::Network` / `Error::Timeout`)
    /// only when no HTTP response was obtained at all.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Error>;
}

/// HTTP client for the application origin.
pub struct OriginClient {
    http: reqwest::Client,
    config: NetworkConfig,
}

impl OriginClient {
    /// Create a new origin client with the given configuration.
    pub fn new(config: NetworkConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn classify(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.config.timeout.as_millis() as u64)
        } else {
            Error::Network(err.to_string())
        }
    }
}

#[async_trait]
impl Network for OriginClient {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::Network(format!("invalid method: {}", request.method)))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?.to_vec();

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            bytes = body.len(),
            "origin responded"
        );

        Ok(HttpResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_config_default() {
        let config = NetworkConfig::default();
        assert_eq!(config.user_agent, "vowkeep/0.1");
        assert_eq!(config.timeout, Duration::from_millis(5_000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_network_config_from_app_config() {
        let app = AppConfig { user_agent: "vowkeep-test".into(), network_timeout_ms: 750, ..Default::default() };
        let config = NetworkConfig::from_app_config(&app);
        assert_eq!(config.timeout, Duration::from_millis(750));
        assert_eq!(config.user_agent, "vowkeep-test");
    }

    #[test]
    fn test_origin_client_new() {
        let client = OriginClient::new(NetworkConfig::default());
        assert!(client.is_ok());
    }
}
