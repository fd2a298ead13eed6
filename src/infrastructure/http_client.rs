//! HTTP client for page and image fetching
//!
//! Provides a browser-impersonating HTTP client: every request carries a
//! user agent picked at call time from a pool of real browser signatures,
//! a baseline set of browser headers, a cookie jar and compressed transfer,
//! so the catalog source sees ordinary browser traffic.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use crate::infrastructure::config::FetchConfig;
use crate::infrastructure::timing::SharedRng;

const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Failures below the HTTP status level
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    pub fn transport(url: &str, message: impl std::fmt::Display) -> Self {
        Self::Transport { url: url.to_string(), message: message.to_string() }
    }
}

/// Status, body and headers of one completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl FetchResponse {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK.as_u16()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS.as_u16()
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Outbound GET used by the backoff controller and the asset fetcher
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        extra_headers: &[(String, String)],
    ) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed [`Fetcher`] with per-request user-agent rotation
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: FetchConfig,
    rng: Arc<SharedRng>,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: FetchConfig, rng: Arc<SharedRng>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config, rng })
    }

    /// Pick this request's browser signature
    pub fn pick_user_agent(&self) -> &str {
        self.rng
            .choose(&self.config.user_agents)
            .map_or("Mozilla/5.0", String::as_str)
    }

    /// Baseline headers plus the caller's; caller values win
    pub fn build_headers(&self, extra_headers: &[(String, String)]) -> Result<HeaderMap, String> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&self.config.accept_language).map_err(|e| e.to_string())?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&self.config.referer).map_err(|e| e.to_string())?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(self.pick_user_agent()).map_err(|e| e.to_string())?,
        );

        for (name, value) in extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| e.to_string())?;
            let value = HeaderValue::from_str(value).map_err(|e| e.to_string())?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(
        &self,
        url: &str,
        extra_headers: &[(String, String)],
    ) -> Result<FetchResponse, FetchError> {
        let headers = self
            .build_headers(extra_headers)
            .map_err(|e| FetchError::transport(url, format!("invalid header: {e}")))?;

        info!("🌐 HTTP GET: {}", url);
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url, format!("failed to read body: {e}")))?
            .to_vec();

        debug!("Fetched {} ({} bytes, status {})", url, body.len(), status);
        Ok(FetchResponse { status, body, headers: response_headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(seed: u64) -> HttpClient {
        HttpClient::new(FetchConfig::default(), Arc::new(SharedRng::new(Some(seed)))).unwrap()
    }

    #[test]
    fn test_http_client_creation() {
        let client = client(1);
        assert_eq!(client.config().timeout_seconds, 15);
    }

    #[test]
    fn user_agent_comes_from_pool_and_rotates() {
        let client = client(3);
        let pool = FetchConfig::default().user_agents;
        let picks: std::collections::HashSet<String> =
            (0..64).map(|_| client.pick_user_agent().to_string()).collect();
        assert!(picks.iter().all(|ua| pool.contains(ua)));
        assert!(picks.len() > 1, "rotation should not stick to one agent");
    }

    #[test]
    fn caller_headers_override_baseline() {
        let client = client(5);
        let headers = client
            .build_headers(&[("Referer".into(), "https://example.org/".into()), ("X-Test".into(), "1".into())])
            .unwrap();
        assert_eq!(headers.get(REFERER).unwrap(), "https://example.org/");
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), "en-US,en;q=0.9");
        assert_eq!(headers.get("x-test").unwrap(), "1");
        assert!(headers.contains_key(USER_AGENT));
    }

    #[test]
    fn invalid_caller_header_is_reported() {
        let client = client(5);
        assert!(client.build_headers(&[("bad header".into(), "x".into())]).is_err());
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let client = client(9);
        let err = client.fetch("http://127.0.0.1:9/", &[]).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[test]
    fn response_helpers() {
        let response = FetchResponse {
            status: 429,
            body: b"slow down".to_vec(),
            headers: vec![("Retry-After".into(), "30".into())],
        };
        assert!(response.is_rate_limited());
        assert!(!response.is_ok());
        assert_eq!(response.header("retry-after"), Some("30"));
        assert_eq!(response.text(), "slow down");
    }
}
