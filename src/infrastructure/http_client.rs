//! HTTP client for history crawling with rate limiting and a cookie jar
//!
//! Thin wrapper over `reqwest`: one shared client keeps the login cookies,
//! a `governor` limiter spaces requests client-side, and every await is
//! raced against a cancellation token. Redirects are never followed so the
//! session layer can recognise a bounce to the login page.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderValue, LOCATION, RETRY_AFTER, USER_AGENT},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::HttpConfig;
use crate::domain::{CrawlError, CrawlResult};

/// Status, selected headers and body of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub location: Option<String>,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub const fn is_redirect(&self) -> bool {
        self.status >= 300 && self.status < 400
    }
}

/// Rate-limited HTTP client with cookie persistence
pub struct HttpClient {
    client: Client,
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    cancel: CancellationToken,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: &HttpConfig) -> CrawlResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| CrawlError::configuration(format!("Invalid user agent: {e}")))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .default_headers(headers)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| CrawlError::configuration(format!("Failed to create HTTP client: {e}")))?;

        // 0 disables client-side limiting
        let rate_limiter = NonZeroU32::new(config.max_requests_per_second)
            .map(|per_second| RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            rate_limiter,
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn get(&self, url: &str) -> CrawlResult<HttpResponse> {
        self.wait_for_permit().await?;
        debug!("GET {}", url);
        self.send(self.client.get(url), url).await
    }

    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> CrawlResult<HttpResponse> {
        self.wait_for_permit().await?;
        debug!("POST {}", url);
        self.send(self.client.post(url).form(form), url).await
    }

    async fn wait_for_permit(&self) -> CrawlResult<()> {
        if self.cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }
        let Some(limiter) = &self.rate_limiter else {
            return Ok(());
        };
        tokio::select! {
            () = limiter.until_ready() => Ok(()),
            () = self.cancel.cancelled() => Err(CrawlError::Cancelled),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> CrawlResult<HttpResponse> {
        let response = tokio::select! {
            result = request.send() => result.map_err(|e| transport_error(&e, url))?,
            () = self.cancel.cancelled() => {
                warn!("🛑 HTTP request cancelled for URL: {}", url);
                return Err(CrawlError::Cancelled);
            }
        };

        let status = response.status();
        let location = header_string(response.headers(), LOCATION);
        let retry_after = header_string(response.headers(), RETRY_AFTER)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = tokio::select! {
            result = response.text() => result.map_err(|e| transport_error(&e, url))?,
            () = self.cancel.cancelled() => {
                warn!("🛑 Response reading cancelled for URL: {}", url);
                return Err(CrawlError::Cancelled);
            }
        };

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("⏳ Rate limited by {}", url);
        }
        debug!("{} {} ({} bytes)", status.as_u16(), url, body.len());

        Ok(HttpResponse {
            status: status.as_u16(),
            location,
            retry_after,
            body,
        })
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn transport_error(error: &reqwest::Error, url: &str) -> CrawlError {
    CrawlError::Transport {
        message: format!("request to {url} failed: {error}"),
        status: error.status().map(|s| s.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_with_defaults() {
        assert!(HttpClient::new(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_rate_disables_limiter() {
        let config = HttpConfig {
            max_requests_per_second: 0,
            ..HttpConfig::default()
        };
        let client = HttpClient::new(&config).unwrap();
        assert!(client.rate_limiter.is_none());
    }

    #[test]
    fn test_invalid_user_agent_is_configuration_error() {
        let config = HttpConfig {
            user_agent: "bad\nagent".to_string(),
            ..HttpConfig::default()
        };
        assert!(matches!(
            HttpClient::new(&config),
            Err(CrawlError::Configuration { .. })
        ));
    }

    #[test]
    fn test_cancelled_client_makes_no_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let client = HttpClient::new(&HttpConfig::default())
            .unwrap()
            .with_cancellation(cancel);
        let result = tokio_test::block_on(client.post_form("http://127.0.0.1:9/never", &[]));
        assert_eq!(result, Err(CrawlError::Cancelled));
    }

    #[test]
    fn test_status_classes() {
        let response = HttpResponse {
            status: 302,
            location: Some("/users/login".into()),
            retry_after: None,
            body: String::new(),
        };
        assert!(response.is_redirect());
        assert!(!response.is_success());
    }
}
