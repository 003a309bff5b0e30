//! Plain HTTP fetch strategy.

mod user_agent;

pub use user_agent::{resolve_user_agent, USER_AGENT};

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::rate_limiter::RateLimiter;
use super::{Document, FetchError, FetchStrategy};

/// HTTP client that goes through the shared per-domain rate limiter.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl HttpClient {
    /// Create a new HTTP client.
    ///
    /// `user_agent_config` follows [`resolve_user_agent`]. `timeout` is the
    /// client-wide ceiling; each fetch may pass a tighter one.
    pub fn new(
        user_agent_config: Option<&str>,
        timeout: Duration,
        rate_limiter: RateLimiter,
    ) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .user_agent(resolve_user_agent(user_agent_config))
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            rate_limiter,
        })
    }
}

fn classify_request_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_builder() {
        FetchError::Permanent(format!("invalid request for {}: {}", url, err))
    } else if err.is_timeout() {
        FetchError::Transient(format!("timed out fetching {}", url))
    } else {
        FetchError::Transient(format!("request to {} failed: {}", url, err))
    }
}

#[async_trait]
impl FetchStrategy for HttpClient {
    async fn acquire(&self, url: &str) {
        self.rate_limiter.acquire(url).await;
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Document, FetchError> {
        let parsed = Url::parse(url)
            .map_err(|e| FetchError::Permanent(format!("malformed locator {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::Permanent(format!(
                "unsupported scheme '{}' in {}",
                parsed.scheme(),
                url
            )));
        }

        let domain = parsed.host_str().map(str::to_string);

        let response = self
            .client
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        let status = response.status();
        if let Some(ref domain) = domain {
            if RateLimiter::is_rate_limit_status(status.as_u16()) {
                self.rate_limiter
                    .report_rate_limit(domain, status.as_u16())
                    .await;
            } else if status.is_success() {
                self.rate_limiter.report_success(domain).await;
            }
        }

        if !status.is_success() {
            return Err(FetchError::from_status(url, status.as_u16()));
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error(url, e))?;
        debug!("Fetched {} ({} bytes)", final_url, body.len());

        Ok(Document {
            url: url.to_string(),
            final_url,
            body,
            fetched_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
