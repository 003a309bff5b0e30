//! Fetching and extraction for monitored sources.
//!
//! A [`FetchStrategy`] turns a locator into a [`Document`]; an
//! [`Extractor`] turns a document into field values; [`fingerprint`]
//! digests those values for change detection.

pub mod browser;
mod extract;
pub mod fingerprint;
mod http_client;
pub mod rate_limiter;

pub use browser::{BrowserEngineConfig, BrowserFetcher};
pub use extract::{Extractor, SelectorExtractor};
pub use fingerprint::fingerprint;
pub use http_client::{resolve_user_agent, HttpClient, USER_AGENT};
pub use rate_limiter::{RateLimitConfig, RateLimiter};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A fetched document, ready for extraction.
#[derive(Debug, Clone)]
pub struct Document {
    /// Locator that was requested.
    pub url: String,
    /// Locator after redirects.
    pub final_url: String,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

impl Document {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// Why a fetch failed, and whether retrying could help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection failures, timeouts, 5xx, 408, 429.
    #[error("transient fetch failure: {0}")]
    Transient(String),
    /// Malformed locator, 4xx, unavailable fetch backend.
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(url: &str, status: u16) -> Self {
        let message = format!("HTTP {} for {}", status, url);
        match status {
            408 | 429 => Self::Transient(message),
            s if s >= 500 => Self::Transient(message),
            _ => Self::Permanent(message),
        }
    }
}

/// Retrieves a document for a locator within a time limit.
///
/// Callers await [`FetchStrategy::acquire`] before each attempt and only
/// then start the attempt's timeout, so queueing for a host never counts
/// against the fetch itself.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Wait until a request to `url` may start. No-op by default.
    async fn acquire(&self, _url: &str) {}

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Document, FetchError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
