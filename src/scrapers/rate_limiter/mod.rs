//! Adaptive per-domain rate limiter.
//!
//! Spaces request starts against each domain by the configured delay so
//! that one slow host never holds up requests to another. Backs off on
//! 429/503 and recovers after a run of successes.

mod config;
mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

pub use config::{DomainStats, RateLimitConfig};
use domain_state::DomainState;

/// Rate limiter shared by every fetch against the network.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    domains: Arc<Mutex<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Extract domain from URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Check if a status code is a definite rate limit signal.
    pub fn is_rate_limit_status(status_code: u16) -> bool {
        matches!(status_code, 429 | 503)
    }

    /// Wait for this domain's next slot. Returns the domain, or `None` when
    /// the URL has no host (in which case no waiting happens).
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let start = {
            let mut domains = self.domains.lock().await;
            domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.config.base_delay))
                .reserve(Instant::now())
        };

        let now = Instant::now();
        if start > now {
            debug!("Rate limiting {}: waiting {:?}", domain, start - now);
            tokio::time::sleep_until(start).await;
        }

        Some(domain)
    }

    /// Report a successful request. May decrease the delay.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.lock().await;
        let Some(state) = domains.get_mut(domain) else {
            return;
        };
        state.consecutive_successes += 1;

        if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
            state.current_delay = state
                .current_delay
                .mul_f64(self.config.recovery_multiplier)
                .max(self.config.base_delay);
            state.consecutive_successes = 0;

            if state.current_delay <= self.config.base_delay {
                state.in_backoff = false;
                info!("Domain {} recovered from rate limit backoff", domain);
            } else {
                debug!("Domain {} delay reduced to {:?}", domain, state.current_delay);
            }
        }
    }

    /// Report a 429 or 503. Increases the delay up to the ceiling.
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.lock().await;
        let Some(state) = domains.get_mut(domain) else {
            return;
        };
        state.rate_limit_hits += 1;
        state.consecutive_successes = 0;
        state.in_backoff = true;

        let base = state.current_delay.max(std::time::Duration::from_millis(100));
        state.current_delay = base
            .mul_f64(self.config.backoff_multiplier)
            .min(self.config.max_delay);

        warn!(
            "Rate limited by {} (HTTP {}), backing off to {:?}",
            domain, status_code, state.current_delay
        );
    }

    /// Statistics for all domains seen so far.
    pub async fn get_stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.lock().await;
        domains
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    DomainStats {
                        current_delay: v.current_delay,
                        in_backoff: v.in_backoff,
                        total_requests: v.total_requests,
                        rate_limit_hits: v.rate_limit_hits,
                    },
                )
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
