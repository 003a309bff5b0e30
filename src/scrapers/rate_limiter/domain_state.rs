//! Per-domain rate limiting state.

use std::time::Duration;

use tokio::time::Instant;

/// State for a single domain.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Spacing applied after the next reserved slot.
    pub current_delay: Duration,
    /// Earliest instant the next request may start.
    pub next_slot: Option<Instant>,
    pub consecutive_successes: u32,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

impl DomainState {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            next_slot: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Reserve the next start slot and return when it begins.
    ///
    /// Concurrent callers each get a distinct slot spaced by the current delay.
    pub fn reserve(&mut self, now: Instant) -> Instant {
        let start = match self.next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        self.next_slot = Some(start + self.current_delay);
        self.total_requests += 1;
        start
    }
}
