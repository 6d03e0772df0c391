//! Fixed-window request counter keyed by client identifier.
//!
//! State lives in a sharded concurrent map; the read-then-write for a key happens
//! under that key's shard lock so concurrent requests from one client cannot lose
//! updates.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::reaper::Sweep;

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    reset_at: Instant,
}

/// Outcome of a single rate-limit check, including the bookkeeping the HTTP
/// layer reports back in headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_in: Duration,
}

impl RateLimitDecision {
    /// Seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.reset_in.as_secs();
        if self.reset_in.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_requests,
            window,
        }
    }

    /// Counts a request for `client_key` and decides whether it may proceed.
    ///
    /// The first request of a window sets the count to 1. Later requests are
    /// allowed while the count is below the ceiling, so the ceiling-th request is
    /// the last one allowed. Rejected requests do not bump the count.
    pub fn check(&self, client_key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(client_key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                reset_at: now,
            });

        if entry.count == 0 || now >= entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + self.window;
        } else if entry.count >= self.max_requests {
            debug!(
                "Rate limit hit for client {} ({} requests in window)",
                client_key, entry.count
            );
            return RateLimitDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_in: entry.reset_at.saturating_duration_since(now),
            };
        } else {
            entry.count += 1;
        }

        RateLimitDecision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_in: entry.reset_at.saturating_duration_since(now),
        }
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.reset_at);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
