//! In-process fixed-window limiter (§4.5 in-memory backend). Each distinct
//! key (by default a client IP, see [`super::rate_limit_key`]) gets its own
//! window, created lazily. The same fixed-window algorithm as the external
//! Redis backend (`INCR`+`EXPIRE`), so both backends report the same
//! `limit`/`remaining`/`reset` shape through [`RateLimitDecision`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// The outcome of one rate-limit check, detailed enough to populate the
/// `X-RateLimit-{Limit,Remaining,Reset}` response headers (§4.3 step 5).
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u64,
}

struct Window {
    count: u32,
    started_at: Instant,
}

/// Per-key in-memory rate limiter.
pub struct InMemoryRateLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<String, Mutex<Window>>,
}

impl InMemoryRateLimiter {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit: limit.max(1), window: Duration::from_secs(window_secs.max(1)), windows: DashMap::new() }
    }

    /// Increments `key`'s counter, resetting the window once it has
    /// elapsed, and reports whether the request is still within quota.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let entry = self.windows.entry(key.to_string()).or_insert_with(|| Mutex::new(Window { count: 0, started_at: now }));
        let mut window = entry.lock().expect("rate limit window mutex poisoned");

        if now.duration_since(window.started_at) >= self.window {
            window.started_at = now;
            window.count = 0;
        }
        window.count += 1;

        let elapsed = now.duration_since(window.started_at);
        RateLimitDecision {
            allowed: window.count <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(window.count),
            reset_secs: self.window.saturating_sub(elapsed).as_secs().max(1),
        }
    }

    /// Evict keys beyond `max_entries` to bound memory use (§5 resource
    /// policy: rate-limiter state is bounded, not allowed to grow
    /// unboundedly with distinct callers).
    pub fn evict_if_over(&self, max_entries: usize) {
        if self.windows.len() <= max_entries {
            return;
        }
        let excess = self.windows.len() - max_entries;
        let stale: Vec<String> = self.windows.iter().take(excess).map(|e| e.key().clone()).collect();
        for key in stale {
            self.windows.remove(&key);
        }
    }
}
