//! Rate limiting (§4.5): per-client request throttling backed by either
//! an in-memory fixed window or an external store, the latter fronted by
//! a circuit breaker that falls back per [`RateLimitConfig::fail_open`].

mod circuit_breaker;
mod external;
mod in_memory;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use external::ExternalRateLimiter;
pub use in_memory::{InMemoryRateLimiter, RateLimitDecision};

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::RateLimitConfig;
use crate::error::{AppError, Error, ErrorCode};

/// Maximum distinct keys the in-memory backend will track before evicting
/// the oldest entries (§5 resource policy).
const MAX_IN_MEMORY_KEYS: usize = 100_000;

enum Backend {
    Memory(InMemoryRateLimiter),
    External { limiter: ExternalRateLimiter, breaker: CircuitBreaker, fallback: InMemoryRateLimiter, fail_open: bool },
}

/// Shared rate-limiting state, built once from [`RateLimitConfig`] and
/// cloned into request-handling state. Runs ahead of authentication in
/// the chain (§4.3 step 5 precedes step 6), so it keys on the caller's
/// network address rather than `Claims`.
pub struct RateLimiter {
    backend: Backend,
    per_subject_rpm: u32,
    window_secs: u64,
    trust_proxy_headers: bool,
}

impl RateLimiter {
    pub fn from_config(config: &RateLimitConfig, trust_proxy_headers: bool, external: Option<ExternalRateLimiter>) -> Self {
        let backend = match (config.backend.as_str(), external) {
            ("external", Some(limiter)) => Backend::External {
                limiter,
                breaker: CircuitBreaker::new(config.circuit_breaker_threshold, config.circuit_breaker_recovery()),
                fallback: InMemoryRateLimiter::new(config.per_subject_rpm, config.window_secs),
                fail_open: config.fail_open,
            },
            _ => Backend::Memory(InMemoryRateLimiter::new(config.per_subject_rpm, config.window_secs)),
        };
        Self { backend, per_subject_rpm: config.per_subject_rpm, window_secs: config.window_secs, trust_proxy_headers }
    }

    /// Evaluates the limit for `key`, returning the full decision so the
    /// caller can set `X-RateLimit-*` headers whether or not the request
    /// was allowed. Never returns `Err` for reasons other than rate
    /// limiting: external-store failures degrade to the in-memory
    /// fallback or fail open, per configuration, rather than surfacing as
    /// 500s (§4.5: availability of the limiter must not gate the whole
    /// service).
    pub async fn check(&self, key: &str) -> Result<RateLimitDecision, Error> {
        match &self.backend {
            Backend::Memory(limiter) => {
                limiter.evict_if_over(MAX_IN_MEMORY_KEYS);
                Ok(limiter.check(key))
            }
            Backend::External { limiter, breaker, fallback, fail_open } => {
                if !breaker.allow_request() {
                    return Ok(Self::degrade(fallback, key, *fail_open, self.per_subject_rpm));
                }
                match limiter.check(key, self.per_subject_rpm, self.window_secs).await {
                    Ok(decision) => {
                        breaker.record_success();
                        Ok(decision)
                    }
                    Err(_) => {
                        breaker.record_failure();
                        Ok(Self::degrade(fallback, key, *fail_open, self.per_subject_rpm))
                    }
                }
            }
        }
    }

    fn degrade(fallback: &InMemoryRateLimiter, key: &str, fail_open: bool, limit: u32) -> RateLimitDecision {
        if fail_open {
            return RateLimitDecision { allowed: true, limit, remaining: limit, reset_secs: 0 };
        }
        fallback.check(key)
    }
}

/// Resolves the rate-limit key for a request: the caller's client IP,
/// preferring a trusted proxy header over the TCP peer address (§4.3 step
/// 5 default key function; authentication hasn't run yet at this point in
/// the chain, so `Claims` is never available here).
fn rate_limit_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(ip) = leftmost_forwarded_ip(headers).or_else(|| real_ip_header(headers)) {
            return ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_else(|| "unknown".to_string())
}

/// Takes the leftmost entry of `X-Forwarded-For` — the originating
/// client, by convention — and rejects the header outright if that entry
/// doesn't parse as an IP rather than falling through to the next one
/// (spec open question: a malformed leftmost entry must not let a caller
/// pick which hop's address gets trusted).
fn leftmost_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    first.parse().ok()
}

fn real_ip_header(headers: &HeaderMap) -> Option<IpAddr> {
    headers.get("x-real-ip")?.to_str().ok()?.trim().parse().ok()
}

/// Checks the caller's quota before running the rest of the chain.
/// Always stamps `X-RateLimit-{Limit,Remaining,Reset}`, and adds
/// `Retry-After` on a `RATE_LIMIT_EXCEEDED` rejection so well-behaved
/// clients back off by the right amount (concrete scenario 4).
pub async fn rate_limit_middleware(State(limiter): State<Arc<RateLimiter>>, request: Request, next: Next) -> Response {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr);
    let key = rate_limit_key(request.headers(), peer, limiter.trust_proxy_headers);

    let decision = match limiter.check(&key).await {
        Ok(decision) => decision,
        Err(err) => return err.into_response(),
    };

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        let mut response: Response = AppError::new(ErrorCode::RateLimitExceeded, "rate limit exceeded").into_response();
        if let Ok(value) = HeaderValue::from_str(&decision.reset_secs.to_string()) {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
        response
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_secs.to_string()) {
        headers.insert("x-ratelimit-reset", value);
    }

    response
}
