//! External-store rate limiter backend: Redis `INCR`+`EXPIRE` as a
//! sliding-window counter (§9 open questions), the shared-state backend
//! used when multiple service instances must agree on one quota.

use std::ops::DerefMut;

use deadpool_redis::Pool as RedisPool;

use crate::error::Error;
use crate::middleware::rate_limit::in_memory::RateLimitDecision;

/// A `key -> {count, limit, window}` rate check backed by Redis.
#[derive(Clone)]
pub struct ExternalRateLimiter {
    pool: RedisPool,
}

impl ExternalRateLimiter {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Increments `key`'s counter, setting a `window_secs` TTL on first
    /// increment, and reports whether `count <= limit`. A fresh key
    /// always starts a fresh window: this is a fixed-window counter, not
    /// a leaky bucket. `reset_secs` comes from the key's live TTL so it
    /// tracks the real window remainder even across process restarts.
    pub async fn check(&self, key: &str, limit: u32, window_secs: u64) -> Result<RateLimitDecision, Error> {
        let mut conn = self.pool.get().await.map_err(|e| {
            Error::Internal(format!("failed to acquire redis connection: {e}"))
        })?;

        let count: u32 = redis::cmd("INCR")
            .arg(key)
            .query_async(conn.deref_mut())
            .await?;

        let ttl: i64 = if count == 1 {
            let _: () = redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_secs as i64)
                .query_async(conn.deref_mut())
                .await?;
            window_secs as i64
        } else {
            redis::cmd("TTL").arg(key).query_async(conn.deref_mut()).await?
        };

        Ok(RateLimitDecision {
            allowed: count <= limit,
            limit,
            remaining: limit.saturating_sub(count),
            reset_secs: ttl.max(1) as u64,
        })
    }
}
