//! Redis-backed fixed-window rate limiter shared by every node.
//!
//! One `MULTI`/`EXEC` per hit: `SET key 0 EX window NX` opens the window with
//! its TTL already attached, then `INCR` and `TTL` read it back. The key
//! expiring is what closes the window, so a key found without a TTL gets one
//! again.

use async_trait::async_trait;
use deadpool_redis::{redis, Config, Pool, Runtime};
use domains::{DomainError, RateDecision, RateLimiter, Result};

pub struct RedisRateLimiter {
    pool: Pool,
    max_requests: u32,
    window_secs: u64,
}

impl RedisRateLimiter {
    pub fn connect(url: &str, max_requests: u32, window_secs: u64) -> anyhow::Result<Self> {
        let pool = Config::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool, max_requests, window_secs })
    }
}

fn redis_error(err: impl std::fmt::Display) -> DomainError {
    tracing::error!(error = %err, "rate limiter redis call failed");
    DomainError::internal(err)
}

/// `ttl` is what Redis reported; negative means the key carries no expiry.
fn decide(count: u32, ttl: i64, max_requests: u32, window_secs: u64) -> RateDecision {
    RateDecision {
        allowed: count <= max_requests,
        remaining: max_requests.saturating_sub(count),
        reset_after: u64::try_from(ttl).unwrap_or(window_secs),
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn hit(&self, key: &str) -> Result<RateDecision> {
        let mut conn = self.pool.get().await.map_err(redis_error)?;
        let key = format!("ratelimit:{key}");

        let (count, ttl): (u32, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("EX")
            .arg(self.window_secs)
            .arg("NX")
            .ignore()
            .cmd("INCR")
            .arg(&key)
            .cmd("TTL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;

        if ttl < 0 {
            tracing::warn!(key = %key, "rate limit window had no expiry, restoring it");
            let _: () = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(self.window_secs)
                .query_async(&mut conn)
                .await
                .map_err(redis_error)?;
        }

        Ok(decide(count, ttl, self.max_requests, self.window_secs))
    }
}
