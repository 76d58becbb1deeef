//! In-process fixed-window rate limiter.
//!
//! Counts hits per key inside a window of `window` length starting at the
//! key's first hit. Single-node only; use the Redis limiter behind a load
//! balancer.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use domains::{RateDecision, RateLimiter, Result};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct MemoryRateLimiter {
    windows: DashMap<String, Window>,
    max_requests: u32,
    window: Duration,
}

impl MemoryRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { windows: DashMap::new(), max_requests, window }
    }

    /// Drops windows that have already closed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        before.saturating_sub(self.windows.len())
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn hit(&self, key: &str) -> Result<RateDecision> {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { started: now, count: 0 });

        let elapsed = now.duration_since(entry.started);
        if elapsed >= self.window {
            *entry = Window { started: now, count: 0 };
        }
        entry.count = entry.count.saturating_add(1);

        let reset_after = self.window.saturating_sub(now.duration_since(entry.started));
        Ok(RateDecision {
            allowed: entry.count <= self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_after: reset_after.as_secs(),
        })
    }
}
