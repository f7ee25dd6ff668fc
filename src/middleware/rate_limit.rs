//! Per-client token-bucket rate limiting.
//!
//! Each client gets its own bucket, created on first sight. A sweeper removes
//! clients that have been idle longer than [`STALE_AFTER`], so a returning
//! client starts again with a full bucket.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ip::client_ip;
use crate::config::LimiterConfig;
use crate::error::AppError;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const STALE_AFTER: Duration = Duration::from_secs(180);

/// Refills continuously at `rate` tokens per second up to `burst`.
/// Starts full. Never blocks the caller.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst);
        Self { rate, burst, state: Mutex::new(BucketState { tokens: burst, last: Instant::now() }) }
    }

    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Client {
    bucket: Arc<TokenBucket>,
    last_seen: Instant,
}

struct Registry {
    rate: f64,
    burst: u32,
    clients: tokio::sync::Mutex<HashMap<IpAddr, Client>>,
}

/// Shared registry of client buckets. A disabled limiter holds no state.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Option<Arc<Registry>>,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            inner: Some(Arc::new(Registry { rate, burst, clients: tokio::sync::Mutex::new(HashMap::new()) })),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn from_config(cfg: &LimiterConfig) -> Self {
        if cfg.enabled {
            Self::new(cfg.rps, cfg.burst)
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn allow(&self, client: IpAddr) -> bool {
        let Some(registry) = &self.inner else {
            return true;
        };
        let bucket = {
            let mut clients = registry.clients.lock().await;
            let entry = clients.entry(client).or_insert_with(|| Client {
                bucket: Arc::new(TokenBucket::new(registry.rate, registry.burst)),
                last_seen: Instant::now(),
            });
            entry.last_seen = Instant::now();
            entry.bucket.clone()
        };
        bucket.allow()
    }

    /// Drops clients idle for longer than [`STALE_AFTER`]. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let Some(registry) = &self.inner else {
            return 0;
        };
        let now = Instant::now();
        let mut clients = registry.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, c| now.saturating_duration_since(c.last_seen) <= STALE_AFTER);
        before - clients.len()
    }

    pub async fn len(&self) -> usize {
        match &self.inner {
            Some(registry) => registry.clients.lock().await.len(),
            None => 0,
        }
    }

    /// Runs [`RateLimiter::sweep`] every [`SWEEP_INTERVAL`] until `shutdown` fires.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            return None;
        }
        let limiter = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = limiter.sweep().await;
                        if removed > 0 {
                            tracing::debug!(removed, "evicted idle rate limiter clients");
                        }
                    }
                }
            }
        }))
    }
}

pub async fn rate_limit(State(limiter): State<RateLimiter>, req: Request, next: Next) -> Response {
    if limiter.is_enabled() && !limiter.allow(client_ip(&req)).await {
        return AppError::RateLimited.into_response();
    }
    next.run(req).await
}
