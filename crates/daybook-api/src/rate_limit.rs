use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;

/// Fixed-window limiter for `POST /api/auth`, keyed by client address.
#[derive(Clone)]
pub struct LoginRateLimiter {
    state: Arc<Mutex<HashMap<String, RateWindow>>>,
    window: Duration,
    limit: u32,
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Default)]
struct RateLimitMetrics {
    login_allowed: AtomicU64,
    login_limited: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitMetricsSnapshot {
    pub login_allowed: u64,
    pub login_limited: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl LoginRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.rate_limit_window, config.login_rate_limit_per_window)
    }

    fn new(window: Duration, limit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            limit,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, client: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        guard.retain(|_, window| now.duration_since(window.started_at) < self.window);

        let entry = guard.entry(client.to_string()).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });

        if entry.count >= self.limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs()
                .max(1);
            self.metrics.login_limited.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = "auth",
                client = client_fingerprint(client),
                retry_after_secs,
                "Login rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                "Too many login attempts, try again later",
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.metrics.login_allowed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            login_allowed: self.metrics.login_allowed.load(Ordering::Relaxed),
            login_limited: self.metrics.login_limited.load(Ordering::Relaxed),
        }
    }
}

fn client_fingerprint(client: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    client.hash(&mut hasher);
    hasher.finish()
}
