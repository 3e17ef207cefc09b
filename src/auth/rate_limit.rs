use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// One rolling 1-second window per key: an `AtomicU32` counter reset on a
/// `Mutex<Instant>` boundary. A non-blocking server-side admission check —
/// `try_acquire` never sleeps, it rejects over-budget callers outright so the
/// handler can return 429.
struct Window {
    count: AtomicU32,
    window_start: Mutex<Instant>,
}

impl Window {
    fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            window_start: Mutex::new(Instant::now()),
        }
    }
}

/// Outcome of a denied request: how long until the caller's window resets.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDenied {
    pub retry_after_seconds: u64,
    pub limit: u32,
    pub remaining: u32,
    pub reset_seconds: u64,
}

/// Per-key sliding window limiter with independently configured budgets.
/// One `Window` per `(key_id, bucket)` pair, created lazily.
pub struct RateLimiter {
    limit_per_second: u32,
    windows: DashMap<String, Arc<Window>>,
}

impl RateLimiter {
    pub fn new(limit_per_second: u32) -> Self {
        Self {
            limit_per_second,
            windows: DashMap::new(),
        }
    }

    /// Returns `Ok(())` if the key is under budget (and records the hit), or
    /// `Err(RateLimitDenied)` with the information needed for the
    /// `X-RateLimit-*` response headers and `retry_after_seconds` body field.
    pub async fn try_acquire(&self, key: &str) -> Result<(), RateLimitDenied> {
        let window = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Window::new()))
            .clone();

        let mut start = window.window_start.lock().await;
        let elapsed = start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            window.count.store(0, Ordering::SeqCst);
            *start = Instant::now();
        }
        let reset_seconds = Duration::from_secs(1).saturating_sub(start.elapsed()).as_secs().max(1);

        let current = window.count.fetch_add(1, Ordering::SeqCst);
        if current >= self.limit_per_second {
            return Err(RateLimitDenied {
                retry_after_seconds: reset_seconds,
                limit: self.limit_per_second,
                remaining: 0,
                reset_seconds,
            });
        }
        Ok(())
    }

    /// Drops windows that haven't been touched recently, so the map doesn't
    /// grow unbounded across the life of a long-running process.
    pub async fn sweep_idle(&self, idle_for: Duration) {
        let mut stale = Vec::new();
        for entry in self.windows.iter() {
            let start = entry.value().window_start.lock().await;
            if start.elapsed() > idle_for {
                stale.push(entry.key().clone());
            }
        }
        for key in stale {
            self.windows.remove(&key);
        }
    }
}

/// Holds the ingest and query limiters, budgeted independently.
pub struct RateLimiters {
    pub ingest: RateLimiter,
    pub query: RateLimiter,
}

impl RateLimiters {
    pub fn new(ingest_rps: u32, query_rps: u32) -> Self {
        Self {
            ingest: RateLimiter::new(ingest_rps),
            query: RateLimiter::new(query_rps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn denies_once_budget_is_exhausted() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire("k").await.is_ok());
        assert!(limiter.try_acquire("k").await.is_ok());
        let denied = limiter.try_acquire("k").await;
        assert!(denied.is_err());
        assert_eq!(denied.unwrap_err().limit, 2);
    }

    #[tokio::test]
    async fn separate_keys_have_independent_budgets() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire("a").await.is_ok());
        assert!(limiter.try_acquire("b").await.is_ok());
        assert!(limiter.try_acquire("a").await.is_err());
    }
}
