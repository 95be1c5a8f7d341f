//! Login throttling keyed by email address

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failed attempts allowed inside one window
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds
    pub ban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,
            ban_duration_seconds: 900,
        }
    }
}

#[derive(Debug)]
struct RateLimiterEntry {
    failures: u32,
    window_start: Instant,
    ban_expires: Option<Instant>,
}

/// In-memory login limiter; only failed attempts count
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether a login for `key` may be attempted now
    pub async fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).await
    }

    /// Count a failed login
    pub async fn record_failure(&self, key: &str) {
        self.record_failure_at(key, Instant::now()).await
    }

    /// Forget the history of `key` after a successful login
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    async fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(key) else {
            return true;
        };

        if let Some(ban_expires) = entry.ban_expires {
            if now < ban_expires {
                return false;
            }
            entries.remove(key);
        }

        true
    }

    async fn record_failure_at(&self, key: &str, now: Instant) {
        let window = Duration::from_secs(self.config.window_seconds);
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert(RateLimiterEntry {
            failures: 0,
            window_start: now,
            ban_expires: None,
        });

        if now.duration_since(entry.window_start) >= window {
            entry.failures = 0;
            entry.window_start = now;
        }

        entry.failures += 1;

        if entry.failures >= self.config.max_attempts {
            entry.ban_expires = Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            warn!(
                "Too many failed logins for {}, blocked for {} seconds",
                key, self.config.ban_duration_seconds
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_attempts: 3,
            window_seconds: 60,
            ban_duration_seconds: 120,
        })
    }

    #[test]
    fn test_blocks_after_max_failures() {
        tokio_test::block_on(async {
            let limiter = limiter();
            let start = Instant::now();

            for _ in 0..2 {
                limiter.record_failure_at("ana@example.com", start).await;
            }
            assert!(limiter.check_at("ana@example.com", start).await);

            limiter.record_failure_at("ana@example.com", start).await;
            assert!(!limiter.check_at("ana@example.com", start).await);
            assert!(limiter.check_at("bea@example.com", start).await);

            let later = start + Duration::from_secs(121);
            assert!(limiter.check_at("ana@example.com", later).await);
        });
    }

    #[test]
    fn test_failures_outside_window_do_not_accumulate() {
        tokio_test::block_on(async {
            let limiter = limiter();
            let start = Instant::now();

            limiter.record_failure_at("ana@example.com", start).await;
            limiter.record_failure_at("ana@example.com", start).await;
            let later = start + Duration::from_secs(61);
            limiter.record_failure_at("ana@example.com", later).await;

            assert!(limiter.check_at("ana@example.com", later).await);
        });
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let limiter = limiter();
        for _ in 0..3 {
            limiter.record_failure("ana@example.com").await;
        }
        assert!(!limiter.check("ana@example.com").await);

        limiter.reset("ana@example.com").await;
        assert!(limiter.check("ana@example.com").await);
    }
}
