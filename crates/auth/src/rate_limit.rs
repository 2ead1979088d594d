//! Fixed-window login rate limiter ("5 per 15 min per source
//! address").

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitTier {
    pub requests_per_window: u32,
    pub window: Duration,
}

impl Default for RateLimitTier {
    fn default() -> Self {
        Self {
            requests_per_window: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

struct Window {
    started_at: Instant,
    count: u32,
}

/// Tracks login/verify-totp attempts per source address. A window resets
/// entirely once it elapses rather than sliding (fixed-window, not
/// sliding-window, rate limiting).
pub struct LoginRateLimiter {
    tier: RateLimitTier,
    windows: Mutex<HashMap<String, Window>>,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitTier::default())
    }
}

impl LoginRateLimiter {
    #[must_use]
    pub fn new(tier: RateLimitTier) -> Self {
        Self {
            tier,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Records an attempt from `key` (the source address) and returns the
    /// remaining wait if the window's budget is already exhausted.
    pub async fn check(&self, key: &str) -> Result<(), Duration> {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window = windows.entry(key.to_owned()).or_insert(Window {
                started_at: now,
                count: 0,
        });
        if now.duration_since(window.started_at) >= self.tier.window {
            window.started_at = now;
            window.count = 0;
        }
        if window.count >= self.tier.requests_per_window {
            return Err(self.tier.window - now.duration_since(window.started_at));
        }
        window.count += 1;
        Ok(())
    }

    /// Periodic sweep dropping windows that have long since elapsed, so the
    /// map doesn't grow unboundedly with one-off source addresses.
    pub async fn cleanup_expired(&self) -> u64 {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let tier_window = self.tier.window;
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started_at) < tier_window * 2);
        (before - windows.len()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn allows_up_to_the_limit_then_blocks() {
        let limiter = LoginRateLimiter::new(RateLimitTier {
                requests_per_window: 3,
                window: Duration::from_secs(60),
        });
        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4").await.is_ok());
        }
        assert!(limiter.check("1.2.3.4").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn different_keys_are_independent() {
        let limiter = LoginRateLimiter::new(RateLimitTier {
                requests_per_window: 1,
                window: Duration::from_secs(60),
        });
        assert!(limiter.check("1.2.3.4").await.is_ok());
        assert!(limiter.check("5.6.7.8").await.is_ok());
        assert!(limiter.check("1.2.3.4").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_elapsing() {
        let limiter = LoginRateLimiter::new(RateLimitTier {
                requests_per_window: 1,
                window: Duration::from_secs(60),
        });
        assert!(limiter.check("1.2.3.4").await.is_ok());
        assert!(limiter.check("1.2.3.4").await.is_err());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check("1.2.3.4").await.is_ok());
    }
}
