//! Per-user flood control for socket events.
//!
//! A token bucket per user, refilled continuously, consumed by sends and
//! typing signals.  Buckets for users who went quiet are purged by a
//! background task in `main`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use causerie_shared::types::UserId;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, rate: f64, capacity: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;

        self.tokens = (self.tokens + elapsed * rate).min(capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Clone)]
pub struct FloodControl {
    buckets: Arc<Mutex<HashMap<UserId, TokenBucket>>>,
    rate: f64,
    capacity: f64,
}

impl FloodControl {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate,
            capacity,
        }
    }

    /// Whether `user` may emit one more event right now.
    pub async fn check(&self, user: UserId) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(user)
            .or_insert_with(|| TokenBucket::new(self.capacity));
        bucket.try_consume(self.rate, self.capacity)
    }

    /// Drop buckets that have been idle longer than `max_idle_secs`.
    pub async fn purge_stale(&self, max_idle_secs: f64) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| {
            now.duration_since(bucket.last_refill).as_secs_f64() < max_idle_secs
        });
    }
}

impl Default for FloodControl {
    fn default() -> Self {
        Self::new(5.0, 15.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_burst_then_throttles() {
        let flood = FloodControl::new(10.0, 5.0);
        let user = UserId::new();

        for _ in 0..5 {
            assert!(flood.check(user).await);
        }

        assert!(!flood.check(user).await);
    }

    #[tokio::test]
    async fn test_users_are_throttled_independently() {
        let flood = FloodControl::new(10.0, 2.0);
        let chatty = UserId::new();
        let quiet = UserId::new();

        assert!(flood.check(chatty).await);
        assert!(flood.check(chatty).await);
        assert!(!flood.check(chatty).await);

        assert!(flood.check(quiet).await);
    }

    #[tokio::test]
    async fn test_purge_stale() {
        let flood = FloodControl::new(10.0, 5.0);
        let user = UserId::new();
        assert!(flood.check(user).await);

        flood.purge_stale(0.0).await;

        let buckets = flood.buckets.lock().await;
        assert!(buckets.is_empty());
    }
}
