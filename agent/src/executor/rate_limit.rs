//! Per-client sliding-window rate limiting.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Tracks recent execution start times per client key. A request is
/// admitted if fewer than `limit` starts remain inside the window after
/// pruning, and its own start is recorded on admission.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub async fn allow(&self, client_key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(client_key.to_string()).or_default();

        while bucket
            .front()
            .is_some_and(|start| now.duration_since(*start) >= self.window)
        {
            bucket.pop_front();
        }

        if bucket.len() >= self.limit {
            return false;
        }
        bucket.push_back(now);
        true
    }
}
