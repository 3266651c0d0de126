//! Per-identity rate limiting.
//!
//! Handlers receive the limiter through application state, never through a
//! global. [`SlidingWindowLimiter`] keeps its windows in process memory and so
//! resets on restart; a shared counter store can implement the same trait for
//! multi-instance deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

pub trait RateLimiter: Send + Sync {
    /// Records an attempt and reports whether it is within the limit.
    fn allow(&self, scope: &str, identity: &str) -> bool;
}

pub struct SlidingWindowLimiter {
    max_hits: usize,
    window: Duration,
    hits: Mutex<HashMap<(String, String), VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_hits: usize, window: Duration) -> Self {
        Self { max_hits, window, hits: Mutex::new(HashMap::new()) }
    }

    pub fn allow_at(&self, scope: &str, identity: &str, now: Instant) -> bool {
        let mut hits = match self.hits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = self.window;
        hits.retain(|_, q| q.back().is_some_and(|&last| now.saturating_duration_since(last) < window));
        let queue = hits.entry((scope.to_string(), identity.to_string())).or_default();
        while queue.front().is_some_and(|&first| now.saturating_duration_since(first) >= window) {
            queue.pop_front();
        }
        if queue.len() >= self.max_hits {
            warn!(scope, identity, "rate limit exceeded");
            return false;
        }
        queue.push_back(now);
        true
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn allow(&self, scope: &str, identity: &str) -> bool { self.allow_at(scope, identity, Instant::now()) }
}
