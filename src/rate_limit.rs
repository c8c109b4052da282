//! In-memory rate limiting for contact routes.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<i64, VecDeque<Instant>>`, keyed
//! by authenticated user id. One budget is shared across every guarded
//! contact route (default 2 requests / 5 s). Users whose window has fully
//! expired are swept out so the map only holds recently active users.
//!
//! TRADE-OFFS
//! ==========
//! State is per-process. Running several replicas multiplies the effective
//! budget; that is acceptable for this service's scale.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("rate limit exceeded (max {limit} requests/{window_secs}s)")]
pub struct RateLimitExceeded {
    pub limit: usize,
    pub window_secs: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Windows>>,
    limit: usize,
    window: Duration,
}

#[derive(Default)]
struct Windows {
    by_user: HashMap<i64, VecDeque<Instant>>,
    /// Users idle for a full window are dropped at most once per window.
    last_sweep: Option<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(Windows::default())), limit, window }
    }

    /// Check the user's window and record the request if it fits.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] when the user already used the full budget.
    pub fn check_and_record(&self, user_id: i64) -> Result<(), RateLimitExceeded> {
        self.check_and_record_at(user_id, Instant::now())
    }

    fn check_and_record_at(&self, user_id: i64, now: Instant) -> Result<(), RateLimitExceeded> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if inner.last_sweep.is_none_or(|last| now.saturating_duration_since(last) >= self.window) {
            let window = self.window;
            inner.by_user.retain(|_, deque| {
                prune_window(deque, now, window);
                !deque.is_empty()
            });
            inner.last_sweep = Some(now);
        }

        let deque = inner.by_user.entry(user_id).or_default();
        prune_window(deque, now, self.window);
        if deque.len() >= self.limit {
            if deque.is_empty() {
                inner.by_user.remove(&user_id);
            }
            return Err(RateLimitExceeded { limit: self.limit, window_secs: self.window.as_secs() });
        }
        deque.push_back(now);
        Ok(())
    }

    /// Number of users with requests still inside the window.
    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .by_user
            .len()
    }
}

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) >= window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
