use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Number of tracked keys above which every acquisition sweeps out keys
/// whose attempts have all left the window.
const PRUNE_THRESHOLD: usize = 1024;

/// Sliding-window limiter for login attempts, keyed by username.
pub struct RateLimiter {
    /// Attempt timestamps per key
    attempts: Mutex<HashMap<String, Vec<Instant>>>,
    max_attempts: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window_secs: u64) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Reserve an attempt for `key` before doing the expensive check.
    ///
    /// The check and the reservation happen under one lock, so parallel
    /// requests for the same key cannot all slip under the limit. On refusal
    /// returns how long until the oldest attempt leaves the window.
    pub fn try_acquire(&self, key: &str) -> Result<(), Duration> {
        let mut attempts = self.lock();
        let now = Instant::now();

        if attempts.len() > PRUNE_THRESHOLD {
            attempts.retain(|_, times| {
                times.retain(|&time| now.duration_since(time) < self.window);
                !times.is_empty()
            });
        }

        let entry = attempts.entry(key.to_string()).or_default();
        entry.retain(|&time| now.duration_since(time) < self.window);

        if entry.len() >= self.max_attempts {
            let wait = entry
                .first()
                .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(self.window);
            return Err(wait);
        }

        entry.push(now);
        Ok(())
    }

    /// Forget all attempts for a key after a successful login.
    pub fn clear(&self, key: &str) {
        self.lock().remove(key);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        // A panic while holding the lock leaves the map usable.
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
