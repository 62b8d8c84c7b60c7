//! Per-credential sliding-window admission control
//!
//! The credential map lock is held only to find or insert a window; pruning
//! and admission happen under that credential's own mutex, so bursts for one
//! key never lose updates and never block other keys.

use cardioguard_core::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

type RateWindow = Arc<Mutex<VecDeque<Instant>>>;

/// Sliding-window limiter keyed by credential
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    windows: RwLock<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    /// Default admission window
    pub const WINDOW: Duration = Duration::from_secs(60);

    /// Create a limiter admitting `capacity` requests per minute per credential
    pub fn new(capacity: usize) -> Self {
        Self::with_window(capacity, Self::WINDOW)
    }

    pub fn with_window(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admit or reject a request for `key` now
    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    /// Admit or reject a request for `key` at `now`
    ///
    /// Admissions older than the window are evicted first; one exactly a
    /// window old still counts. Rejected attempts are not recorded.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        let window = self.window_for(key);
        let mut timestamps = window.lock();

        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.capacity {
            let retry_after = timestamps
                .front()
                .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(Error::RateLimited {
                retry_after_secs: ceil_secs(retry_after),
            });
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Number of credentials with a window
    pub fn tracked_keys(&self) -> usize {
        self.windows.read().len()
    }

    fn window_for(&self, key: &str) -> RateWindow {
        if let Some(window) = self.windows.read().get(key) {
            return window.clone();
        }
        self.windows
            .write()
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}
