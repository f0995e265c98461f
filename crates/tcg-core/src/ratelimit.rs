use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

/// Sliding-window-of-one throttle keyed by source identifier (client IP).
///
/// Optimistic: the timestamp is recorded when a request is *allowed*, not
/// when its work finishes. Entries older than the window are dead weight
/// only; [`sweep`] exists to bound memory and never changes an `allow`
/// decision.
///
/// [`sweep`]: RateLimiter::sweep
pub struct RateLimiter {
    window: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn allow(&self, source: &str) -> bool {
        self.allow_at(source, Instant::now())
    }

    /// Decision against an explicit clock, so tests stay deterministic.
    pub fn allow_at(&self, source: &str, now: Instant) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match entries.get(source) {
            Some(&last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                entries.insert(source.to_string(), now);
                true
            }
        }
    }

    /// Drop entries whose window has fully elapsed.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    pub fn sweep_at(&self, now: Instant) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, &mut last| now.saturating_duration_since(last) < self.window);
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!("Rate limiter sweep dropped {dropped} stale entries");
        }
    }

    pub fn tracked(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Background task driving periodic sweeps for the process-lifetime
/// limiter instance.
pub async fn run_sweep_loop(limiter: Arc<RateLimiter>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        limiter.sweep();
    }
}
