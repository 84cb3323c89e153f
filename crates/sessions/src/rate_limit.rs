//! Per-identity fixed-window command throttle.
//!
//! The window opens on an identity's first command and lasts `window`;
//! up to `capacity` commands are admitted inside it.  Bursts straddling a
//! window boundary can admit up to twice the capacity in a short span.
//! State is in memory only and resets with the process.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use pb_domain::config::RateLimitConfig;
use pb_domain::AdminId;

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    start: Instant,
}

/// A denied command, with the time until the current window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
}

impl RateLimited {
    /// Whole seconds to wait, rounded up so "0 seconds" is never shown.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 || secs == 0 {
            secs + 1
        } else {
            secs
        }
    }
}

pub struct RateLimiter {
    window: Duration,
    capacity: u32,
    windows: Mutex<HashMap<AdminId, RateWindow>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(config.window(), config.capacity)
    }

    pub fn with_limits(window: Duration, capacity: u32) -> Self {
        Self {
            window,
            capacity,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn allow(&self, id: AdminId) -> bool {
        self.check(id).is_ok()
    }

    pub fn allow_at(&self, id: AdminId, now: Instant) -> bool {
        self.check_at(id, now).is_ok()
    }

    pub fn check(&self, id: AdminId) -> Result<(), RateLimited> {
        self.check_at(id, Instant::now())
    }

    /// Count one command for `id` at `now`.  Denied commands still count.
    pub fn check_at(&self, id: AdminId, now: Instant) -> Result<(), RateLimited> {
        let mut windows = self.windows.lock();
        let entry = windows.entry(id).or_insert(RateWindow {
            count: 0,
            start: now,
        });

        if entry.count == 0 || now.saturating_duration_since(entry.start) > self.window {
            *entry = RateWindow {
                count: 1,
                start: now,
            };
            return Ok(());
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count <= self.capacity {
            return Ok(());
        }

        let elapsed = now.saturating_duration_since(entry.start);
        let retry_after = self.window.saturating_sub(elapsed);
        tracing::debug!(user_id = %id, count = entry.count, "rate limited");
        Err(RateLimited { retry_after })
    }

    /// Drop windows that have already expired.  Returns how many were removed.
    pub fn prune_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.start) <= self.window);
        before - windows.len()
    }

    /// Number of identities with a live window.
    pub fn tracked(&self) -> usize {
        self.windows.lock().len()
    }
}
