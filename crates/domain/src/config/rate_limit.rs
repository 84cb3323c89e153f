use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-identity command throttling for entitlement-gated commands.
///
/// Fixed window: up to `capacity` commands per `window_secs`, counted from
/// the first command of the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "d_window_secs")]
    pub window_secs: u64,
    #[serde(default = "d_capacity")]
    pub capacity: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: d_window_secs(),
            capacity: d_capacity(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn d_window_secs() -> u64 {
    60
}
fn d_capacity() -> u32 {
    5
}
