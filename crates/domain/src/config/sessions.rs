use serde::{Deserialize, Serialize};
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timing and greeting for messaging-network sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Fixed delay before reconnecting after a transient close.  There is no
    /// back-off growth and no retry ceiling.
    #[serde(default = "d_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Pause between the first `connecting` update and the pairing-code
    /// request, giving the socket time to finish its handshake.
    #[serde(default = "d_pairing_delay_ms")]
    pub pairing_delay_ms: u64,

    /// Sent through the messaging network itself once a number connects.
    #[serde(default = "d_welcome_message")]
    pub welcome_message: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: d_reconnect_delay_secs(),
            pairing_delay_ms: d_pairing_delay_ms(),
            welcome_message: d_welcome_message(),
        }
    }
}

impl SessionsConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn pairing_delay(&self) -> Duration {
        Duration::from_millis(self.pairing_delay_ms)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_reconnect_delay_secs() -> u64 {
    5
}
fn d_pairing_delay_ms() -> u64 {
    1000
}
fn d_welcome_message() -> String {
    "👋 Hello! I'm connected now. Type `.menu` to see the commands.".into()
}
