use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the messaging-network sidecar.
///
/// Each phone number gets its own WebSocket to `url`; the sidecar hosts the
/// actual network client and owns the credential format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "d_url")]
    pub url: String,
    /// Environment variable holding the sidecar auth token.  When unset the
    /// connection is made without a token.
    #[serde(default = "d_token_env")]
    pub token_env: String,
    #[serde(default = "d_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "d_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: d_url(),
            token_env: d_token_env(),
            request_timeout_secs: d_request_timeout_secs(),
            connect_timeout_secs: d_connect_timeout_secs(),
        }
    }
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn d_url() -> String {
    "ws://127.0.0.1:7700/v1/sessions".into()
}
fn d_token_env() -> String {
    "PB_BRIDGE_TOKEN".into()
}
fn d_request_timeout_secs() -> u64 {
    30
}
fn d_connect_timeout_secs() -> u64 {
    10
}
