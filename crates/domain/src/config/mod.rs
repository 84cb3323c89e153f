mod access;
mod bridge;
mod listing;
mod observability;
mod rate_limit;
mod sessions;
mod storage;
mod telegram;

pub use access::*;
pub use bridge::*;
pub use listing::*;
pub use observability::*;
pub use rate_limit::*;
pub use sessions::*;
pub use storage::*;
pub use telegram::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: &str, message: &str| {
            errors.push(ConfigError {
                severity,
                field: field.into(),
                message: message.into(),
            });
        };

        if self.access.administrators.is_empty() {
            push(
                ConfigSeverity::Warning,
                "access.administrators",
                "no administrators configured; nobody can manage resellers",
            );
        }

        if self.rate_limit.capacity == 0 {
            push(
                ConfigSeverity::Error,
                "rate_limit.capacity",
                "capacity must be greater than 0",
            );
        }
        if self.rate_limit.window_secs == 0 {
            push(
                ConfigSeverity::Error,
                "rate_limit.window_secs",
                "window must be greater than 0",
            );
        }

        if self.storage.state_path.as_os_str().is_empty() {
            push(
                ConfigSeverity::Error,
                "storage.state_path",
                "state_path must not be empty",
            );
        }
        if self.storage.sessions_path.as_os_str().is_empty() {
            push(
                ConfigSeverity::Error,
                "storage.sessions_path",
                "sessions_path must not be empty",
            );
        }

        if !(self.bridge.url.starts_with("ws://") || self.bridge.url.starts_with("wss://")) {
            push(
                ConfigSeverity::Error,
                "bridge.url",
                "bridge url must use the ws:// or wss:// scheme",
            );
        }
        if self.bridge.request_timeout_secs == 0 {
            push(
                ConfigSeverity::Error,
                "bridge.request_timeout_secs",
                "request timeout must be greater than 0",
            );
        }

        if self.listing.chunk_margin >= self.listing.message_limit {
            push(
                ConfigSeverity::Error,
                "listing.chunk_margin",
                "chunk margin must be smaller than the message limit",
            );
        }

        if self.sessions.welcome_message.trim().is_empty() {
            push(
                ConfigSeverity::Warning,
                "sessions.welcome_message",
                "empty welcome message; connected numbers get no greeting",
            );
        }

        errors
    }
}
