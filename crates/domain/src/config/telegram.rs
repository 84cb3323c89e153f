use serde::{Deserialize, Serialize};

/// Admin channel (Telegram Bot API) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Environment variable holding the bot token.  The token itself never
    /// lives in the config file.
    #[serde(default = "d_token_env")]
    pub token_env: String,
    #[serde(default = "d_api_base")]
    pub api_base: String,
    /// Long-poll timeout passed to `getUpdates`.
    #[serde(default = "d_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Shown on the start card.
    #[serde(default = "d_bot_name")]
    pub bot_name: String,
    #[serde(default)]
    pub channel_invite_link: Option<String>,
    #[serde(default)]
    pub group_link: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token_env: d_token_env(),
            api_base: d_api_base(),
            poll_timeout_secs: d_poll_timeout_secs(),
            bot_name: d_bot_name(),
            channel_invite_link: None,
            group_link: None,
        }
    }
}

fn d_token_env() -> String {
    "PB_TELEGRAM_TOKEN".into()
}
fn d_api_base() -> String {
    "https://api.telegram.org".into()
}
fn d_poll_timeout_secs() -> u64 {
    30
}
fn d_bot_name() -> String {
    "PairBridge".into()
}
