use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chunking of long listings (`/listprem`, `/listresell`, `/listuser`).
///
/// Sizes are in UTF-16 code units, the unit the admin transport measures
/// message length in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "d_message_limit")]
    pub message_limit: usize,
    /// Reserved per chunk for the closing footer.
    #[serde(default = "d_chunk_margin")]
    pub chunk_margin: usize,
    #[serde(default = "d_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            message_limit: d_message_limit(),
            chunk_margin: d_chunk_margin(),
            chunk_delay_ms: d_chunk_delay_ms(),
        }
    }
}

impl ListingConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

fn d_message_limit() -> usize {
    4096
}
fn d_chunk_margin() -> usize {
    100
}
fn d_chunk_delay_ms() -> u64 {
    100
}
