use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// On-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the JSON documents (ownership, premium, resellers).
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// Root of the per-number credential directories. Their contents belong
    /// to the messaging network client.
    #[serde(default = "d_sessions_path")]
    pub sessions_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            sessions_path: d_sessions_path(),
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./database")
}
fn d_sessions_path() -> PathBuf {
    PathBuf::from("./rent-session")
}
