use serde::{Deserialize, Serialize};

use crate::ids::AdminId;

/// Static access control.
///
/// Administrators come only from configuration and cannot be changed at
/// runtime. Resellers and entitled users live in persisted documents.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccessConfig {
    #[serde(default)]
    pub administrators: Vec<AdminId>,
}
