use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Settings handed to every script invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Environment variables exposed to scripts
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
