use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where change notifications come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Native filesystem events
    #[default]
    Notify,
    /// Periodic modification-time scan
    Poll,
}

/// Hot reload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Whether source changes trigger a reload (default: true)
    pub enabled: bool,

    /// Change source (default: notify)
    pub mode: WatchMode,

    /// Quiet period after the last change before reloading (default: 500ms)
    pub debounce_ms: u64,

    /// Scan interval for poll mode (default: 1000ms)
    pub poll_interval_ms: u64,

    /// Reload on SIGHUP (default: true, Unix only)
    pub signal: bool,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: WatchMode::Notify,
            debounce_ms: 500,
            poll_interval_ms: 1000,
            signal: true,
        }
    }
}

impl ReloadConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
