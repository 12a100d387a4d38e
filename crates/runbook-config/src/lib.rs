pub mod bundler_config;
pub mod exec_config;
pub mod paths;
pub mod reload_config;
pub mod runbook_config;
pub mod scripts_config;

pub use bundler_config::{BundlerConfig, PackingGranularity};
pub use exec_config::ExecConfig;
pub use paths::ProjectPaths;
pub use reload_config::{ReloadConfig, WatchMode};
pub use runbook_config::{ConfigLoadError, RunbookConfig};
pub use scripts_config::{Profile, ScriptsConfig};
