use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    bundler_config::BundlerConfig,
    exec_config::ExecConfig,
    paths::{ProjectPaths, APP_NAME},
    reload_config::ReloadConfig,
    scripts_config::ScriptsConfig,
};

#[derive(Debug)]
pub enum ConfigLoadError {
    NotFound,
    ParseError(String),
    IoError(String),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::NotFound => write!(f, "Config file not found"),
            ConfigLoadError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigLoadError::IoError(msg) => write!(f, "IO error reading config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunbookConfig {
    /// Script discovery and validation
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Bundle output and packing
    #[serde(default)]
    pub bundler: BundlerConfig,

    /// Hot reload
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Settings passed to executing scripts
    #[serde(default)]
    pub exec: ExecConfig,
}

impl RunbookConfig {
    pub fn config_path() -> PathBuf {
        ProjectPaths::new(APP_NAME)
            .map(|p| p.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("runbook.toml"))
    }

    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config = Self::parse(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigLoadError> {
        toml::from_str(content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PackingGranularity, Profile, WatchMode};
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RunbookConfig::parse("").unwrap();

        assert_eq!(config.scripts.profile, Profile::Server);
        assert_eq!(config.scripts.extensions, vec!["toml".to_string()]);
        assert!(config.reload.enabled);
        assert_eq!(config.reload.debounce_ms, 500);
        assert_eq!(config.reload.mode, WatchMode::Notify);
        assert_eq!(
            config.bundler.packing(config.scripts.profile),
            PackingGranularity::Single
        );
    }

    #[test]
    fn test_parse_full_config() {
        let config = RunbookConfig::parse(
            r#"
[scripts]
root = "/srv/scripts"
profile = "client"
extensions = ["toml", "script"]

[bundler]
output_path = "/var/cache/bundles"

[reload]
mode = "poll"
debounce_ms = 250

[exec.env]
API_BASE = "http://localhost"
"#,
        )
        .unwrap();

        assert_eq!(config.scripts.root(), PathBuf::from("/srv/scripts"));
        assert_eq!(config.scripts.profile, Profile::Client);
        assert_eq!(
            config.bundler.packing(config.scripts.profile),
            PackingGranularity::PerBundle
        );
        assert_eq!(
            config.bundler.output_path(),
            PathBuf::from("/var/cache/bundles")
        );
        assert_eq!(config.reload.mode, WatchMode::Poll);
        assert_eq!(config.reload.debounce_ms, 250);
        assert_eq!(config.reload.poll_interval_ms, 1000);
        assert_eq!(
            config.exec.env.get("API_BASE").map(String::as_str),
            Some("http://localhost")
        );
    }

    #[test]
    fn test_explicit_packing_overrides_profile() {
        let config = RunbookConfig::parse(
            r#"
[scripts]
profile = "client"

[bundler]
packing = "single"
"#,
        )
        .unwrap();

        assert_eq!(
            config.bundler.packing(config.scripts.profile),
            PackingGranularity::Single
        );
    }

    #[test]
    fn test_parse_error() {
        let err = RunbookConfig::parse("[scripts\nroot = 1").unwrap_err();
        assert!(matches!(err, ConfigLoadError::ParseError(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = RunbookConfig::load_from(&temp_dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigLoadError::NotFound));
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = RunbookConfig::default();
        config.scripts.root = Some(PathBuf::from("/srv/scripts"));
        config.reload.debounce_ms = 750;
        config.save_to(&path).unwrap();

        let loaded = RunbookConfig::load_from(&path).unwrap();
        assert_eq!(loaded.scripts.root, Some(PathBuf::from("/srv/scripts")));
        assert_eq!(loaded.reload.debounce_ms, 750);
    }
}
