use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::paths::default_scripts_dir;

/// Validation policy applied to loaded scripts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// A script is valid when it carries no errors
    #[default]
    Server,
    /// A script additionally needs a name and at least one trigger, and must
    /// come out of compilation with an exec
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Root directory for scripts; bundle names are the first path segment
    /// below it (default: ~/.local/share/runbook/scripts)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Additional directories to load scripts from
    #[serde(default)]
    pub base_paths: Vec<PathBuf>,

    /// File extensions treated as script sources (default: ["toml"])
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Validation profile (default: server)
    #[serde(default)]
    pub profile: Profile,
}

fn default_extensions() -> Vec<String> {
    vec!["toml".to_string()]
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            root: None,
            base_paths: Vec::new(),
            extensions: default_extensions(),
            profile: Profile::default(),
        }
    }
}

impl ScriptsConfig {
    /// Get the scripts root (use provided or default)
    pub fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(default_scripts_dir)
    }

    /// Root followed by any extra base paths, without duplicates
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.root()];
        for path in &self.base_paths {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths
    }
}
