use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runbook_config::ScriptsConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::Manifest;
use crate::loader::{LoaderError, ScriptLoader};
use crate::script::RawScript;
use crate::script_scanner::scan_dirs;

/// Reads every manifest below the configured directories
///
/// Parse failures and missing fields end up as script errors. Only an
/// unreadable script directory fails the whole load.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    paths: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl ManifestLoader {
    pub fn new(paths: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        Self { paths, extensions }
    }

    pub fn from_config(config: &ScriptsConfig) -> Self {
        Self::new(config.search_paths(), config.extensions.clone())
    }

    fn load_blocking(
        paths: &[PathBuf],
        extensions: &[String],
    ) -> Result<Vec<RawScript>, LoaderError> {
        for dir in paths {
            if !dir.exists() {
                info!(
                    target: "scripting",
                    "Script directory does not exist: {} (fine if no scripts are used)",
                    dir.display()
                );
                continue;
            }
            std::fs::read_dir(dir).map_err(|source| LoaderError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        let mut files: Vec<_> = scan_dirs(paths, extensions).into_iter().collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let scripts = files
            .into_iter()
            .map(|(path, modified)| {
                read_manifest(&path).with_updated_at(DateTime::<Utc>::from(modified))
            })
            .collect::<Vec<_>>();

        debug!(target: "scripting", "Loaded {} manifest(s)", scripts.len());
        Ok(scripts)
    }
}

fn read_manifest(path: &Path) -> RawScript {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            return RawScript::new("", path).with_error(format!("failed to read manifest: {}", e))
        }
    };

    match Manifest::parse(&text) {
        Ok(manifest) => manifest.into_raw(path),
        Err(e) => {
            RawScript::new("", path).with_error(format!("invalid manifest: {}", e.message()))
        }
    }
}

#[async_trait]
impl ScriptLoader for ManifestLoader {
    async fn scripts(&self) -> Result<Vec<RawScript>, LoaderError> {
        let paths = self.paths.clone();
        let extensions = self.extensions.clone();

        tokio::task::spawn_blocking(move || Self::load_blocking(&paths, &extensions))
            .await
            .map_err(|e| LoaderError::Unavailable(format!("manifest loading task failed: {}", e)))?
    }

    fn base_paths(&self) -> Vec<PathBuf> {
        self.paths.clone()
    }
}
