use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::script::RawScript;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no script directory available: {0}")]
    Unavailable(String),
}

/// Source of raw script records
///
/// Per-script problems belong in [`RawScript::errors`]; an `Err` means the
/// whole load failed and the current registry snapshot must be kept.
#[async_trait]
pub trait ScriptLoader: Send + Sync {
    async fn scripts(&self) -> Result<Vec<RawScript>, LoaderError>;

    /// Directories the loader reads from; change notifications are scoped to these
    fn base_paths(&self) -> Vec<PathBuf>;
}
