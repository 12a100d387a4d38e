use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::script::{CompiledScript, Script};

/// One script registered by a bootloader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootEntry {
    pub name: String,
    pub src: PathBuf,
}

/// Ordered entry-point descriptor for one bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bootloader {
    pub bundle: String,
    pub entries: Vec<BootEntry>,
}

impl Bootloader {
    pub fn new(bundle: impl Into<String>, scripts: &[&Script]) -> Self {
        Self {
            bundle: bundle.into(),
            entries: scripts
                .iter()
                .map(|s| BootEntry {
                    name: s.name.clone(),
                    src: s.src.clone(),
                })
                .collect(),
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.src.as_path())
    }
}

/// Files produced by one pack call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Resolution root the bundles were packed against
    pub context: PathBuf,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot compile {}: {message}", src.display())]
    Source { src: PathBuf, message: String },
}

/// Turns grouped valid scripts into loadable artifacts
#[async_trait]
pub trait ScriptCompiler: Send + Sync {
    /// Build one bootloader per bundle, keeping group order and member order
    fn bootloader(
        &self,
        _output_dir: &Path,
        groups: &BTreeMap<String, Vec<&Script>>,
    ) -> Vec<Bootloader> {
        groups
            .iter()
            .map(|(bundle, scripts)| Bootloader::new(bundle.clone(), scripts))
            .collect()
    }

    async fn pack(
        &self,
        bootloaders: &[Bootloader],
        context: &Path,
        output_dir: &Path,
    ) -> Result<Artifact, CompileError>;

    /// Map each packed source path to its compiled entry point
    async fn load(
        &self,
        artifact: &Artifact,
    ) -> Result<HashMap<PathBuf, CompiledScript>, CompileError>;
}
